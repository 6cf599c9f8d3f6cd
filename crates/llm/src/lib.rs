//! Anthropic-Messages → OpenAI-Responses translation gateway core.
//!
//! Exposes an axum router speaking the Anthropic Messages API and a
//! translation pipeline targeting the OpenAI Responses API: request
//! mapping, response mapping, a streaming SSE translator, and local
//! token accounting.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::post,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

mod error;
mod http_client;
pub mod mapping;
pub mod protocol;
mod request;
pub mod telemetry;
pub mod token_counter;
mod transport;

pub use error::{AnthropicErrorResponse, AnthropicResult, GatewayError, Result};
pub use request::CORRELATION_ID_HEADER;

use crate::mapping::request::map_messages_request;
use crate::mapping::response::map_responses_result;
use crate::mapping::stream::StreamTranslator;
use crate::protocol::anthropic::{CountTokensResponse, MessagesRequest, StreamEvent};
use crate::protocol::openai::ResponsesRequest;
use crate::request::{RequestContext, extract_context};
use crate::telemetry::{TelemetryRecord, TelemetrySink};
use crate::token_counter::count_input_tokens;
use crate::transport::UpstreamClient;

struct AppState {
    config: config::Config,
    upstream: UpstreamClient,
    telemetry: Arc<dyn TelemetrySink>,
}

/// Build the gateway router.
pub fn router(config: config::Config, telemetry: Arc<dyn TelemetrySink>) -> Router {
    let upstream = UpstreamClient::new(&config);
    let state = Arc::new(AppState {
        config,
        upstream,
        telemetry,
    });

    Router::new()
        .route("/v1/messages", post(v1_messages))
        .route("/v1/messages/stream", post(v1_messages_stream))
        .route("/v1/messages/count_tokens", post(v1_messages_count_tokens))
        .route("/v1/messages/token_count", post(v1_messages_count_tokens))
        .with_state(state)
}

/// Parse a request body, converting malformed JSON into the Anthropic
/// error envelope instead of the framework's default rejection.
fn parse_request(body: &Bytes) -> Result<MessagesRequest> {
    sonic_rs::from_slice(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("malformed request body: {e}")))
}

fn with_correlation_id(correlation_id: &str, mut response: Response) -> Response {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    response
}

/// Handle `/v1/messages`.
///
/// Streams when the body requests it, otherwise performs one upstream
/// round trip and returns the translated JSON response.
async fn v1_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AnthropicResult<Response> {
    let context = extract_context(&headers);
    let request = parse_request(&body)?;

    if request.stream.unwrap_or(false) {
        return Ok(stream_messages(state, request, context, "/v1/messages").await);
    }

    respond_messages(state, request, context, "/v1/messages").await
}

/// Handle `/v1/messages/stream`: always streams, regardless of the body's
/// `stream` flag.
async fn v1_messages_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AnthropicResult<Response> {
    let context = extract_context(&headers);
    let request = parse_request(&body)?;

    Ok(stream_messages(state, request, context, "/v1/messages/stream").await)
}

/// Handle the token counting endpoints. Never calls the upstream.
async fn v1_messages_count_tokens(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AnthropicResult<Response> {
    let context = extract_context(&headers);
    let request = parse_request(&body)?;

    let (upstream_model, _) = state.config.resolve_model(&request.model);
    log_request(&state, "/v1/messages/count_tokens", &context, &request, &upstream_model);

    let mapped = map_messages_request(&request, &upstream_model)?;
    let input_tokens = count_input_tokens(&mapped);

    let response = CountTokensResponse { input_tokens };

    if state.telemetry.enabled() {
        state.telemetry.record(TelemetryRecord {
            endpoint: Some("/v1/messages/count_tokens"),
            model_inbound: Some(&request.model),
            model_upstream: Some(&upstream_model),
            response_payload: serde_json::to_value(response).ok().as_ref(),
            ..TelemetryRecord::new("response", &context.correlation_id)
        });
    }

    Ok(with_correlation_id(
        &context.correlation_id,
        Json(response).into_response(),
    ))
}

async fn respond_messages(
    state: Arc<AppState>,
    request: MessagesRequest,
    context: RequestContext,
    endpoint: &'static str,
) -> AnthropicResult<Response> {
    let (upstream_model, _) = state.config.resolve_model(&request.model);
    log_request(&state, endpoint, &context, &request, &upstream_model);

    let mapped = map_messages_request(&request, &upstream_model)?;

    let result = match state
        .upstream
        .create_response(&mapped, &context.correlation_id)
        .await
    {
        Ok(result) => result,
        Err(error) => {
            log_error(&state, endpoint, &context, &error);
            return Err(error.into());
        }
    };

    let response = map_responses_result(&result, &request.model);

    if state.telemetry.enabled() {
        state.telemetry.record(TelemetryRecord {
            endpoint: Some(endpoint),
            model_inbound: Some(&request.model),
            model_upstream: Some(&upstream_model),
            response_payload: serde_json::to_value(&response).ok().as_ref(),
            usage: Some(response.usage),
            ..TelemetryRecord::new("response", &context.correlation_id)
        });
    }

    Ok(with_correlation_id(
        &context.correlation_id,
        Json(response).into_response(),
    ))
}

/// Start a streaming response.
///
/// Local validation failures still surface as HTTP error envelopes; once
/// the SSE response begins, every failure becomes a terminal `error`
/// frame instead.
async fn stream_messages(
    state: Arc<AppState>,
    request: MessagesRequest,
    context: RequestContext,
    endpoint: &'static str,
) -> Response {
    let (upstream_model, _) = state.config.resolve_model(&request.model);
    log_request(&state, endpoint, &context, &request, &upstream_model);

    let mapped = match map_messages_request(&request, &upstream_model) {
        Ok(mapped) => mapped,
        Err(error) => {
            log_error(&state, endpoint, &context, &error);
            return AnthropicErrorResponse::from(error).into_response();
        }
    };

    let input_tokens = count_input_tokens(&mapped);
    let translator = StreamTranslator::new(request.model.clone(), input_tokens);

    let (tx, rx) = mpsc::channel::<std::result::Result<Event, Infallible>>(32);

    let correlation_id = context.correlation_id.clone();

    tokio::spawn(drive_stream(state, mapped, translator, context, endpoint, tx));

    with_correlation_id(
        &correlation_id,
        Sse::new(ReceiverStream::new(rx)).into_response(),
    )
}

/// Pull upstream events, feed the translator, push downstream frames.
///
/// A failed send means the client disconnected; returning drops the
/// upstream stream, which cancels the in-flight read.
async fn drive_stream(
    state: Arc<AppState>,
    payload: ResponsesRequest,
    mut translator: StreamTranslator,
    context: RequestContext,
    endpoint: &'static str,
    tx: mpsc::Sender<std::result::Result<Event, Infallible>>,
) {
    use futures::StreamExt;

    let mut upstream = match state
        .upstream
        .stream_events(&payload, &context.correlation_id)
        .await
    {
        Ok(stream) => stream,
        Err(error) => {
            log_error(&state, endpoint, &context, &error);
            send_error_frame(&tx, &error).await;
            return;
        }
    };

    while let Some(event) = upstream.next().await {
        let frames = match event.and_then(|event| translator.apply(event)) {
            Ok(frames) => frames,
            Err(error) => {
                log_error(&state, endpoint, &context, &error);
                send_error_frame(&tx, &error).await;
                return;
            }
        };

        for frame in frames {
            if send_frame(&tx, &frame).await.is_err() {
                log::debug!("client disconnected, cancelling upstream read");
                return;
            }
        }

        if translator.message_stopped() {
            break;
        }
    }

    // The upstream may end without a terminal event; flush so the client
    // still sees a complete lifecycle.
    for frame in translator.finish() {
        if send_frame(&tx, &frame).await.is_err() {
            return;
        }
    }

    if state.telemetry.enabled() {
        state.telemetry.record(TelemetryRecord {
            endpoint: Some(endpoint),
            usage: Some(translator.usage()),
            ..TelemetryRecord::new("response", &context.correlation_id)
        });
    }
}

async fn send_frame(
    tx: &mpsc::Sender<std::result::Result<Event, Infallible>>,
    frame: &StreamEvent,
) -> std::result::Result<(), ()> {
    let data = sonic_rs::to_string(frame).unwrap_or_else(|e| {
        log::error!("failed to serialize stream event: {e}");
        r#"{"type":"error","error":{"type":"api_error","message":"serialization failed"}}"#.to_string()
    });

    tx.send(Ok(Event::default().event(frame.event_name()).data(data)))
        .await
        .map_err(|_| ())
}

async fn send_error_frame(
    tx: &mpsc::Sender<std::result::Result<Event, Infallible>>,
    error: &GatewayError,
) {
    let envelope = error.to_envelope();
    let data = sonic_rs::to_string(&envelope).unwrap_or_else(|e| {
        log::error!("failed to serialize error envelope: {e}");
        r#"{"type":"error","error":{"type":"api_error","message":"serialization failed"}}"#.to_string()
    });

    // The error frame is terminal; a send failure just means the client
    // is already gone.
    let _ = tx.send(Ok(Event::default().event("error").data(data))).await;
}

fn log_request(
    state: &AppState,
    endpoint: &'static str,
    context: &RequestContext,
    request: &MessagesRequest,
    upstream_model: &str,
) {
    if !state.telemetry.enabled() {
        return;
    }

    let payload = serde_json::to_value(request).ok();

    state.telemetry.record(TelemetryRecord {
        endpoint: Some(endpoint),
        model_inbound: Some(&request.model),
        model_upstream: Some(upstream_model),
        request_payload: payload.as_ref(),
        ..TelemetryRecord::new("request", &context.correlation_id)
    });
}

fn log_error(state: &AppState, endpoint: &'static str, context: &RequestContext, error: &GatewayError) {
    if !state.telemetry.enabled() {
        return;
    }

    let message = error.client_message();

    state.telemetry.record(TelemetryRecord {
        endpoint: Some(endpoint),
        error: Some(&message),
        ..TelemetryRecord::new("error", &context.correlation_id)
    });
}
