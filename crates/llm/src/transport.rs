//! HTTP transport to the OpenAI Responses upstream.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::{
    Client,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::{GatewayError, Result};
use crate::http_client::http_client;
use crate::protocol::openai::{ResponsesRequest, ResponsesResult, ResponsesStreamEvent};
use crate::request::CORRELATION_ID_HEADER;

/// Parsed upstream SSE events, in arrival order.
pub type UpstreamEventStream = Pin<Box<dyn Stream<Item = Result<ResponsesStreamEvent>> + Send>>;

/// Client for the `{base}/responses` endpoint.
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl UpstreamClient {
    pub fn new(config: &config::Config) -> Self {
        Self {
            client: http_client(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn api_key(&self) -> Result<&SecretString> {
        self.api_key.as_ref().ok_or(GatewayError::MissingCredentials)
    }

    async fn send(&self, payload: &ResponsesRequest, correlation_id: &str) -> Result<reqwest::Response> {
        let key = self.api_key()?;
        let url = format!("{}/responses", self.base_url);

        let body = sonic_rs::to_vec(payload)
            .map_err(|e| GatewayError::Internal(format!("failed to serialize upstream request: {e}")))?;

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()))
            .header(CONTENT_TYPE, "application/json")
            .header(CORRELATION_ID_HEADER, correlation_id)
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Connection(format!("failed to reach upstream: {e}")))?;

        let status = response.status();

        if !status.is_success() {
            let payload = safe_json(response).await;
            log::error!("upstream error ({status}): {payload}");

            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                payload,
            });
        }

        Ok(response)
    }

    /// POST the mapped payload and return the terminal response envelope.
    pub async fn create_response(
        &self,
        payload: &ResponsesRequest,
        correlation_id: &str,
    ) -> Result<ResponsesResult> {
        let response = self.send(payload, correlation_id).await?;

        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Connection(format!("failed to read upstream response: {e}")))?;

        sonic_rs::from_str(&text).map_err(|e| {
            log::error!("failed to parse upstream response: {e}");
            GatewayError::Internal("failed to parse upstream response".to_string())
        })
    }

    /// POST with `stream: true` and return the parsed SSE event stream.
    pub async fn stream_events(
        &self,
        payload: &ResponsesRequest,
        correlation_id: &str,
    ) -> Result<UpstreamEventStream> {
        let mut payload = payload.clone();
        payload.stream = Some(true);

        let response = self.send(&payload, correlation_id).await?;

        let events = response.bytes_stream().eventsource().filter_map(|event| async move {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    return Some(Err(GatewayError::Connection(format!(
                        "upstream stream error: {e}"
                    ))));
                }
            };

            if event.data == "[DONE]" {
                return None;
            }

            match sonic_rs::from_str::<ResponsesStreamEvent>(&event.data) {
                Ok(parsed) => Some(Ok(parsed)),
                Err(e) => {
                    log::warn!("skipping unparseable upstream stream event: {e}");
                    None
                }
            }
        });

        Ok(Box::pin(events))
    }
}

/// Read an error body, falling back to wrapping the raw text when it is
/// not JSON.
async fn safe_json(response: reqwest::Response) -> Value {
    let text = response.text().await.unwrap_or_default();

    serde_json::from_str(&text)
        .unwrap_or_else(|_| serde_json::json!({"error": {"message": text}}))
}
