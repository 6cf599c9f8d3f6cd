//! Narrow observability seam.
//!
//! The core hands unredacted structures to a [`TelemetrySink`] and trusts
//! it with redaction and transport. Handlers check [`TelemetrySink::enabled`]
//! before building payloads, so a [`NoopSink`] costs nothing.

use serde_json::Value;

use crate::protocol::anthropic::Usage;

/// One observability record emitted by a handler.
#[derive(Debug, Default)]
pub struct TelemetryRecord<'a> {
    pub event: &'a str,
    pub correlation_id: &'a str,
    pub endpoint: Option<&'a str>,
    pub model_inbound: Option<&'a str>,
    pub model_upstream: Option<&'a str>,
    pub request_payload: Option<&'a Value>,
    pub response_payload: Option<&'a Value>,
    pub usage: Option<Usage>,
    pub error: Option<&'a str>,
}

impl<'a> TelemetryRecord<'a> {
    pub fn new(event: &'a str, correlation_id: &'a str) -> Self {
        Self {
            event,
            correlation_id,
            ..Default::default()
        }
    }
}

/// Where telemetry records go.
pub trait TelemetrySink: Send + Sync {
    /// Whether records will be consumed at all. When false, callers skip
    /// payload construction entirely.
    fn enabled(&self) -> bool;

    fn record(&self, record: TelemetryRecord<'_>);
}

/// Sink that discards everything.
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn enabled(&self) -> bool {
        false
    }

    fn record(&self, _record: TelemetryRecord<'_>) {}
}

/// Sink that serializes records through the `log` facade.
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn enabled(&self) -> bool {
        true
    }

    fn record(&self, record: TelemetryRecord<'_>) {
        let mut fields = serde_json::Map::new();

        fields.insert("event".to_string(), record.event.into());
        fields.insert("correlation_id".to_string(), record.correlation_id.into());

        if let Some(endpoint) = record.endpoint {
            fields.insert("endpoint".to_string(), endpoint.into());
        }
        if let Some(model) = record.model_inbound {
            fields.insert("model_anthropic".to_string(), model.into());
        }
        if let Some(model) = record.model_upstream {
            fields.insert("model_openai".to_string(), model.into());
        }
        if let Some(payload) = record.request_payload {
            fields.insert("request_payload".to_string(), payload.clone());
        }
        if let Some(payload) = record.response_payload {
            fields.insert("response_payload".to_string(), payload.clone());
        }
        if let Some(usage) = record.usage
            && let Ok(usage) = serde_json::to_value(usage)
        {
            fields.insert("usage".to_string(), usage);
        }
        if let Some(error) = record.error {
            fields.insert("error".to_string(), error.into());
        }

        log::info!(target: "crosswire::telemetry", "{}", Value::Object(fields));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_is_disabled() {
        assert!(!NoopSink.enabled());
    }

    #[test]
    fn log_sink_is_enabled() {
        assert!(LogSink.enabled());
    }
}
