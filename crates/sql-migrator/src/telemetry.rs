//! Fire-and-forget telemetry events.
//!
//! The engine emits `migration.up`, `migration.down` and `schema.change`
//! events through an [`EventSink`]. Delivery failures are logged at debug
//! level and otherwise ignored; telemetry never fails an operation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{MigrateError, Result};

pub const MIGRATION_UP: &str = "migration.up";
pub const MIGRATION_DOWN: &str = "migration.down";
pub const SCHEMA_CHANGE: &str = "schema.change";

/// One emitted event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub event: String,
    pub payload: Value,
    pub at: DateTime<Utc>,
}

/// Destination for telemetry events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &str, payload: Value) -> Result<()>;
}

/// Emit through `sink`, swallowing failures.
pub fn emit(sink: &dyn EventSink, event: &str, payload: Value) {
    if let Err(e) = sink.emit(event, payload) {
        debug!("Dropped telemetry event '{}': {}", event, e);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &str, _payload: Value) -> Result<()> {
        Ok(())
    }
}

/// Writes events to the `telemetry` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        info!(target: "telemetry", event, payload = %payload, "telemetry event");
        Ok(())
    }
}

/// Forwards events to a bounded channel without waiting for capacity.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<TelemetryEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<TelemetryEvent>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end of a channel holding up to `capacity` events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &str, payload: Value) -> Result<()> {
        self.tx
            .try_send(TelemetryEvent {
                event: event.to_string(),
                payload,
                at: Utc::now(),
            })
            .map_err(|e| MigrateError::Config(format!("telemetry channel: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::channel(4);
        emit(&sink, MIGRATION_UP, json!({"alias": "main", "steps": 1}));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "migration.up");
        assert_eq!(event.payload["alias"], "main");
    }

    #[test]
    fn test_full_or_closed_channel_is_swallowed() {
        let (sink, rx) = ChannelSink::channel(1);
        emit(&sink, SCHEMA_CHANGE, json!({}));
        assert!(sink.emit(SCHEMA_CHANGE, json!({})).is_err());
        drop(rx);
        assert!(sink.emit(SCHEMA_CHANGE, json!({})).is_err());
        emit(&sink, SCHEMA_CHANGE, json!({}));
    }

    #[test]
    fn test_noop_and_tracing_sinks_accept() {
        assert!(NoopSink.emit(MIGRATION_DOWN, json!(null)).is_ok());
        assert!(TracingSink.emit(MIGRATION_DOWN, json!({"n": 1})).is_ok());
    }
}
