//! Event emission abstraction.
//!
//! Catalog operations report what they changed through an [`EventSink`];
//! frontends decide how (or whether) to surface those notifications.

use std::sync::Arc;

use serde::Serialize;

/// Emitted after a file is registered (base record plus sidecar versions).
pub const IMAGE_IMPORTED: &str = "image-imported";
/// Emitted after a record is duplicated into a new version.
pub const IMAGE_DUPLICATED: &str = "image-duplicated";
/// Emitted after a record and its dependent rows are erased.
pub const IMAGE_REMOVED: &str = "image-removed";

/// Trait for emitting events to the frontend.
pub trait EventSink: Send + Sync {
    /// Emit an event with the given name and JSON payload.
    ///
    /// # Arguments
    /// * `event_name` - The name of the event (e.g., "image-imported")
    /// * `payload_json` - JSON-serialized payload string
    fn emit(&self, event_name: &str, payload_json: &str);
}

/// Extension trait for EventSink that provides typed emit functionality.
pub trait EventSinkExt {
    /// Emit an event with a typed payload that will be serialized to JSON.
    fn emit_typed<T: Serialize>(&self, event_name: &str, payload: &T);
}

impl<S: EventSink + ?Sized> EventSinkExt for S {
    fn emit_typed<T: Serialize>(&self, event_name: &str, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(json) => self.emit(event_name, &json),
            Err(e) => {
                tracing::error!("Failed to serialize event payload: {}", e);
            }
        }
    }
}

/// Shared reference to an EventSink implementation.
pub type SharedEventSink = Arc<dyn EventSink>;

/// No-op event sink for testing or when events are not needed.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event_name: &str, _payload_json: &str) {}
}

/// Logging event sink for debugging purposes.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event_name: &str, payload_json: &str) {
        tracing::debug!(event = event_name, payload = payload_json, "Event emitted");
    }
}

/// Payload of [`IMAGE_IMPORTED`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageImportedPayload {
    pub image_id: i64,
    pub film_id: i64,
    pub filename: String,
    /// Ids created for sidecar versions, in discovery order
    pub version_ids: Vec<i64>,
}

/// Payload of [`IMAGE_DUPLICATED`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDuplicatedPayload {
    pub source_id: i64,
    pub new_id: i64,
}

/// Payload of [`IMAGE_REMOVED`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRemovedPayload {
    pub image_id: i64,
}
