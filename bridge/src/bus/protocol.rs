//! Native event payload definitions.
//!
//! The native side emits JSON envelopes of the form
//! `{"event": "<name>", "body": {...}}`.

use photokit_engine::{ChangeDescriptor, Fields};
use serde::{Deserialize, Serialize};

/// Object-level change event name.
pub const OBJECT_CHANGE_EVENT: &str = "onObjectChange";
/// Library-level change event name.
pub const LIBRARY_CHANGE_EVENT: &str = "onLibraryChange";

/// Library-wide change notification. The native side does not scope it to
/// a collection; its body is passed through as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryChange {
    #[serde(flatten)]
    pub details: Fields,
}

/// Progress of a long-running native request, correlated by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Native event name, e.g. `onCreateAssetsProgress`
    pub event: String,
    /// Correlation id handed to the native request
    pub correlation_id: String,
    /// Progress body
    pub payload: serde_json::Value,
}

/// An event dispatched on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    ObjectChange(ChangeDescriptor),
    LibraryChange(LibraryChange),
    Progress(ProgressEvent),
}

/// Event kinds listeners subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ObjectChange,
    LibraryChange,
    Progress,
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::ObjectChange(_) => EventKind::ObjectChange,
            BusEvent::LibraryChange(_) => EventKind::LibraryChange,
            BusEvent::Progress(_) => EventKind::Progress,
        }
    }

    /// Decode a native event envelope.
    pub fn from_native(json: &str) -> serde_json::Result<Self> {
        let envelope: NativeEnvelope = serde_json::from_str(json)?;
        let event = match envelope.event.as_str() {
            OBJECT_CHANGE_EVENT => BusEvent::ObjectChange(serde_json::from_value(envelope.body)?),
            LIBRARY_CHANGE_EVENT => BusEvent::LibraryChange(serde_json::from_value(envelope.body)?),
            _ => {
                let body: ProgressBody = serde_json::from_value(envelope.body)?;
                BusEvent::Progress(ProgressEvent {
                    event: envelope.event,
                    correlation_id: body.id,
                    payload: serde_json::Value::Object(body.rest),
                })
            }
        };
        Ok(event)
    }
}

#[derive(Deserialize)]
struct NativeEnvelope {
    event: String,
    #[serde(default)]
    body: serde_json::Value,
}

#[derive(Deserialize)]
struct ProgressBody {
    id: String,
    #[serde(flatten)]
    rest: Fields,
}
