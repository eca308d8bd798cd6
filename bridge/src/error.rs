//! Unified error handling for the bridge.

use crate::native::NativeError;
use photokit_engine::TrackingKey;
use std::time::Duration;

/// Bridge error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] photokit_engine::Error),

    #[error("Native call failed: {0}")]
    Native(#[from] NativeError),

    #[error("Native call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Library startup failed: {0}")]
    Startup(NativeError),

    #[error("Invalid native payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A newer fetch replaced the collection while the change was in flight.
    #[error("Reconciliation superseded by a newer fetch")]
    Superseded,

    /// The change belongs to a key the collection no longer tracks.
    #[error("Tracking key {0} is not tracked")]
    StaleKey(TrackingKey),

    /// Tracking was asked for on a fetch of part of the result.
    #[error("Change tracking needs the whole result, startIndex/endIndex cannot be tracked")]
    RangedTracking,

    #[error("Reconciliation was cancelled")]
    Cancelled,

    #[error("No tokio runtime available")]
    NoRuntime,
}

impl Error {
    /// Errors that mean the change was intentionally not applied, as opposed
    /// to a failed reconciliation.
    pub fn is_ignored_change(&self) -> bool {
        matches!(self, Error::Superseded | Error::StaleKey(_))
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::StaleKey(TrackingKey::new("k-1"));
        assert_eq!(err.to_string(), "Tracking key k-1 is not tracked");
        assert!(err.is_ignored_change());

        let err = Error::from(photokit_engine::Error::UnknownDiscriminant("audio".into()));
        assert_eq!(err.to_string(), "Engine error: unknown entry discriminant: audio");
        assert!(!err.is_ignored_change());
    }
}
