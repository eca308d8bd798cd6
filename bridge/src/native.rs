//! Native photo library collaborator.
//!
//! Everything the reconciliation core needs from the platform goes through
//! [`NativeBridge`]. The platform binding implements it on top of the
//! operating system's photo APIs; [`crate::memory::MemoryBridge`] implements
//! it in process.

use crate::{Error, Result};
use async_trait::async_trait;
use photokit_engine::{AlbumFetchParams, AssetFetchParams, RawRecord, TrackingKey};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Error reported by the native side.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One page of an asset fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetsPage {
    pub assets: Vec<RawRecord>,
    #[serde(default)]
    pub includes_last_asset: bool,
}

/// Result of one album query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumSnapshot {
    pub albums: Vec<RawRecord>,
}

/// Outcome of a stop-tracking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingStatus {
    pub success: bool,
    pub status: String,
}

impl TrackingStatus {
    pub fn was_not_tracked() -> Self {
        Self {
            success: true,
            status: "was-not-tracked".to_string(),
        }
    }

    pub fn stopped() -> Self {
        Self {
            success: true,
            status: "stopped".to_string(),
        }
    }
}

/// Photo library authorization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
    Limited,
}

/// Calls into the native photo library.
///
/// A fetch whose parameters carry a tracking key starts change tracking for
/// that key on the native side; changes are then reported through the
/// change event bus until [`NativeBridge::stop_tracking`] is called.
#[async_trait]
pub trait NativeBridge: Send + Sync {
    /// Prepare the native library, optionally dropping its caches.
    async fn library_startup(&self, clear_cache: bool) -> std::result::Result<(), NativeError>;

    async fn authorization_status(&self) -> std::result::Result<AuthorizationStatus, NativeError>;

    /// Fetch assets, in display order.
    async fn fetch_assets(
        &self,
        params: &AssetFetchParams,
    ) -> std::result::Result<AssetsPage, NativeError>;

    /// Fetch assets at `params.indices`, native indices, in request order.
    async fn fetch_assets_with_indices(
        &self,
        params: &AssetFetchParams,
    ) -> std::result::Result<Vec<RawRecord>, NativeError>;

    /// Run several album queries, one snapshot per query.
    async fn fetch_albums_many(
        &self,
        params: &[AlbumFetchParams],
    ) -> std::result::Result<Vec<AlbumSnapshot>, NativeError>;

    /// Fetch the albums of a tracked album query at native `indices`, in
    /// request order.
    async fn fetch_albums_with_indices(
        &self,
        key: &TrackingKey,
        indices: &[usize],
        params: &AlbumFetchParams,
    ) -> std::result::Result<Vec<RawRecord>, NativeError>;

    async fn stop_tracking(
        &self,
        key: &TrackingKey,
    ) -> std::result::Result<TrackingStatus, NativeError>;
}

/// Await a native call, bounded by `timeout`.
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, NativeError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_maps_errors() {
        let ok = bounded(Duration::from_secs(1), async { Ok::<_, NativeError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = bounded(Duration::from_secs(1), async {
            Err::<(), _>(NativeError::new("boom"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Native(e) if e.message == "boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_times_out() {
        let err = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, NativeError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn status_wire_format() {
        let json = serde_json::to_string(&TrackingStatus::was_not_tracked()).unwrap();
        assert_eq!(json, r#"{"success":true,"status":"was-not-tracked"}"#);
    }
}
