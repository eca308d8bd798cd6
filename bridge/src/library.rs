//! Photo library client.
//!
//! [`PhotoLibrary`] is the entry point applications hold on to. It owns the
//! shared [`Context`] every collection created through it refers back to.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use photokit_engine::{materialize_asset, AlbumFetchParams, AssetFetchParams, TrackingKey};
use tokio::runtime::Handle;

use crate::bus::{
    BusEvent, ChangeEventBus, CorrelatedSubscription, EventKind, LibraryChange, Subscription,
};
use crate::collection::{
    new_tracking_key, AlbumQueryResult, AlbumQueryResultCollection, AssetList, KeyOwner,
};
use crate::flight::SingleFlight;
use crate::native::{self, AuthorizationStatus, NativeBridge, TrackingStatus};
use crate::startup::StartupGate;
use crate::{BridgeConfig, Error, Result};

/// State shared by the library and every collection it creates.
pub(crate) struct Context {
    pub(crate) native: Arc<dyn NativeBridge>,
    pub(crate) bus: Arc<ChangeEventBus>,
    pub(crate) flight: SingleFlight,
    pub(crate) startup: StartupGate,
    pub(crate) config: BridgeConfig,
    /// Collection holding each live tracking key
    owners: DashMap<TrackingKey, Weak<dyn KeyOwner>>,
    runtime: Handle,
}

impl Context {
    pub(crate) fn new(native: Arc<dyn NativeBridge>, config: BridgeConfig) -> Result<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Ok(Arc::new(Self {
            startup: StartupGate::new(Arc::clone(&native), config.clear_cache_on_startup),
            flight: SingleFlight::with_runtime(runtime.clone()),
            bus: ChangeEventBus::new_shared(),
            native,
            config,
            owners: DashMap::new(),
            runtime,
        }))
    }

    pub(crate) fn register_owner(&self, key: &TrackingKey, owner: Weak<dyn KeyOwner>) {
        self.owners.insert(key.clone(), owner);
    }

    /// Close the lane of a key whose owner already let go of it.
    pub(crate) fn release_key(&self, key: &TrackingKey) {
        self.owners.remove(key);
        self.flight.release(key);
    }

    /// Take `key` away from the collection holding it, then close its lane.
    fn revoke_key(&self, key: &TrackingKey) {
        let owner = self.owners.remove(key).and_then(|(_, owner)| owner.upgrade());
        if let Some(owner) = owner {
            owner.forget_key(key);
        }
        self.flight.release(key);
    }

    /// Stop native tracking of `key` without waiting for the outcome.
    pub(crate) fn stop_tracking_detached(&self, key: TrackingKey) {
        let bridge = Arc::clone(&self.native);
        let timeout = self.config.native_timeout;
        self.runtime.spawn(async move {
            match native::bounded(timeout, bridge.stop_tracking(&key)).await {
                Ok(status) => {
                    tracing::debug!(tracking_key = %key, status = %status.status, "Tracking key released")
                }
                Err(e) => {
                    tracing::warn!(tracking_key = %key, error = %e, "Failed to release tracking key")
                }
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn owner_count(&self) -> usize {
        self.owners.len()
    }
}

/// Client for the native photo library.
///
/// Must be created inside a tokio runtime. Every operation except
/// [`PhotoLibrary::authorization_status`] waits for library startup first.
#[derive(Clone)]
pub struct PhotoLibrary {
    ctx: Arc<Context>,
}

impl PhotoLibrary {
    pub fn new(native: Arc<dyn NativeBridge>, config: BridgeConfig) -> Result<Self> {
        Ok(Self {
            ctx: Context::new(native, config)?,
        })
    }

    /// The bus native events are delivered on.
    pub fn bus(&self) -> &Arc<ChangeEventBus> {
        &self.ctx.bus
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.ctx.config
    }

    pub fn is_started(&self) -> bool {
        self.ctx.startup.is_ready()
    }

    pub async fn authorization_status(&self) -> Result<AuthorizationStatus> {
        native::bounded(
            self.ctx.config.native_timeout,
            self.ctx.native.authorization_status(),
        )
        .await
    }

    /// Fetch assets outside of any album. The result is not tracked.
    pub async fn get_assets(&self, params: AssetFetchParams) -> Result<AssetList> {
        self.ctx.startup.ensure_started().await?;

        let params = AssetFetchParams {
            tracking_key: None,
            ..params
        }
        .resolved();
        let page = native::bounded(
            self.ctx.config.native_timeout,
            self.ctx.native.fetch_assets(&params),
        )
        .await?;

        let assets = page
            .assets
            .into_iter()
            .map(materialize_asset)
            .collect::<photokit_engine::Result<Vec<_>>>()?;
        tracing::debug!(count = assets.len(), "Assets fetched");

        Ok(AssetList {
            assets: Arc::new(assets),
            includes_last_asset: page.includes_last_asset,
        })
    }

    pub async fn get_albums(&self, params: AlbumFetchParams) -> Result<Arc<AlbumQueryResult>> {
        let results = self.get_albums_many(vec![params]).await?;
        results.into_iter().next().ok_or_else(|| {
            photokit_engine::Error::FetchLengthMismatch {
                requested: 1,
                actual: 0,
            }
            .into()
        })
    }

    /// Run several album queries in one native round trip, one result per
    /// query.
    pub async fn get_albums_many(
        &self,
        params: Vec<AlbumFetchParams>,
    ) -> Result<Vec<Arc<AlbumQueryResult>>> {
        self.ctx.startup.ensure_started().await?;

        let params: Vec<_> = params
            .into_iter()
            .map(|mut query| {
                if query.track_albums_changes && query.tracking_key.is_none() {
                    query.tracking_key = Some(new_tracking_key());
                }
                query
            })
            .collect();

        let snapshots = native::bounded(
            self.ctx.config.native_timeout,
            self.ctx.native.fetch_albums_many(&params),
        )
        .await?;
        if snapshots.len() != params.len() {
            return Err(photokit_engine::Error::FetchLengthMismatch {
                requested: params.len(),
                actual: snapshots.len(),
            }
            .into());
        }

        tracing::debug!(queries = params.len(), "Album queries fetched");

        snapshots
            .into_iter()
            .zip(params)
            .map(|(snapshot, query)| {
                AlbumQueryResult::from_snapshot(Arc::clone(&self.ctx), snapshot, query)
            })
            .collect()
    }

    /// Smart albums and user albums, as one collection.
    ///
    /// `params` is applied to both queries; its `type` and `subType`, when
    /// set, override the defaults.
    pub async fn get_albums_common(
        &self,
        params: AlbumFetchParams,
    ) -> Result<Arc<AlbumQueryResultCollection>> {
        let queries = vec![
            params.clone().with_type_defaults("smartAlbum", "any"),
            params.with_type_defaults("album", "any"),
        ];
        let results = self.get_albums_many(queries).await?;
        Ok(AlbumQueryResultCollection::new(results))
    }

    /// Release a tracking key on the native side.
    ///
    /// The collection holding the key stops tracking too: later changes for
    /// it are ignored and its listeners no longer fire. Without a key this
    /// resolves with the `was-not-tracked` status and does not reach the
    /// native side.
    pub async fn stop_tracking(&self, key: Option<&TrackingKey>) -> Result<TrackingStatus> {
        self.ctx.startup.ensure_started().await?;
        let Some(key) = key else {
            return Ok(TrackingStatus::was_not_tracked());
        };
        tracing::debug!(tracking_key = %key, "Stopping change tracking");
        self.ctx.revoke_key(key);
        native::bounded(
            self.ctx.config.native_timeout,
            self.ctx.native.stop_tracking(key),
        )
        .await
    }

    /// Listen for library-wide changes.
    pub fn on_library_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LibraryChange) + Send + Sync + 'static,
    {
        self.ctx
            .bus
            .subscribe(EventKind::LibraryChange, move |event| {
                if let BusEvent::LibraryChange(change) = event {
                    listener(change);
                }
            })
    }

    /// Listen for progress of one native request.
    ///
    /// Pass the subscription's correlation id along with the request.
    pub fn subscribe_progress<F>(&self, event: &str, handler: F) -> CorrelatedSubscription
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.ctx.bus.subscribe_correlated(event, handler)
    }

    /// Entry point for the platform binding: decode a native event envelope
    /// and dispatch it on the bus.
    pub fn deliver_native_event(&self, json: &str) -> Result<usize> {
        self.ctx.bus.publish_native(json).map_err(|e| {
            tracing::warn!(error = %e, "Dropping malformed native event");
            e
        })
    }
}

impl std::fmt::Debug for PhotoLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoLibrary")
            .field("started", &self.is_started())
            .field("bus", &self.ctx.bus)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBridge;
    use photokit_engine::{ChangeDescriptor, RawRecord};

    fn library() -> (Arc<MemoryBridge>, PhotoLibrary) {
        let native = Arc::new(MemoryBridge::new());
        let library = PhotoLibrary::new(native.clone(), BridgeConfig::default()).unwrap();
        (native, library)
    }

    #[tokio::test]
    async fn authorization_skips_startup() {
        let (native, library) = library();
        native.set_authorization(AuthorizationStatus::Limited);

        let status = library.authorization_status().await.unwrap();
        assert_eq!(status, AuthorizationStatus::Limited);
        assert!(!library.is_started());
        assert!(native.startup_calls().is_empty());
    }

    #[tokio::test]
    async fn operations_start_library_once() {
        let (native, library) = library();
        library.get_assets(AssetFetchParams::default()).await.unwrap();
        library.get_assets(AssetFetchParams::default()).await.unwrap();
        assert!(library.is_started());
        assert_eq!(native.startup_calls(), vec![true]);
    }

    #[tokio::test]
    async fn stop_tracking_without_key() {
        let (_native, library) = library();
        let status = library.stop_tracking(None).await.unwrap();
        assert_eq!(status, TrackingStatus::was_not_tracked());
    }

    #[tokio::test]
    async fn common_albums_merge_both_types() {
        let (native, library) = library();
        native.set_albums(
            "smartAlbum",
            vec![RawRecord::album("favorites", "smartAlbum").with_field("title", "Favorites")],
        );
        native.set_albums(
            "album",
            vec![RawRecord::album("trips", "album").with_field("title", "Trips")],
        );

        let collection = library
            .get_albums_common(AlbumFetchParams::default())
            .await
            .unwrap();
        let titles: Vec<_> = collection
            .albums()
            .iter()
            .map(|album| album.title().to_string())
            .collect();
        assert_eq!(titles, ["Favorites", "Trips"]);
    }

    #[tokio::test]
    async fn malformed_native_event_is_an_error() {
        let (_native, library) = library();
        let err = library.deliver_native_event("not json").unwrap_err();
        assert!(matches!(err, Error::Payload(_)));
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn dropped_results_close_their_lanes() {
        let (native, library) = library();
        native.set_albums(
            "album",
            vec![RawRecord::album("trips", "album").with_field("title", "Trips")],
        );

        let mut keys = Vec::new();
        for _ in 0..3 {
            let result = library
                .get_albums(AlbumFetchParams::of_type("album").tracked())
                .await
                .unwrap();
            let key = result.tracking_key().unwrap();
            result
                .submit_change(ChangeDescriptor::new(key.clone(), 1).with_updated([0]))
                .await
                .unwrap();
            keys.push(key);
        }
        assert_eq!(library.ctx.owner_count(), 0);
        settle().await;

        assert_eq!(library.ctx.flight.lane_count(), 0);
        for key in &keys {
            assert!(!native.is_tracked(key));
        }
    }

    #[tokio::test]
    async fn stop_tracking_revokes_the_owner() {
        let (native, library) = library();
        native.set_albums(
            "album",
            vec![RawRecord::album("trips", "album").with_field("title", "Trips")],
        );
        let result = library
            .get_albums(AlbumFetchParams::of_type("album").tracked())
            .await
            .unwrap();
        let key = result.tracking_key().unwrap();
        assert_eq!(library.ctx.owner_count(), 1);

        let status = library.stop_tracking(Some(&key)).await.unwrap();
        assert_eq!(status, TrackingStatus::stopped());
        assert!(result.tracking_key().is_none());
        assert_eq!(library.ctx.owner_count(), 0);
        assert_eq!(library.ctx.flight.lane_count(), 0);
    }
}
