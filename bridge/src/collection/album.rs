//! Albums and their tracked asset lists.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use photokit_engine::{
    materialize_asset, AlbumInfo, AlbumOperation, AssetFetchParams, ChangeDescriptor, Entry,
    RawRecord, TrackingKey,
};

use super::tracked::{ListSource, TrackedList};
use super::ChangeListener;
use crate::library::Context;
use crate::native::{self, NativeBridge, TrackingStatus};
use crate::{Error, Result};

/// Assets returned by a fetch.
#[derive(Debug, Clone)]
pub struct AssetList {
    pub assets: Arc<Vec<Entry>>,
    /// The fetched range reaches the last asset of the result
    pub includes_last_asset: bool,
}

pub(crate) struct AssetSource {
    native: Arc<dyn NativeBridge>,
    timeout: Duration,
}

impl ListSource for AssetSource {
    type Item = Entry;
    type Params = AssetFetchParams;

    fn fetch_indices(
        &self,
        params: &AssetFetchParams,
        key: &TrackingKey,
        indices: Vec<usize>,
    ) -> BoxFuture<'static, Result<Vec<RawRecord>>> {
        let params = AssetFetchParams {
            indices: Some(indices),
            tracking_key: Some(key.clone()),
            ..params.clone()
        };
        let native = Arc::clone(&self.native);
        let timeout = self.timeout;
        async move { native::bounded(timeout, native.fetch_assets_with_indices(&params)).await }
            .boxed()
    }

    fn materialize(
        &self,
        _params: &AssetFetchParams,
        raw: RawRecord,
    ) -> photokit_engine::Result<Entry> {
        materialize_asset(raw)
    }
}

/// A photo album.
///
/// Album metadata is fixed at materialization. The asset list is loaded with
/// [`Album::get_assets`] and, when the fetch asked for tracking, kept in sync
/// with the native library afterwards.
pub struct Album {
    info: AlbumInfo,
    /// Fetch options used when a fetch does not bring its own
    asset_fetch_options: Option<serde_json::Value>,
    assets: Arc<TrackedList<AssetSource>>,
}

impl Album {
    pub(crate) fn new(
        ctx: Arc<Context>,
        info: AlbumInfo,
        asset_fetch_options: Option<serde_json::Value>,
    ) -> Arc<Self> {
        let source = AssetSource {
            native: Arc::clone(&ctx.native),
            timeout: ctx.config.native_timeout,
        };
        let params = AssetFetchParams {
            album_local_identifier: Some(info.local_identifier().to_string()),
            ..AssetFetchParams::default()
        };
        let sort_order = params.sort_order();
        let assets = TrackedList::new(ctx, source, params, sort_order, Vec::new(), None);

        Arc::new(Self {
            info,
            asset_fetch_options,
            assets,
        })
    }

    pub fn info(&self) -> &AlbumInfo {
        &self.info
    }

    pub fn local_identifier(&self) -> &str {
        self.info.local_identifier()
    }

    pub fn title(&self) -> &str {
        self.info.title()
    }

    pub fn album_type(&self) -> &str {
        self.info.album_type()
    }

    pub fn asset_count(&self) -> Option<u64> {
        self.info.asset_count()
    }

    pub fn permits(&self, operation: AlbumOperation) -> bool {
        self.info.permits(operation)
    }

    pub fn preview_asset(&self) -> Option<&Entry> {
        self.info.preview_asset()
    }

    pub fn tracking_key(&self) -> Option<TrackingKey> {
        self.assets.tracking_key()
    }

    /// The asset list as of the last fetch or applied change.
    pub fn assets(&self) -> Arc<Vec<Entry>> {
        self.assets.items()
    }

    /// Fetch the album's assets and make them the new baseline.
    ///
    /// Asks for change tracking when `params` sets `trackInsertsAndDeletes`
    /// or `trackAssetsChanges`; the album's tracking key is assigned on the
    /// first such fetch. A tracked album only accepts whole-result fetches,
    /// a range fails with [`Error::RangedTracking`].
    pub async fn get_assets(&self, params: AssetFetchParams) -> Result<AssetList> {
        let ctx = self.assets.ctx();
        ctx.startup.ensure_started().await?;

        let ranged = params.start_index.is_some() || params.end_index.is_some();
        if ranged && (params.wants_tracking() || self.assets.tracking_key().is_some()) {
            tracing::warn!(album = %self.local_identifier(), "Refusing tracked fetch of an asset range");
            return Err(Error::RangedTracking);
        }

        let mut params = AssetFetchParams {
            fetch_options: params
                .fetch_options
                .or_else(|| self.asset_fetch_options.clone()),
            album_local_identifier: Some(self.local_identifier().to_string()),
            ..params
        }
        .resolved();
        params.tracking_key = if params.wants_tracking() {
            Some(self.assets.ensure_tracking())
        } else {
            self.assets.tracking_key()
        };

        let page = native::bounded(ctx.config.native_timeout, ctx.native.fetch_assets(&params)).await?;
        let assets = page
            .assets
            .into_iter()
            .map(materialize_asset)
            .collect::<photokit_engine::Result<Vec<_>>>()?;

        tracing::debug!(
            album = %self.local_identifier(),
            count = assets.len(),
            tracked = params.tracking_key.is_some(),
            "Album assets fetched"
        );

        let sort_order = params.sort_order();
        let assets = self.assets.reset(assets, params, sort_order);
        Ok(AssetList {
            assets,
            includes_last_asset: page.includes_last_asset,
        })
    }

    /// Register `listener`, called with the new asset list and the album
    /// after every applied change.
    pub fn on_change<F>(self: &Arc<Self>, listener: F) -> ChangeListener
    where
        F: Fn(&[Entry], &Album) + Send + Sync + 'static,
    {
        let album = Arc::downgrade(self);
        self.assets.on_change(move |assets| {
            if let Some(album) = album.upgrade() {
                listener(assets, album.as_ref());
            }
        })
    }

    /// Queue a change for reconciliation against the asset list.
    ///
    /// Changes delivered on the bus take this path automatically.
    pub fn submit_change(&self, change: ChangeDescriptor) -> BoxFuture<'static, Result<Arc<Vec<Entry>>>> {
        self.assets.submit(change)
    }

    pub async fn stop_tracking(&self) -> Result<TrackingStatus> {
        self.assets.ctx().startup.ensure_started().await?;
        self.assets.stop_tracking().await
    }
}

impl std::fmt::Debug for Album {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Album")
            .field("local_identifier", &self.local_identifier())
            .field("title", &self.title())
            .field("tracking_key", &self.tracking_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBridge;
    use crate::BridgeConfig;
    use photokit_engine::materialize_album;

    fn album(native: &Arc<MemoryBridge>) -> Arc<Album> {
        let ctx = Context::new(native.clone(), BridgeConfig::default()).unwrap();
        let info = materialize_album(
            RawRecord::album("album-1", "album")
                .with_field("title", "Trips")
                .with_field("permittedOperations", vec![false, false, true]),
        )
        .unwrap();
        Album::new(ctx, info, Some(serde_json::json!({"includeHiddenAssets": true})))
    }

    #[tokio::test]
    async fn untracked_fetch_has_no_key() {
        let native = Arc::new(MemoryBridge::new());
        native.set_assets(
            Some("album-1"),
            vec![RawRecord::asset("a", "image"), RawRecord::asset("b", "video")],
        );
        let album = album(&native);

        let list = album.get_assets(AssetFetchParams::default()).await.unwrap();
        let ids: Vec<_> = list.assets.iter().map(Entry::local_identifier).collect();
        assert_eq!(ids, ["b", "a"]);
        assert!(list.includes_last_asset);
        assert!(album.tracking_key().is_none());
        assert_eq!(album.assets().len(), 2);
    }

    #[tokio::test]
    async fn tracked_fetch_keeps_its_key() {
        let native = Arc::new(MemoryBridge::new());
        let album = album(&native);

        album
            .get_assets(AssetFetchParams::default().tracked())
            .await
            .unwrap();
        let key = album.tracking_key().unwrap();
        assert!(native.is_tracked(&key));

        album
            .get_assets(AssetFetchParams::default().tracked())
            .await
            .unwrap();
        assert_eq!(album.tracking_key(), Some(key));
    }

    #[tokio::test]
    async fn metadata_accessors() {
        let native = Arc::new(MemoryBridge::new());
        let album = album(&native);
        assert_eq!(album.title(), "Trips");
        assert!(album.permits(AlbumOperation::AddContent));
        assert!(!album.permits(AlbumOperation::Delete));
        assert!(album.preview_asset().is_none());
    }

    #[tokio::test]
    async fn tracked_range_is_rejected() {
        let native = Arc::new(MemoryBridge::new());
        native.set_assets(
            Some("album-1"),
            vec![RawRecord::asset("a", "image"), RawRecord::asset("b", "image")],
        );
        let album = album(&native);

        let err = album
            .get_assets(AssetFetchParams::range(0, 1).tracked())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RangedTracking));
        assert!(album.tracking_key().is_none());
        assert!(album.assets().is_empty());

        // Untracked pages are fine until the album starts tracking.
        let page = album.get_assets(AssetFetchParams::range(0, 1)).await.unwrap();
        assert_eq!(page.assets.len(), 1);

        album
            .get_assets(AssetFetchParams::default().tracked())
            .await
            .unwrap();
        let err = album
            .get_assets(AssetFetchParams::range(0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RangedTracking));
        assert_eq!(album.assets().len(), 2);
    }
}
