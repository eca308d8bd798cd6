//! In-process native bridge.
//!
//! Holds the library as plain vectors of raw records in native order. Used
//! by the replay binary and by tests, which can script failures and hold
//! by-index fetches to observe in-flight reconciliations.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use photokit_engine::{AlbumFetchParams, AssetFetchParams, RawRecord, TrackingKey};
use tokio::sync::watch;

use crate::native::{
    AlbumSnapshot, AssetsPage, AuthorizationStatus, NativeBridge, NativeError, TrackingStatus,
};

#[derive(Default)]
struct MemoryState {
    /// Assets per album, `None` holding the whole library
    assets: HashMap<Option<String>, Vec<RawRecord>>,
    /// Albums per album type
    albums: HashMap<String, Vec<RawRecord>>,
    tracked: HashSet<TrackingKey>,
    startup_calls: Vec<bool>,
    failing_startups: usize,
    failing_index_fetches: usize,
    index_fetches: Vec<Vec<usize>>,
}

/// A [`NativeBridge`] backed by in-memory records.
pub struct MemoryBridge {
    state: Mutex<MemoryState>,
    authorization: Mutex<AuthorizationStatus>,
    paused: watch::Sender<bool>,
}

impl Default for MemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            authorization: Mutex::new(AuthorizationStatus::Authorized),
            paused: watch::channel(false).0,
        }
    }

    /// Replace the assets of an album, or of the whole library with `None`.
    pub fn set_assets(&self, album: Option<&str>, records: Vec<RawRecord>) {
        self.state
            .lock()
            .assets
            .insert(album.map(str::to_string), records);
    }

    pub fn assets(&self, album: Option<&str>) -> Vec<RawRecord> {
        self.state
            .lock()
            .assets
            .get(&album.map(str::to_string))
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the albums of one album type.
    pub fn set_albums(&self, album_type: &str, records: Vec<RawRecord>) {
        self.state
            .lock()
            .albums
            .insert(album_type.to_string(), records);
    }

    pub fn set_authorization(&self, status: AuthorizationStatus) {
        *self.authorization.lock() = status;
    }

    /// Fail the next `count` startup calls.
    pub fn fail_startups(&self, count: usize) {
        self.state.lock().failing_startups = count;
    }

    /// Fail the next `count` by-index fetches.
    pub fn fail_index_fetches(&self, count: usize) {
        self.state.lock().failing_index_fetches = count;
    }

    /// Hold every by-index fetch until [`MemoryBridge::resume_index_fetches`].
    pub fn pause_index_fetches(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume_index_fetches(&self) {
        self.paused.send_replace(false);
    }

    /// `clear_cache` argument of every startup call so far.
    pub fn startup_calls(&self) -> Vec<bool> {
        self.state.lock().startup_calls.clone()
    }

    /// Indices of every by-index fetch that reached the bridge, in order.
    pub fn index_fetches(&self) -> Vec<Vec<usize>> {
        self.state.lock().index_fetches.clone()
    }

    pub fn is_tracked(&self, key: &TrackingKey) -> bool {
        self.state.lock().tracked.contains(key)
    }

    async fn index_fetch_gate(&self, indices: &[usize]) -> Result<(), NativeError> {
        self.state.lock().index_fetches.push(indices.to_vec());

        let mut paused = self.paused.subscribe();
        // The sender lives as long as self, so this cannot fail.
        let _ = paused.wait_for(|paused| !*paused).await;

        let mut state = self.state.lock();
        if state.failing_index_fetches > 0 {
            state.failing_index_fetches -= 1;
            return Err(NativeError::new("scripted index fetch failure"));
        }
        Ok(())
    }
}

/// Albums a query selects, in native order.
fn select_albums(state: &MemoryState, query: &AlbumFetchParams) -> Vec<RawRecord> {
    let album_type = query.album_type.as_deref().unwrap_or("album");
    state
        .albums
        .get(album_type)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter(|album| {
            query.album_titles.is_empty()
                || album
                    .str_field("title")
                    .is_some_and(|t| query.album_titles.iter().any(|q| q == t))
        })
        .cloned()
        .collect()
}

fn pick(records: &[RawRecord], indices: &[usize]) -> Result<Vec<RawRecord>, NativeError> {
    indices
        .iter()
        .map(|&i| {
            records.get(i).cloned().ok_or_else(|| {
                NativeError::new(format!("index {} out of range ({} records)", i, records.len()))
            })
        })
        .collect()
}

#[async_trait]
impl NativeBridge for MemoryBridge {
    async fn library_startup(&self, clear_cache: bool) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        state.startup_calls.push(clear_cache);
        if state.failing_startups > 0 {
            state.failing_startups -= 1;
            return Err(NativeError::new("scripted startup failure"));
        }
        if clear_cache {
            state.tracked.clear();
        }
        Ok(())
    }

    async fn authorization_status(&self) -> Result<AuthorizationStatus, NativeError> {
        Ok(*self.authorization.lock())
    }

    async fn fetch_assets(&self, params: &AssetFetchParams) -> Result<AssetsPage, NativeError> {
        let mut state = self.state.lock();
        let mut assets = state
            .assets
            .get(&params.album_local_identifier)
            .cloned()
            .unwrap_or_default();

        if !params.display_start_to_end() {
            assets.reverse();
        }
        if params.asset_display_bottom_up {
            assets.reverse();
        }

        let total = assets.len();
        let start = params.start_index.unwrap_or(0).min(total);
        let end = params.end_index.map_or(total, |end| end.min(total)).max(start);

        if let Some(key) = &params.tracking_key {
            state.tracked.insert(key.clone());
        }

        Ok(AssetsPage {
            assets: assets[start..end].to_vec(),
            includes_last_asset: end == total,
        })
    }

    async fn fetch_assets_with_indices(
        &self,
        params: &AssetFetchParams,
    ) -> Result<Vec<RawRecord>, NativeError> {
        let indices = params.indices.clone().unwrap_or_default();
        self.index_fetch_gate(&indices).await?;

        let state = self.state.lock();
        let assets = state
            .assets
            .get(&params.album_local_identifier)
            .map(Vec::as_slice)
            .unwrap_or_default();
        pick(assets, &indices)
    }

    async fn fetch_albums_many(
        &self,
        params: &[AlbumFetchParams],
    ) -> Result<Vec<AlbumSnapshot>, NativeError> {
        let mut state = self.state.lock();
        let mut snapshots = Vec::with_capacity(params.len());
        for query in params {
            let albums = select_albums(&state, query);
            if let Some(key) = &query.tracking_key {
                state.tracked.insert(key.clone());
            }
            snapshots.push(AlbumSnapshot { albums });
        }
        Ok(snapshots)
    }

    async fn fetch_albums_with_indices(
        &self,
        _key: &TrackingKey,
        indices: &[usize],
        params: &AlbumFetchParams,
    ) -> Result<Vec<RawRecord>, NativeError> {
        self.index_fetch_gate(indices).await?;

        let albums = select_albums(&self.state.lock(), params);
        pick(&albums, indices)
    }

    async fn stop_tracking(&self, key: &TrackingKey) -> Result<TrackingStatus, NativeError> {
        if self.state.lock().tracked.remove(key) {
            Ok(TrackingStatus::stopped())
        } else {
            Ok(TrackingStatus::was_not_tracked())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(ids: &[&str]) -> Vec<RawRecord> {
        ids.iter().map(|id| RawRecord::asset(*id, "image")).collect()
    }

    fn page_ids(page: &AssetsPage) -> Vec<&str> {
        page.assets.iter().map(|r| r.local_identifier.as_str()).collect()
    }

    #[tokio::test]
    async fn display_order_follows_params() {
        let bridge = MemoryBridge::new();
        bridge.set_assets(None, images(&["old", "mid", "new"]));

        let page = bridge
            .fetch_assets(&AssetFetchParams::default())
            .await
            .unwrap();
        assert_eq!(page_ids(&page), ["new", "mid", "old"]);

        let params = AssetFetchParams {
            asset_display_start_to_end: Some(true),
            ..AssetFetchParams::default()
        };
        let page = bridge.fetch_assets(&params).await.unwrap();
        assert_eq!(page_ids(&page), ["old", "mid", "new"]);
    }

    #[tokio::test]
    async fn ranges_report_last_asset() {
        let bridge = MemoryBridge::new();
        bridge.set_assets(None, images(&["a", "b", "c"]));

        let page = bridge
            .fetch_assets(&AssetFetchParams::range(0, 2))
            .await
            .unwrap();
        assert_eq!(page.assets.len(), 2);
        assert!(!page.includes_last_asset);

        let page = bridge
            .fetch_assets(&AssetFetchParams::range(2, 10))
            .await
            .unwrap();
        assert_eq!(page.assets.len(), 1);
        assert!(page.includes_last_asset);
    }

    #[tokio::test]
    async fn index_fetch_uses_native_order() {
        let bridge = MemoryBridge::new();
        bridge.set_assets(Some("album"), images(&["a", "b", "c"]));

        let params = AssetFetchParams {
            album_local_identifier: Some("album".into()),
            indices: Some(vec![2, 0]),
            ..AssetFetchParams::default()
        };
        let records = bridge.fetch_assets_with_indices(&params).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.local_identifier.as_str()).collect();
        assert_eq!(ids, ["c", "a"]);
        assert_eq!(bridge.index_fetches(), vec![vec![2, 0]]);

        let params = AssetFetchParams {
            indices: Some(vec![5]),
            ..params
        };
        assert!(bridge.fetch_assets_with_indices(&params).await.is_err());
    }

    #[tokio::test]
    async fn tracking_lifecycle() {
        let bridge = MemoryBridge::new();
        let key = TrackingKey::new("k");
        let params = AssetFetchParams {
            tracking_key: Some(key.clone()),
            ..AssetFetchParams::default()
        };

        bridge.fetch_assets(&params).await.unwrap();
        assert!(bridge.is_tracked(&key));

        assert_eq!(bridge.stop_tracking(&key).await.unwrap(), TrackingStatus::stopped());
        assert_eq!(
            bridge.stop_tracking(&key).await.unwrap(),
            TrackingStatus::was_not_tracked()
        );
    }

    #[tokio::test]
    async fn albums_filtered_by_title() {
        let bridge = MemoryBridge::new();
        bridge.set_albums(
            "album",
            vec![
                RawRecord::album("1", "album").with_field("title", "Trips"),
                RawRecord::album("2", "album").with_field("title", "Pets"),
            ],
        );

        let params = AlbumFetchParams {
            album_titles: vec!["Pets".into()],
            ..AlbumFetchParams::of_type("album")
        };
        let snapshots = bridge.fetch_albums_many(&[params]).await.unwrap();
        assert_eq!(snapshots[0].albums.len(), 1);
        assert_eq!(snapshots[0].albums[0].local_identifier, "2");
    }

    #[tokio::test]
    async fn album_index_fetch_uses_filtered_order() {
        let bridge = MemoryBridge::new();
        bridge.set_albums(
            "album",
            vec![
                RawRecord::album("1", "album").with_field("title", "Trips"),
                RawRecord::album("2", "album").with_field("title", "Pets"),
                RawRecord::album("3", "album").with_field("title", "Pets"),
            ],
        );

        let params = AlbumFetchParams {
            album_titles: vec!["Pets".into()],
            ..AlbumFetchParams::of_type("album")
        };
        let key = TrackingKey::new("albums");
        let records = bridge
            .fetch_albums_with_indices(&key, &[1, 0], &params)
            .await
            .unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.local_identifier.as_str()).collect();
        assert_eq!(ids, ["3", "2"]);

        assert!(bridge
            .fetch_albums_with_indices(&key, &[2], &params)
            .await
            .is_err());
    }
}
