//! Fetch parameters for asset and album queries.
//!
//! Parameters are passed through to the native library as JSON. The engine
//! only interprets the keys that decide tracking and display order.

use crate::record::Fields;
use crate::{SortOrder, TrackingKey};
use serde::{Deserialize, Serialize};

/// Parameters of an asset fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFetchParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
    /// Keep the native order (oldest first) instead of most recent first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_display_start_to_end: Option<bool>,
    #[serde(default)]
    pub asset_display_bottom_up: bool,
    #[serde(default)]
    pub track_inserts_and_deletes: bool,
    #[serde(default)]
    pub track_assets_changes: bool,
    /// Native fetch options, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_options: Option<serde_json::Value>,
    #[serde(rename = "_cacheKey", default, skip_serializing_if = "Option::is_none")]
    pub tracking_key: Option<TrackingKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_local_identifier: Option<String>,
    /// Indices to fetch, for by-index fetches
    #[serde(default, rename = "indecies", skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<usize>>,
    #[serde(flatten)]
    pub extra: Fields,
}

impl AssetFetchParams {
    pub fn range(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index: Some(start_index),
            end_index: Some(end_index),
            ..Self::default()
        }
    }

    /// Request insert/delete and content change notifications.
    pub fn tracked(mut self) -> Self {
        self.track_inserts_and_deletes = true;
        self.track_assets_changes = true;
        self
    }

    pub fn wants_tracking(&self) -> bool {
        self.track_inserts_and_deletes || self.track_assets_changes
    }

    fn has_sort_descriptors(&self) -> bool {
        self.fetch_options
            .as_ref()
            .and_then(|o| o.get("sortDescriptors"))
            .and_then(|d| d.as_array())
            .is_some_and(|d| !d.is_empty())
    }

    /// Resolved `assetDisplayStartToEnd`.
    ///
    /// Defaults to most recent first, except when the caller sorts
    /// explicitly with sort descriptors, in which case native order is kept.
    pub fn display_start_to_end(&self) -> bool {
        self.asset_display_start_to_end
            .unwrap_or_else(|| self.has_sort_descriptors())
    }

    /// Fill in the resolved display order so the native side sees it.
    pub fn resolved(mut self) -> Self {
        self.asset_display_start_to_end = Some(self.display_start_to_end());
        self
    }

    pub fn sort_order(&self) -> SortOrder {
        if self.asset_display_bottom_up == self.display_start_to_end() {
            SortOrder::Reversed
        } else {
            SortOrder::Normal
        }
    }
}

/// Parameters of an album list fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumFetchParams {
    /// `album`, `smartAlbum` or `moment`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub album_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    /// Fetch options applied to each album's assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_fetch_options: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_options: Option<serde_json::Value>,
    /// Number of preview assets to include per album
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_assets: Option<usize>,
    #[serde(default)]
    pub track_albums_changes: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub album_titles: Vec<String>,
    #[serde(rename = "_cacheKey", default, skip_serializing_if = "Option::is_none")]
    pub tracking_key: Option<TrackingKey>,
    #[serde(flatten)]
    pub extra: Fields,
}

impl AlbumFetchParams {
    pub fn of_type(album_type: impl Into<String>) -> Self {
        Self {
            album_type: Some(album_type.into()),
            ..Self::default()
        }
    }

    pub fn tracked(mut self) -> Self {
        self.track_albums_changes = true;
        self
    }

    /// Apply type defaults without overriding what the caller set.
    pub fn with_type_defaults(mut self, album_type: &str, sub_type: &str) -> Self {
        self.album_type.get_or_insert_with(|| album_type.to_string());
        self.sub_type.get_or_insert_with(|| sub_type.to_string());
        self
    }
}
