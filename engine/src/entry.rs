//! Entry materializer.
//!
//! Turns raw native records into typed entries. Materialization is
//! synchronous and pure; derived fields (display URI, parsed dates, image
//! and video projections) are computed on first access and cached on the
//! entry itself.

use crate::record::{EntryKind, RawRecord};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::OnceLock;

/// URI scheme used for asset display URIs.
pub const ASSET_URI_SCHEME: &str = "photos://";

/// Options appended to an asset's display URI as a query string.
pub type UriOptions = BTreeMap<String, String>;

/// Image projection of an asset, usable as an image source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub width: u64,
    pub height: u64,
    pub uri: String,
    pub name: String,
}

/// Video projection of a video asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoRef {
    pub uri: String,
    #[serde(rename = "type")]
    pub type_identifier: String,
}

/// Fields shared by every asset variant.
#[derive(Debug, Clone)]
pub struct Asset {
    raw: RawRecord,
    options: Option<UriOptions>,
    uri: OnceLock<String>,
    creation_date: OnceLock<Option<DateTime<Utc>>>,
    modification_date: OnceLock<Option<DateTime<Utc>>>,
    image: OnceLock<ImageRef>,
}

impl Asset {
    fn new(raw: RawRecord) -> Self {
        Self {
            raw,
            options: None,
            uri: OnceLock::new(),
            creation_date: OnceLock::new(),
            modification_date: OnceLock::new(),
            image: OnceLock::new(),
        }
    }

    pub fn local_identifier(&self) -> &str {
        &self.raw.local_identifier
    }

    pub fn media_type(&self) -> &str {
        self.raw.media_type.as_deref().unwrap_or_default()
    }

    pub fn raw(&self) -> &RawRecord {
        &self.raw
    }

    pub fn width(&self) -> u64 {
        self.raw.u64_field("width").unwrap_or(0)
    }

    pub fn height(&self) -> u64 {
        self.raw.u64_field("height").unwrap_or(0)
    }

    pub fn is_favorite(&self) -> bool {
        self.raw.bool_field("favorite").unwrap_or(false)
    }

    pub fn is_hidden(&self) -> bool {
        self.raw.bool_field("hidden").unwrap_or(false)
    }

    /// Replace the display URI options. Derived fields that embed the URI
    /// are recomputed on next access.
    pub fn set_options(&mut self, options: UriOptions) {
        self.options = Some(options);
        self.uri = OnceLock::new();
        self.image = OnceLock::new();
    }

    /// Display URI: `photos://<localIdentifier>` plus the url-encoded options.
    pub fn uri(&self) -> &str {
        self.uri.get_or_init(|| {
            let mut uri = format!("{}{}", ASSET_URI_SCHEME, self.raw.local_identifier);
            if let Some(options) = self.options.as_ref().filter(|o| !o.is_empty()) {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(options.iter())
                    .finish();
                uri.push('?');
                uri.push_str(&query);
            }
            uri
        })
    }

    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        *self
            .creation_date
            .get_or_init(|| utc_seconds(&self.raw, "creationDateUTCSeconds"))
    }

    pub fn modification_date(&self) -> Option<DateTime<Utc>> {
        *self
            .modification_date
            .get_or_init(|| utc_seconds(&self.raw, "modificationDateUTCSeconds"))
    }

    /// Image projection. Videos expose one too, for their thumbnail.
    pub fn image(&self) -> &ImageRef {
        self.image.get_or_init(|| ImageRef {
            width: self.width(),
            height: self.height(),
            uri: self.uri().to_string(),
            name: self
                .raw
                .str_field("originalFilename")
                .unwrap_or(self.raw.local_identifier.as_str())
                .to_string(),
        })
    }
}

fn utc_seconds(raw: &RawRecord, field: &str) -> Option<DateTime<Utc>> {
    let seconds = raw.i64_field(field).filter(|s| *s != 0)?;
    DateTime::from_timestamp(seconds, 0)
}

/// A still image asset.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    asset: Asset,
}

impl Deref for ImageAsset {
    type Target = Asset;

    fn deref(&self) -> &Asset {
        &self.asset
    }
}

/// A video asset.
#[derive(Debug, Clone)]
pub struct VideoAsset {
    asset: Asset,
    video: OnceLock<VideoRef>,
}

impl VideoAsset {
    /// Duration in seconds, when reported.
    pub fn duration(&self) -> Option<f64> {
        self.asset.raw.fields.get("duration").and_then(|v| v.as_f64())
    }

    pub fn video(&self) -> &VideoRef {
        self.video.get_or_init(|| VideoRef {
            uri: self.asset.uri().to_string(),
            type_identifier: self
                .asset
                .raw
                .str_field("uniformTypeIdentifier")
                .unwrap_or_default()
                .to_string(),
        })
    }
}

impl Deref for VideoAsset {
    type Target = Asset;

    fn deref(&self) -> &Asset {
        &self.asset
    }
}

/// Operations an album may permit, in native bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumOperation {
    DeleteContent,
    RemoveContent,
    AddContent,
    CreateContent,
    RearrangeContent,
    Delete,
    Rename,
}

impl AlbumOperation {
    fn position(self) -> usize {
        self as usize
    }
}

/// Album metadata as reported by the native library.
#[derive(Debug, Clone)]
pub struct AlbumInfo {
    raw: RawRecord,
    permitted: Vec<bool>,
    preview_assets: Vec<Entry>,
}

impl AlbumInfo {
    pub fn local_identifier(&self) -> &str {
        &self.raw.local_identifier
    }

    pub fn title(&self) -> &str {
        self.raw.str_field("title").unwrap_or_default()
    }

    pub fn album_type(&self) -> &str {
        self.raw.album_type.as_deref().unwrap_or_default()
    }

    pub fn asset_count(&self) -> Option<u64> {
        self.raw.u64_field("assetCount")
    }

    pub fn raw(&self) -> &RawRecord {
        &self.raw
    }

    pub fn permits(&self, operation: AlbumOperation) -> bool {
        self.permitted
            .get(operation.position())
            .copied()
            .unwrap_or(false)
    }

    pub fn preview_assets(&self) -> &[Entry] {
        &self.preview_assets
    }

    pub fn preview_asset(&self) -> Option<&Entry> {
        self.preview_assets.first()
    }
}

/// A materialized domain object.
#[derive(Debug, Clone)]
pub enum Entry {
    Image(ImageAsset),
    Video(VideoAsset),
    Album(AlbumInfo),
}

impl Entry {
    pub fn local_identifier(&self) -> &str {
        match self {
            Entry::Image(image) => image.local_identifier(),
            Entry::Video(video) => video.local_identifier(),
            Entry::Album(album) => album.local_identifier(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Image(_) => EntryKind::Image,
            Entry::Video(_) => EntryKind::Video,
            Entry::Album(_) => EntryKind::Album,
        }
    }

    pub fn raw(&self) -> &RawRecord {
        match self {
            Entry::Image(image) => image.raw(),
            Entry::Video(video) => video.raw(),
            Entry::Album(album) => album.raw(),
        }
    }

    /// Shared asset fields, for image and video entries.
    pub fn as_asset(&self) -> Option<&Asset> {
        match self {
            Entry::Image(image) => Some(&image.asset),
            Entry::Video(video) => Some(&video.asset),
            Entry::Album(_) => None,
        }
    }

    /// Replace the display URI options of an asset entry. Albums are returned
    /// unchanged.
    pub fn with_options(mut self, options: UriOptions) -> Self {
        match &mut self {
            Entry::Image(image) => image.asset.set_options(options),
            Entry::Video(video) => {
                video.asset.set_options(options);
                video.video = OnceLock::new();
            }
            Entry::Album(_) => {}
        }
        self
    }

    pub fn into_album(self) -> Result<AlbumInfo> {
        match self {
            Entry::Album(album) => Ok(album),
            other => Err(Error::UnexpectedKind {
                expected: EntryKind::Album.name(),
                actual: other.kind().name(),
            }),
        }
    }
}

/// Entries are the same logical item when their native identifiers match.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.local_identifier() == other.local_identifier()
    }
}

/// Materialize any raw record into its entry variant.
pub fn materialize(raw: RawRecord) -> Result<Entry> {
    match raw.kind()? {
        EntryKind::Image => Ok(Entry::Image(ImageAsset {
            asset: Asset::new(raw),
        })),
        EntryKind::Video => Ok(Entry::Video(VideoAsset {
            asset: Asset::new(raw),
            video: OnceLock::new(),
        })),
        EntryKind::Album => materialize_album(raw).map(Entry::Album),
    }
}

/// Materialize a record that must be an image or video asset.
pub fn materialize_asset(raw: RawRecord) -> Result<Entry> {
    let entry = materialize(raw)?;
    if entry.kind() == EntryKind::Album {
        return Err(Error::UnexpectedKind {
            expected: "asset",
            actual: EntryKind::Album.name(),
        });
    }
    Ok(entry)
}

/// Materialize a record that must be an album, including its preview assets.
pub fn materialize_album(mut raw: RawRecord) -> Result<AlbumInfo> {
    let kind = raw.kind()?;
    if kind != EntryKind::Album {
        return Err(Error::UnexpectedKind {
            expected: EntryKind::Album.name(),
            actual: kind.name(),
        });
    }

    let permitted = match raw.fields.get("permittedOperations") {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            Error::InvalidRecord(format!(
                "permittedOperations of {}: {}",
                raw.local_identifier, e
            ))
        })?,
    };

    let preview_assets = match raw.fields.remove("previewAssets") {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(value) => {
            let records: Vec<RawRecord> = serde_json::from_value(value).map_err(|e| {
                Error::InvalidRecord(format!(
                    "previewAssets of {}: {}",
                    raw.local_identifier, e
                ))
            })?;
            records
                .into_iter()
                .map(materialize_asset)
                .collect::<Result<Vec<_>>>()?
        }
    };

    Ok(AlbumInfo {
        raw,
        permitted,
        preview_assets,
    })
}
