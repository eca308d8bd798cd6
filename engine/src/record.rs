//! Raw records as delivered by the native library.

use serde::{Deserialize, Serialize};

/// Native field map carried alongside the well-known record fields.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A record exactly as the native library reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// Stable native identifier
    pub local_identifier: String,
    /// Media kind of an asset record (`image`, `video`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Collection type of an album record (`album`, `smartAlbum`, `moment`)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub album_type: Option<String>,
    /// Every other native field
    #[serde(flatten)]
    pub fields: Fields,
}

/// The closed set of entry kinds a raw record can materialize into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Image,
    Video,
    Album,
}

impl EntryKind {
    pub fn name(self) -> &'static str {
        match self {
            EntryKind::Image => "image",
            EntryKind::Video => "video",
            EntryKind::Album => "album",
        }
    }
}

impl RawRecord {
    /// Create an asset record with the given media type.
    pub fn asset(local_identifier: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            local_identifier: local_identifier.into(),
            media_type: Some(media_type.into()),
            album_type: None,
            fields: Fields::new(),
        }
    }

    /// Create an album record with the given collection type.
    pub fn album(local_identifier: impl Into<String>, album_type: impl Into<String>) -> Self {
        Self {
            local_identifier: local_identifier.into(),
            media_type: None,
            album_type: Some(album_type.into()),
            fields: Fields::new(),
        }
    }

    /// Set a native field.
    pub fn with_field(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Classify the record. Unknown or missing discriminants are errors.
    pub fn kind(&self) -> crate::Result<EntryKind> {
        match (self.media_type.as_deref(), self.album_type.as_deref()) {
            (Some("image"), _) => Ok(EntryKind::Image),
            (Some("video"), _) => Ok(EntryKind::Video),
            (Some(other), _) => Err(crate::Error::UnknownDiscriminant(other.to_string())),
            (None, Some("album" | "smartAlbum" | "moment")) => Ok(EntryKind::Album),
            (None, Some(other)) => Err(crate::Error::UnknownDiscriminant(other.to_string())),
            (None, None) => Err(crate::Error::UnknownDiscriminant(format!(
                "<none> for {}",
                self.local_identifier
            ))),
        }
    }

    pub fn u64_field(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(|v| v.as_u64())
    }

    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(|v| v.as_i64())
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(|v| v.as_bool())
    }
}
