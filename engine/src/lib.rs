//! # PhotoKit Engine
//!
//! The change-reconciliation core for live photo library collections.
//!
//! The native photo library reports changes to a tracked collection (an
//! album's assets, or a list of albums) as index sets relative to the
//! collection it last delivered. This crate turns such a report into the new,
//! correctly ordered collection of materialized entries.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never talks to the native side; the one fetch a
//!   change may need is performed by the caller between planning and applying
//! - **Deterministic**: the same previous sequence, change and fetched
//!   records always produce the same result
//! - **Fail whole**: an invalid change or an unclassifiable record rejects the
//!   entire reconciliation, the previous sequence is never partially modified
//!
//! ## Core Concepts
//!
//! ### Change descriptors
//!
//! A [`ChangeDescriptor`] carries removed, inserted and updated index sets and
//! the new count, or a full replacement list. It is scoped to one
//! [`TrackingKey`].
//!
//! ### Sort order
//!
//! Collections may be displayed most recent first. [`SortOrder::Reversed`]
//! mirrors native indices into local ones.
//!
//! ### Entries
//!
//! Raw native records are materialized into the closed [`Entry`] union of
//! images, videos and albums. Unknown media types are errors.
//!
//! ## Quick Start
//!
//! ```rust
//! use photokit_engine::{materialize, reconcile, ChangeDescriptor, RawRecord, SortOrder};
//!
//! let previous: Vec<_> = ["A", "B", "C", "D"]
//!     .into_iter()
//!     .map(|id| materialize(RawRecord::asset(id, "image")).unwrap())
//!     .collect();
//!
//! let change = ChangeDescriptor::new("key-1", 4)
//!     .with_removed([1])
//!     .with_inserted([3]);
//!
//! let result = reconcile(
//!     &previous,
//!     &change,
//!     SortOrder::Normal,
//!     |indices| {
//!         assert_eq!(indices, &[3]);
//!         Ok(vec![RawRecord::asset("E", "image")])
//!     },
//!     materialize,
//! )
//! .unwrap();
//!
//! let ids: Vec<_> = result.iter().map(|e| e.local_identifier()).collect();
//! assert_eq!(ids, ["A", "C", "D", "E"]);
//! ```

pub mod change;
pub mod entry;
pub mod error;
pub mod params;
pub mod patch;
pub mod record;

// Re-export main types at crate root
pub use change::{ChangeDescriptor, IndexSet, SortOrder, TrackingKey};
pub use entry::{
    materialize, materialize_album, materialize_asset, AlbumInfo, AlbumOperation, Asset, Entry,
    ImageAsset, ImageRef, UriOptions, VideoAsset, VideoRef, ASSET_URI_SCHEME,
};
pub use error::{Error, IndexSetKind, Result};
pub use params::{AlbumFetchParams, AssetFetchParams};
pub use patch::{reconcile, IndexPatch, PatchPlan};
pub use record::{EntryKind, Fields, RawRecord};
