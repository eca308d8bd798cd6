//! # PhotoKit Bridge
//!
//! Live photo library collections kept in sync with native change
//! notifications.
//!
//! The native side reports changes to tracked collections as events on a
//! [`ChangeEventBus`]. Each tracked collection picks up the changes for its
//! tracking key, reconciles them one at a time against its current list with
//! [`photokit_engine`], and notifies its own listeners.
//!
//! ```no_run
//! use std::sync::Arc;
//! use photokit_bridge::{BridgeConfig, MemoryBridge, PhotoLibrary};
//! use photokit_engine::AlbumFetchParams;
//!
//! # async fn run() -> photokit_bridge::Result<()> {
//! let library = PhotoLibrary::new(Arc::new(MemoryBridge::new()), BridgeConfig::default())?;
//! let albums = library.get_albums(AlbumFetchParams::of_type("album").tracked()).await?;
//! let _listener = albums.on_change(|albums, _| println!("{} albums", albums.len()));
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod collection;
pub mod config;
pub mod error;
pub mod flight;
pub mod library;
pub mod memory;
pub mod native;
pub mod reconcile;
pub mod startup;

pub use bus::{BusEvent, ChangeEventBus, EventKind, Subscription};
pub use collection::{Album, AlbumQueryResult, AlbumQueryResultCollection, AssetList, ChangeListener};
pub use config::{BridgeConfig, ConfigError};
pub use error::{Error, Result};
pub use flight::SingleFlight;
pub use library::PhotoLibrary;
pub use memory::MemoryBridge;
pub use native::{AuthorizationStatus, NativeBridge, NativeError, TrackingStatus};
