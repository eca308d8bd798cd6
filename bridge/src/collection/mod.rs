//! Live collections kept in sync with native change notifications.
//!
//! An [`Album`] tracks its asset list, an [`AlbumQueryResult`] tracks a list
//! of albums, and an [`AlbumQueryResultCollection`] groups several query
//! results behind one listener registry.

mod album;
mod query;
mod tracked;

pub use album::{Album, AssetList};
pub use query::{AlbumQueryResult, AlbumQueryResultCollection};

pub(crate) use tracked::{new_tracking_key, KeyOwner};

/// Registration handle returned by the `on_change` methods.
///
/// Dropping the handle unregisters the listener.
#[must_use = "dropping a change listener unregisters it"]
pub struct ChangeListener {
    unregister: Vec<Box<dyn FnOnce() + Send + Sync>>,
}

impl ChangeListener {
    pub(crate) fn new(unregister: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unregister: vec![Box::new(unregister)],
        }
    }

    /// One handle covering several registrations.
    pub(crate) fn merge(listeners: Vec<ChangeListener>) -> Self {
        let mut unregister = Vec::new();
        for mut listener in listeners {
            unregister.append(&mut listener.unregister);
        }
        Self { unregister }
    }

    /// Unregister the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        for unregister in self.unregister.drain(..) {
            unregister();
        }
    }
}

impl std::fmt::Debug for ChangeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeListener")
            .field("registrations", &self.unregister.len())
            .finish()
    }
}
