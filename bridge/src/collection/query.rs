//! Tracked album lists.

use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use photokit_engine::{
    materialize_album, AlbumFetchParams, ChangeDescriptor, RawRecord, SortOrder, TrackingKey,
};

use super::album::Album;
use super::tracked::{ListSource, TrackedList};
use super::ChangeListener;
use crate::library::Context;
use crate::native::{self, AlbumSnapshot, TrackingStatus};
use crate::{Error, Result};

pub(crate) struct AlbumSource {
    ctx: Arc<Context>,
}

impl ListSource for AlbumSource {
    type Item = Arc<Album>;
    type Params = AlbumFetchParams;

    fn fetch_indices(
        &self,
        params: &AlbumFetchParams,
        key: &TrackingKey,
        indices: Vec<usize>,
    ) -> BoxFuture<'static, Result<Vec<RawRecord>>> {
        let ctx = Arc::clone(&self.ctx);
        let params = params.clone();
        let key = key.clone();
        async move {
            native::bounded(
                ctx.config.native_timeout,
                ctx.native.fetch_albums_with_indices(&key, &indices, &params),
            )
            .await
        }
        .boxed()
    }

    fn materialize(
        &self,
        params: &AlbumFetchParams,
        raw: RawRecord,
    ) -> photokit_engine::Result<Arc<Album>> {
        let info = materialize_album(raw)?;
        Ok(Album::new(
            Arc::clone(&self.ctx),
            info,
            params.asset_fetch_options.clone(),
        ))
    }
}

/// The albums matching one album query.
pub struct AlbumQueryResult {
    albums: Arc<TrackedList<AlbumSource>>,
}

impl AlbumQueryResult {
    /// Build a result from a native snapshot fetched with `params`.
    ///
    /// The result tracks changes when `params` carries a tracking key.
    pub(crate) fn from_snapshot(
        ctx: Arc<Context>,
        snapshot: AlbumSnapshot,
        params: AlbumFetchParams,
    ) -> Result<Arc<Self>> {
        let source = AlbumSource {
            ctx: Arc::clone(&ctx),
        };
        let albums = materialize_all(&source, &params, snapshot.albums)?;
        let tracking_key = params.tracking_key.clone();
        let albums = TrackedList::new(
            ctx,
            source,
            params,
            SortOrder::Normal,
            albums,
            tracking_key,
        );
        Ok(Arc::new(Self { albums }))
    }

    pub fn albums(&self) -> Arc<Vec<Arc<Album>>> {
        self.albums.items()
    }

    /// Parameters of the fetch that produced the current baseline.
    pub fn params(&self) -> AlbumFetchParams {
        self.albums.params()
    }

    pub fn tracking_key(&self) -> Option<TrackingKey> {
        self.albums.tracking_key()
    }

    /// Re-run the query and make its result the new baseline.
    pub async fn fetch(&self, params: AlbumFetchParams) -> Result<Arc<Vec<Arc<Album>>>> {
        let ctx = self.albums.ctx();
        ctx.startup.ensure_started().await?;

        let mut params = params;
        params.tracking_key = if params.track_albums_changes {
            Some(self.albums.ensure_tracking())
        } else {
            self.albums.tracking_key()
        };

        let snapshots = native::bounded(
            ctx.config.native_timeout,
            ctx.native.fetch_albums_many(std::slice::from_ref(&params)),
        )
        .await?;
        let snapshot = snapshots.into_iter().next().ok_or(
            photokit_engine::Error::FetchLengthMismatch {
                requested: 1,
                actual: 0,
            },
        )?;

        let source = AlbumSource {
            ctx: Arc::clone(ctx),
        };
        let albums = materialize_all(&source, &params, snapshot.albums)?;
        Ok(self.albums.reset(albums, params, SortOrder::Normal))
    }

    /// Register `listener`, called with the new album list and the query
    /// result after every applied change.
    pub fn on_change<F>(self: &Arc<Self>, listener: F) -> ChangeListener
    where
        F: Fn(&[Arc<Album>], &AlbumQueryResult) + Send + Sync + 'static,
    {
        let result = Arc::downgrade(self);
        self.albums.on_change(move |albums| {
            if let Some(result) = result.upgrade() {
                listener(albums, result.as_ref());
            }
        })
    }

    pub fn submit_change(
        &self,
        change: ChangeDescriptor,
    ) -> BoxFuture<'static, Result<Arc<Vec<Arc<Album>>>>> {
        self.albums.submit(change)
    }

    pub async fn stop_tracking(&self) -> Result<TrackingStatus> {
        self.albums.ctx().startup.ensure_started().await?;
        self.albums.stop_tracking().await
    }
}

impl std::fmt::Debug for AlbumQueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlbumQueryResult")
            .field("albums", &self.albums().len())
            .field("tracking_key", &self.tracking_key())
            .finish()
    }
}

fn materialize_all(
    source: &AlbumSource,
    params: &AlbumFetchParams,
    records: Vec<RawRecord>,
) -> photokit_engine::Result<Vec<Arc<Album>>> {
    records
        .into_iter()
        .map(|raw| source.materialize(params, raw))
        .collect()
}

/// Several query results presented as one album list.
///
/// Holds no tracking key of its own; each child tracks its own query.
#[derive(Debug)]
pub struct AlbumQueryResultCollection {
    results: Vec<Arc<AlbumQueryResult>>,
}

impl AlbumQueryResultCollection {
    pub fn new(results: Vec<Arc<AlbumQueryResult>>) -> Arc<Self> {
        Arc::new(Self { results })
    }

    pub fn results(&self) -> &[Arc<AlbumQueryResult>] {
        &self.results
    }

    /// Albums of every child, in child order.
    pub fn albums(&self) -> Vec<Arc<Album>> {
        let mut albums = Vec::new();
        for result in &self.results {
            albums.extend(result.albums().iter().cloned());
        }
        albums
    }

    /// Register `listener`, called with the merged album list whenever any
    /// child applies a change.
    pub fn on_change<F>(self: &Arc<Self>, listener: F) -> ChangeListener
    where
        F: Fn(&[Arc<Album>], &AlbumQueryResultCollection) + Send + Sync + 'static,
    {
        let listener = Arc::new(listener);
        let registrations = self
            .results
            .iter()
            .map(|result| {
                let collection = Arc::downgrade(self);
                let listener = Arc::clone(&listener);
                result.albums.on_change(move |_| {
                    if let Some(collection) = collection.upgrade() {
                        listener(collection.albums().as_slice(), collection.as_ref());
                    }
                })
            })
            .collect();
        ChangeListener::merge(registrations)
    }

    /// Route a change to the child tracking its key.
    pub fn submit_change(
        &self,
        change: ChangeDescriptor,
    ) -> BoxFuture<'static, Result<Arc<Vec<Arc<Album>>>>> {
        let target = self
            .results
            .iter()
            .find(|result| result.tracking_key().as_ref() == Some(&change.tracking_key));
        match target {
            Some(result) => result.submit_change(change),
            None => future::ready(Err(Error::StaleKey(change.tracking_key))).boxed(),
        }
    }

    /// Stop tracking on every child.
    pub async fn stop_tracking(&self) -> Result<Vec<TrackingStatus>> {
        future::try_join_all(self.results.iter().map(|result| result.stop_tracking())).await
    }
}
