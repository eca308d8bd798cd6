//! Shared core of every tracked collection.
//!
//! A [`TrackedList`] owns an ordered list of items, the tracking key it was
//! registered with on the native side, and the listeners of the owning
//! collection. Object changes for its key are reconciled one at a time
//! through the single-flight guard.
//!
//! The key is registered with the library context while the list holds it,
//! so the library can revoke it. Dropping the list releases the key on both
//! sides.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use photokit_engine::{ChangeDescriptor, RawRecord, SortOrder, TrackingKey};

use super::ChangeListener;
use crate::bus::{BusEvent, EventKind, Subscription};
use crate::library::Context;
use crate::native::{self, TrackingStatus};
use crate::{reconcile, Error, Result};

/// Where a tracked list loads fresh records from.
pub(crate) trait ListSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;
    /// Fetch parameters the current baseline was loaded with
    type Params: Clone + Send + Sync + 'static;

    /// Load the records at native `indices` for a reconciliation.
    fn fetch_indices(
        &self,
        params: &Self::Params,
        key: &TrackingKey,
        indices: Vec<usize>,
    ) -> BoxFuture<'static, Result<Vec<RawRecord>>>;

    fn materialize(
        &self,
        params: &Self::Params,
        raw: RawRecord,
    ) -> photokit_engine::Result<Self::Item>;
}

type Items<T> = Arc<Vec<T>>;

type Listener<T> = Arc<dyn Fn(&[T]) + Send + Sync>;
type Listeners<T> = RwLock<Vec<(u64, Listener<T>)>>;

struct ListState<S: ListSource> {
    items: Items<S::Item>,
    params: S::Params,
    sort_order: SortOrder,
    tracking_key: Option<TrackingKey>,
    /// Bumped every time a fetch replaces the baseline
    generation: u64,
}

/// A collection the library can take a tracking key away from.
pub(crate) trait KeyOwner: Send + Sync {
    /// Stop reacting to `key` if it is still the owner's key.
    fn forget_key(&self, key: &TrackingKey);
}

pub(crate) fn new_tracking_key() -> TrackingKey {
    TrackingKey::new(uuid::Uuid::new_v4().to_string())
}

pub(crate) struct TrackedList<S: ListSource> {
    ctx: Arc<Context>,
    source: S,
    state: Mutex<ListState<S>>,
    listeners: Arc<Listeners<S::Item>>,
    next_listener: AtomicU64,
    subscription: Mutex<Option<Subscription>>,
}

impl<S: ListSource> TrackedList<S> {
    pub(crate) fn new(
        ctx: Arc<Context>,
        source: S,
        params: S::Params,
        sort_order: SortOrder,
        items: Vec<S::Item>,
        tracking_key: Option<TrackingKey>,
    ) -> Arc<Self> {
        let key = tracking_key.clone();
        let list = Arc::new(Self {
            ctx,
            source,
            state: Mutex::new(ListState {
                items: Arc::new(items),
                params,
                sort_order,
                tracking_key,
                generation: 0,
            }),
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_listener: AtomicU64::new(0),
            subscription: Mutex::new(None),
        });
        if let Some(key) = key {
            list.attach(&key);
        }
        list
    }

    pub(crate) fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub(crate) fn items(&self) -> Items<S::Item> {
        Arc::clone(&self.state.lock().items)
    }

    pub(crate) fn params(&self) -> S::Params {
        self.state.lock().params.clone()
    }

    pub(crate) fn tracking_key(&self) -> Option<TrackingKey> {
        self.state.lock().tracking_key.clone()
    }

    fn is_tracking(&self, key: &TrackingKey) -> bool {
        self.state.lock().tracking_key.as_ref() == Some(key)
    }

    /// The tracking key, assigning a fresh one if the list is not tracked.
    pub(crate) fn ensure_tracking(self: &Arc<Self>) -> TrackingKey {
        let key = {
            let mut state = self.state.lock();
            if let Some(key) = &state.tracking_key {
                return key.clone();
            }
            let key = new_tracking_key();
            state.tracking_key = Some(key.clone());
            key
        };
        tracing::debug!(tracking_key = %key, "Tracking key assigned");
        self.attach(&key);
        key
    }

    fn attach(self: &Arc<Self>, key: &TrackingKey) {
        let list = Arc::downgrade(self);
        self.ctx.register_owner(key, list.clone());

        let subscription = self
            .ctx
            .bus
            .subscribe(EventKind::ObjectChange, move |event| {
                if let (BusEvent::ObjectChange(change), Some(list)) = (event, list.upgrade()) {
                    list.route(change);
                }
            });
        *self.subscription.lock() = Some(subscription);
    }

    fn route(self: &Arc<Self>, change: &ChangeDescriptor) {
        if !self.is_tracking(&change.tracking_key) {
            return;
        }
        tracing::debug!(tracking_key = %change.tracking_key, "Object change received");
        // Queued before this returns; the outcome is logged by the job.
        drop(self.submit(change.clone()));
    }

    /// Replace the baseline with a fresh fetch result.
    ///
    /// Reconciliations still running against the old baseline are discarded
    /// when they finish.
    pub(crate) fn reset(
        &self,
        items: Vec<S::Item>,
        params: S::Params,
        sort_order: SortOrder,
    ) -> Items<S::Item> {
        let items = Arc::new(items);
        let mut state = self.state.lock();
        state.items = Arc::clone(&items);
        state.params = params;
        state.sort_order = sort_order;
        state.generation += 1;
        items
    }

    /// Queue `change` behind earlier changes for the same key.
    ///
    /// The change is queued before this returns. A change for a key this
    /// list does not track resolves with [`Error::StaleKey`].
    pub(crate) fn submit(
        self: &Arc<Self>,
        change: ChangeDescriptor,
    ) -> BoxFuture<'static, Result<Items<S::Item>>> {
        let key = change.tracking_key.clone();
        let list = Arc::clone(self);

        // Enqueue under the state lock so a concurrent stop cannot release
        // the lane between the key check and the submit.
        let state = self.state.lock();
        if state.tracking_key.as_ref() != Some(&key) {
            drop(state);
            tracing::debug!(tracking_key = %key, "Ignoring change for untracked key");
            return future::ready(Err(Error::StaleKey(key))).boxed();
        }
        let outcome = self
            .ctx
            .flight
            .submit(&key, async move { list.apply_change(change).await });
        drop(state);

        async move { outcome.await? }.boxed()
    }

    async fn apply_change(self: Arc<Self>, change: ChangeDescriptor) -> Result<Items<S::Item>> {
        let key = change.tracking_key.clone();
        let (base, params, sort_order, generation) = {
            let state = self.state.lock();
            if state.tracking_key.as_ref() != Some(&key) {
                return Err(Error::StaleKey(key));
            }
            (
                Arc::clone(&state.items),
                state.params.clone(),
                state.sort_order,
                state.generation,
            )
        };

        let result = reconcile::reconcile(
            base.as_slice(),
            &change,
            sort_order,
            |indices| self.source.fetch_indices(&params, &key, indices),
            |raw| self.source.materialize(&params, raw),
        )
        .await;

        let items = match result {
            Ok(items) => Arc::new(items),
            Err(e) => {
                tracing::warn!(tracking_key = %key, error = %e, "Change reconciliation failed");
                return Err(e);
            }
        };

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                tracing::debug!(tracking_key = %key, "Discarding reconciliation against a replaced baseline");
                return Err(Error::Superseded);
            }
            state.items = Arc::clone(&items);
        }

        tracing::debug!(tracking_key = %key, count = items.len(), "Change applied");
        self.notify(&items);
        Ok(items)
    }

    /// Register a listener called with the new items after every applied
    /// change.
    pub(crate) fn on_change<F>(&self, listener: F) -> ChangeListener
    where
        F: Fn(&[S::Item]) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, Arc::new(listener)));

        let listeners = Arc::downgrade(&self.listeners);
        ChangeListener::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.write().retain(|(registered, _)| *registered != id);
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn notify(&self, items: &[S::Item]) {
        let snapshot: Vec<Listener<S::Item>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(items))).is_err() {
                tracing::error!("Collection change listener panicked");
            }
        }
    }

    /// Release the tracking key. Changes for it are ignored from now on;
    /// a fetch already sent to the native side still completes.
    pub(crate) async fn stop_tracking(&self) -> Result<TrackingStatus> {
        let key = self.state.lock().tracking_key.take();
        let Some(key) = key else {
            return Ok(TrackingStatus::was_not_tracked());
        };

        self.subscription.lock().take();
        self.ctx.release_key(&key);

        tracing::debug!(tracking_key = %key, "Stopping change tracking");
        native::bounded(
            self.ctx.config.native_timeout,
            self.ctx.native.stop_tracking(&key),
        )
        .await
    }
}

impl<S: ListSource> KeyOwner for TrackedList<S> {
    fn forget_key(&self, key: &TrackingKey) {
        {
            let mut state = self.state.lock();
            if state.tracking_key.as_ref() != Some(key) {
                return;
            }
            state.tracking_key = None;
        }
        self.subscription.lock().take();
        tracing::debug!(tracking_key = %key, "Tracking key revoked");
    }
}

impl<S: ListSource> Drop for TrackedList<S> {
    fn drop(&mut self) {
        let Some(key) = self.state.get_mut().tracking_key.take() else {
            return;
        };
        tracing::debug!(tracking_key = %key, "Tracked collection dropped");
        self.ctx.release_key(&key);
        self.ctx.stop_tracking_detached(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBridge;
    use crate::BridgeConfig;

    /// Serves records from a fixed native list.
    struct FixedSource(Vec<RawRecord>);

    impl ListSource for FixedSource {
        type Item = String;
        type Params = ();

        fn fetch_indices(
            &self,
            _params: &(),
            _key: &TrackingKey,
            indices: Vec<usize>,
        ) -> BoxFuture<'static, Result<Vec<RawRecord>>> {
            let records = indices.iter().map(|&i| self.0[i].clone()).collect();
            future::ready(Ok(records)).boxed()
        }

        fn materialize(&self, _params: &(), raw: RawRecord) -> photokit_engine::Result<String> {
            Ok(raw.local_identifier)
        }
    }

    fn context() -> Arc<Context> {
        Context::new(Arc::new(MemoryBridge::new()), BridgeConfig::default()).unwrap()
    }

    fn list(native: &[&str], items: &[&str]) -> Arc<TrackedList<FixedSource>> {
        list_in(context(), native, items)
    }

    fn list_in(ctx: Arc<Context>, native: &[&str], items: &[&str]) -> Arc<TrackedList<FixedSource>> {
        let records = native.iter().map(|id| RawRecord::asset(*id, "image")).collect();
        TrackedList::new(
            ctx,
            FixedSource(records),
            (),
            SortOrder::Normal,
            items.iter().map(|s| s.to_string()).collect(),
            Some(TrackingKey::new("k")),
        )
    }

    #[tokio::test]
    async fn applies_change_and_notifies() {
        let list = list(&["a", "b", "x"], &["a", "b"]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _listener = list.on_change(move |items| sink.lock().push(items.to_vec()));

        let change = ChangeDescriptor::new("k", 3).with_inserted([2]);
        let items = list.submit(change).await.unwrap();

        assert_eq!(*items, ["a", "b", "x"]);
        assert_eq!(*list.items(), ["a", "b", "x"]);
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn foreign_key_is_stale() {
        let list = list(&["a"], &["a"]);
        let change = ChangeDescriptor::new("other", 0).with_removed([0]);
        let err = list.submit(change).await.unwrap_err();
        assert!(matches!(err, Error::StaleKey(_)));
        assert_eq!(*list.items(), ["a"]);
    }

    #[tokio::test]
    async fn reset_supersedes_queued_changes() {
        let list = list(&["a", "b"], &["a"]);
        let change = ChangeDescriptor::new("k", 2).with_inserted([1]);
        let pending = list.submit(change);

        list.reset(vec!["z".to_string()], (), SortOrder::Normal);

        // The queued job starts against the new baseline.
        let items = pending.await.unwrap();
        assert_eq!(*items, ["z", "b"]);
    }

    #[tokio::test]
    async fn dropped_listener_is_unregistered() {
        let list = list(&[], &[]);
        let listener = list.on_change(|_| {});
        assert_eq!(list.listener_count(), 1);
        listener.unsubscribe();
        assert_eq!(list.listener_count(), 0);
    }

    #[tokio::test]
    async fn stop_tracking_without_key() {
        let list = TrackedList::new(
            context(),
            FixedSource(Vec::new()),
            (),
            SortOrder::Normal,
            Vec::new(),
            None,
        );
        let status = list.stop_tracking().await.unwrap();
        assert_eq!(status, TrackingStatus::was_not_tracked());
    }

    #[tokio::test]
    async fn stopped_list_opens_no_lane() {
        let ctx = context();
        let list = list_in(Arc::clone(&ctx), &["a", "b"], &["a"]);
        list.submit(ChangeDescriptor::new("k", 2).with_inserted([1]))
            .await
            .unwrap();
        assert_eq!(ctx.flight.lane_count(), 1);

        list.stop_tracking().await.unwrap();
        assert_eq!(ctx.flight.lane_count(), 0);

        let err = list
            .submit(ChangeDescriptor::new("k", 1).with_removed([0]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleKey(_)));
        assert_eq!(ctx.flight.lane_count(), 0);
        assert_eq!(ctx.owner_count(), 0);
    }

    #[tokio::test]
    async fn dropping_list_releases_key() {
        let ctx = context();
        let list = list_in(Arc::clone(&ctx), &["a", "b"], &["a"]);
        list.submit(ChangeDescriptor::new("k", 2).with_inserted([1]))
            .await
            .unwrap();
        assert_eq!(ctx.owner_count(), 1);

        drop(list);
        assert_eq!(ctx.flight.lane_count(), 0);
        assert_eq!(ctx.owner_count(), 0);
    }

    #[tokio::test]
    async fn revoked_key_ignores_bus_changes() {
        let ctx = context();
        let list = list_in(Arc::clone(&ctx), &["a"], &["a"]);
        let key = TrackingKey::new("k");

        list.forget_key(&TrackingKey::new("other"));
        assert_eq!(list.tracking_key(), Some(key.clone()));

        list.forget_key(&key);
        assert!(list.tracking_key().is_none());
        let change = ChangeDescriptor::new("k", 0).with_removed([0]);
        assert_eq!(ctx.bus.publish(&BusEvent::ObjectChange(change)), 0);
        assert_eq!(*list.items(), ["a"]);
    }
}
