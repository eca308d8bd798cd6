//! Async reconciliation driver.
//!
//! Wraps the engine's two-phase patch with the single native round trip a
//! change may need: plan, fetch once, apply.

use std::future::Future;

use photokit_engine::{ChangeDescriptor, PatchPlan, RawRecord, SortOrder};

use crate::Result;

/// Apply `change` to `previous`, fetching fresh records through `fetch`.
///
/// `fetch` receives the native indices to load and is awaited at most once;
/// it is skipped entirely when the change needs no fresh records. Any error
/// leaves `previous` untouched.
pub async fn reconcile<T, Fetch, Fut, M>(
    previous: &[T],
    change: &ChangeDescriptor,
    sort_order: SortOrder,
    fetch: Fetch,
    materialize: M,
) -> Result<Vec<T>>
where
    T: Clone,
    Fetch: FnOnce(Vec<usize>) -> Fut,
    Fut: Future<Output = Result<Vec<RawRecord>>>,
    M: FnMut(RawRecord) -> photokit_engine::Result<T>,
{
    let plan = PatchPlan::new(previous.len(), change, sort_order)?;

    let fetched = if plan.needs_fetch() {
        let indices = plan.fetch_indices();
        tracing::trace!(
            tracking_key = %change.tracking_key,
            count = indices.len(),
            "Fetching records for change"
        );
        fetch(indices).await?
    } else {
        Vec::new()
    };

    Ok(plan.apply(previous, fetched, materialize)?)
}
