//! Index-set patch algorithm.
//!
//! Applies a [`ChangeDescriptor`] to a previously materialized sequence. The
//! work is split in two pure phases so the caller can perform the single
//! native round trip in between:
//!
//! 1. [`PatchPlan::new`] validates the change against the previous length,
//!    translates native indices to local indices and decides which slots of
//!    the new sequence need fresh records.
//! 2. [`PatchPlan::apply`] takes the records returned for
//!    [`PatchPlan::fetch_indices`] and assembles the new sequence, reusing
//!    every surviving entry.
//!
//! # Index spaces
//!
//! Removed indices refer to the sequence before the change, inserted and
//! updated indices to the sequence after it. With [`SortOrder::Reversed`] the
//! local sequence is the native one mirrored, so a native index `i` maps to
//! `len - 1 - i` of its own space.

use crate::error::IndexSetKind;
use crate::{ChangeDescriptor, Error, IndexSet, RawRecord, Result, SortOrder};
use std::collections::BTreeMap;

/// How a change will be applied.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchPlan {
    /// Nothing changed; the previous sequence is kept as is.
    Unchanged,
    /// The native side sent the complete new contents.
    Replace(Vec<RawRecord>),
    /// Index-based update.
    Incremental(IndexPatch),
}

/// Validated, locally-mapped index changes.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPatch {
    old_count: usize,
    new_count: usize,
    /// Removed slots of the previous sequence (local space)
    removed: IndexSet,
    /// Inserted slots of the new sequence (local space)
    inserted: IndexSet,
    /// Slots of the new sequence needing fresh records, with their native index
    fresh: BTreeMap<usize, usize>,
}

impl PatchPlan {
    /// Plan the application of `change` to a sequence of `old_count` entries.
    pub fn new(old_count: usize, change: &ChangeDescriptor, sort_order: SortOrder) -> Result<Self> {
        if let Some(records) = &change.full_replacement {
            return Ok(PatchPlan::Replace(records.clone()));
        }

        let new_count = change.new_count;
        if !change.has_index_changes() && new_count == old_count {
            return Ok(PatchPlan::Unchanged);
        }

        check_bounds(&change.removed_indices, IndexSetKind::Removed, old_count)?;
        check_bounds(&change.inserted_indices, IndexSetKind::Inserted, new_count)?;
        check_bounds(&change.updated_indices, IndexSetKind::Updated, new_count)?;

        let survivors = old_count - change.removed_indices.len();
        let assembled = survivors + change.inserted_indices.len();
        if assembled != new_count {
            return Err(Error::InconsistentChange {
                expected: new_count,
                actual: assembled,
            });
        }

        let removed = change
            .removed_indices
            .iter()
            .map(|&i| localize(sort_order, IndexSetKind::Removed, i, old_count))
            .collect::<Result<IndexSet>>()?;

        let mut inserted = IndexSet::new();
        let mut fresh = BTreeMap::new();
        for &native in &change.inserted_indices {
            let local = localize(sort_order, IndexSetKind::Inserted, native, new_count)?;
            inserted.insert(local);
            fresh.insert(local, native);
        }
        for &native in &change.updated_indices {
            let local = localize(sort_order, IndexSetKind::Updated, native, new_count)?;
            fresh.insert(local, native);
        }

        Ok(PatchPlan::Incremental(IndexPatch {
            old_count,
            new_count,
            removed,
            inserted,
            fresh,
        }))
    }

    /// Native indices that must be fetched, in the order the records are
    /// expected back. Empty when no fetch is needed.
    pub fn fetch_indices(&self) -> Vec<usize> {
        match self {
            PatchPlan::Incremental(patch) => patch.fresh.values().copied().collect(),
            PatchPlan::Unchanged | PatchPlan::Replace(_) => Vec::new(),
        }
    }

    /// Whether applying the plan requires a native fetch.
    pub fn needs_fetch(&self) -> bool {
        matches!(self, PatchPlan::Incremental(patch) if !patch.fresh.is_empty())
    }

    /// Assemble the new sequence.
    ///
    /// `fetched` must hold one record per index of [`fetch_indices`], in the
    /// same order. Every fetched or replacement record goes through
    /// `materialize`; a single failure fails the whole patch.
    ///
    /// [`fetch_indices`]: PatchPlan::fetch_indices
    pub fn apply<T, F>(self, previous: &[T], fetched: Vec<RawRecord>, materialize: F) -> Result<Vec<T>>
    where
        T: Clone,
        F: FnMut(RawRecord) -> Result<T>,
    {
        match self {
            PatchPlan::Unchanged => Ok(previous.to_vec()),
            PatchPlan::Replace(records) => records.into_iter().map(materialize).collect(),
            PatchPlan::Incremental(patch) => patch.apply(previous, fetched, materialize),
        }
    }
}

impl IndexPatch {
    pub fn old_count(&self) -> usize {
        self.old_count
    }

    pub fn new_count(&self) -> usize {
        self.new_count
    }

    fn apply<T, F>(self, previous: &[T], fetched: Vec<RawRecord>, mut materialize: F) -> Result<Vec<T>>
    where
        T: Clone,
        F: FnMut(RawRecord) -> Result<T>,
    {
        if previous.len() != self.old_count {
            return Err(Error::InconsistentChange {
                expected: self.old_count,
                actual: previous.len(),
            });
        }
        if fetched.len() != self.fresh.len() {
            return Err(Error::FetchLengthMismatch {
                requested: self.fresh.len(),
                actual: fetched.len(),
            });
        }

        let mut survivors = previous
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.removed.contains(i))
            .map(|(_, entry)| entry);
        let mut fetched = fetched.into_iter();

        let mut result = Vec::with_capacity(self.new_count);
        for slot in 0..self.new_count {
            if !self.inserted.contains(&slot) {
                // Updated slots still consume the survivor they replace.
                let survivor = survivors.next().ok_or(Error::InconsistentChange {
                    expected: self.new_count,
                    actual: result.len(),
                })?;
                if !self.fresh.contains_key(&slot) {
                    result.push(survivor.clone());
                    continue;
                }
            }
            let record = fetched.next().ok_or(Error::FetchLengthMismatch {
                requested: self.fresh.len(),
                actual: 0,
            })?;
            result.push(materialize(record)?);
        }

        let leftover = survivors.count();
        if leftover != 0 || result.len() != self.new_count {
            return Err(Error::InconsistentChange {
                expected: self.new_count,
                actual: result.len() + leftover,
            });
        }

        Ok(result)
    }
}

fn check_bounds(indices: &IndexSet, set: IndexSetKind, len: usize) -> Result<()> {
    match indices.iter().next_back() {
        Some(&index) if index >= len => Err(Error::IndexOutOfBounds { set, index, len }),
        _ => Ok(()),
    }
}

fn localize(order: SortOrder, set: IndexSetKind, index: usize, len: usize) -> Result<usize> {
    order
        .map_index(index, len)
        .ok_or(Error::IndexOutOfBounds { set, index, len })
}

/// Apply a change synchronously, fetching fresh records through `fetch`.
///
/// `fetch` is called at most once, and not at all when no slot needs fresh
/// data.
pub fn reconcile<T, Fetch, M>(
    previous: &[T],
    change: &ChangeDescriptor,
    sort_order: SortOrder,
    fetch: Fetch,
    materialize: M,
) -> Result<Vec<T>>
where
    T: Clone,
    Fetch: FnOnce(&[usize]) -> Result<Vec<RawRecord>>,
    M: FnMut(RawRecord) -> Result<T>,
{
    let plan = PatchPlan::new(previous.len(), change, sort_order)?;
    let fetched = if plan.needs_fetch() {
        fetch(&plan.fetch_indices())?
    } else {
        Vec::new()
    };
    plan.apply(previous, fetched, materialize)
}
