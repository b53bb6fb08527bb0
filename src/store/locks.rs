//! Row-lock bookkeeping.
//!
//! The store keeps one lazily-created `Mutex`/`RwLock` per logical row,
//! independent of the row's actual data (which lives in [`super::tables`]).
//! This mirrors a relational database's row-level locking: acquiring a
//! lock and reading/writing the row's data are distinct steps, and a lock
//! can be held for an entire transaction while individual reads/writes to
//! the backing table are short critical sections.
//!
//! Locking discipline (spec §5):
//! - The changeset lock is acquired non-blocking; contention is reported
//!   as [`crate::error::ApiError::Conflict`] rather than waited out.
//! - Current-row exclusive locks (for modify/delete) block.
//! - Shared locks on rows referenced by a new way/relation block, and are
//!   always acquired in ascending id order within a kind.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, ArcRwLockReadGuard, Mutex, RawMutex, RawRwLock, RwLock};

use crate::model::{Kind, OsmId};

/// An acquired exclusive lock on one changeset row.
pub type ChangesetGuard = ArcMutexGuard<RawMutex, ()>;
/// An acquired exclusive lock on one current-element row.
pub type ExclusiveRowGuard = ArcMutexGuard<RawMutex, ()>;
/// An acquired shared lock on one current-element row.
pub type SharedRowGuard = ArcRwLockReadGuard<RawRwLock, ()>;

#[derive(Default)]
pub struct LockTable {
    changesets: Mutex<HashMap<OsmId, Arc<Mutex<()>>>>,
    elements: Mutex<HashMap<(Kind, OsmId), Arc<RwLock<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn changeset_mutex(&self, id: OsmId) -> Arc<Mutex<()>> {
        self.changesets
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn element_lock(&self, kind: Kind, id: OsmId) -> Arc<RwLock<()>> {
        self.elements
            .lock()
            .entry((kind, id))
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Attempts to acquire the changeset's exclusive lock without
    /// blocking. Returns `None` if another in-flight transaction already
    /// holds it.
    pub fn try_lock_changeset(&self, id: OsmId) -> Option<ChangesetGuard> {
        self.changeset_mutex(id).try_lock_arc()
    }

    /// Acquires exclusive locks on every id in `ids`, blocking as needed,
    /// always in ascending id order to avoid lock-order deadlocks across
    /// concurrent pipelines (spec §5).
    pub fn lock_exclusive(&self, kind: Kind, ids: &[OsmId]) -> Vec<ExclusiveRowGuard> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted
            .into_iter()
            .map(|id| self.element_lock(kind, id).lock_arc())
            .collect()
    }

    /// Acquires shared locks on every id in `ids`, blocking as needed, in
    /// ascending id order. Used before writing a way or relation that
    /// references these rows, so a concurrent delete of a referenced
    /// element cannot race with the reference being written.
    pub fn lock_shared(&self, kind: Kind, ids: &[OsmId]) -> Vec<SharedRowGuard> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted
            .into_iter()
            .map(|id| self.element_lock(kind, id).read_arc())
            .collect()
    }
}
