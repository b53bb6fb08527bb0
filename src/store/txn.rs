//! Transaction-scoped undo log.
//!
//! [`Store::snapshot`]/[`Store::restore`] used to bracket a whole upload by
//! cloning and later replacing the entire [`super::Tables`] struct. That
//! clobbers any row a *different*, concurrently-committing transaction
//! wrote in the meantime, since `restore` overwrites the shared state
//! wholesale rather than just the rows this transaction touched (spec §5,
//! P6, P8). [`Transaction`] instead records, on each row's first write
//! within it, the row's prior value (or its absence, for a fresh insert)
//! and its prior history length; [`Transaction::rollback`] only reverts
//! those specific rows. This is safe under concurrency because every row a
//! transaction writes is already held under one of its own row-lock guards
//! for the transaction's whole duration (`crate::store::locks`), so no
//! other transaction can be mutating the same row while this one rolls
//! back.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::model::{Changeset, Node, OsmId, Relation, Way};

use super::{Store, Tables};

struct RowUndo<T> {
    prev: Option<T>,
    prev_history_len: usize,
}

/// Accumulates undo state for one upload. Built by [`Store::begin`],
/// threaded into every updater in place of a bare `&Store`, and either
/// [`Transaction::commit`]ted or [`Transaction::rollback`]ed once by the
/// pipeline driver.
pub struct Transaction<'s> {
    store: &'s Store,
    nodes: Mutex<BTreeMap<OsmId, RowUndo<Node>>>,
    ways: Mutex<BTreeMap<OsmId, RowUndo<Way>>>,
    relations: Mutex<BTreeMap<OsmId, RowUndo<Relation>>>,
    changesets: Mutex<BTreeMap<OsmId, Changeset>>,
}

impl<'s> Transaction<'s> {
    pub(super) fn new(store: &'s Store) -> Self {
        Self {
            store,
            nodes: Mutex::new(BTreeMap::new()),
            ways: Mutex::new(BTreeMap::new()),
            relations: Mutex::new(BTreeMap::new()),
            changesets: Mutex::new(BTreeMap::new()),
        }
    }

    // -- reads and locks pass straight through; only writes are journaled --

    pub fn get_node(&self, id: OsmId) -> Option<Node> {
        self.store.get_node(id)
    }

    pub fn get_way(&self, id: OsmId) -> Option<Way> {
        self.store.get_way(id)
    }

    pub fn get_relation(&self, id: OsmId) -> Option<Relation> {
        self.store.get_relation(id)
    }

    pub fn get_changeset(&self, id: OsmId) -> Option<Changeset> {
        self.store.get_changeset(id)
    }

    pub fn is_visible(&self, kind: crate::model::Kind, id: OsmId) -> bool {
        self.store.is_visible(kind, id)
    }

    pub fn require_existing(&self, kind: crate::model::Kind, ids: &[OsmId]) -> crate::error::Result<()> {
        self.store.require_existing(kind, ids)
    }

    pub fn ways_referencing_node(&self, node_id: OsmId) -> Vec<OsmId> {
        self.store.ways_referencing_node(node_id)
    }

    pub fn relations_referencing(&self, kind: crate::model::Kind, id: OsmId) -> Vec<OsmId> {
        self.store.relations_referencing(kind, id)
    }

    pub fn try_lock_changeset(&self, id: OsmId) -> Option<super::ChangesetGuard> {
        self.store.try_lock_changeset(id)
    }

    pub fn lock_exclusive(&self, kind: crate::model::Kind, ids: &[OsmId]) -> Vec<super::ExclusiveRowGuard> {
        self.store.lock_exclusive(kind, ids)
    }

    pub fn lock_shared(&self, kind: crate::model::Kind, ids: &[OsmId]) -> Vec<super::SharedRowGuard> {
        self.store.lock_shared(kind, ids)
    }

    /// Allocates an id. Not journaled: id counters behave like a database
    /// sequence, which a rolled-back transaction does not rewind either.
    pub fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        self.store.with_tables(f)
    }

    // -- journaled writes --------------------------------------------------

    pub fn insert_node(&self, node: Node) {
        self.remember_node(node.id);
        self.store.insert_node(node);
    }

    pub fn put_node(&self, node: Node) {
        self.remember_node(node.id);
        self.store.put_node(node);
    }

    pub fn insert_way(&self, way: Way) {
        self.remember_way(way.id);
        self.store.insert_way(way);
    }

    pub fn put_way(&self, way: Way) {
        self.remember_way(way.id);
        self.store.put_way(way);
    }

    pub fn insert_relation(&self, relation: Relation) {
        self.remember_relation(relation.id);
        self.store.insert_relation(relation);
    }

    pub fn put_relation(&self, relation: Relation) {
        self.remember_relation(relation.id);
        self.store.put_relation(relation);
    }

    pub fn put_changeset(&self, cs: Changeset) {
        let id = cs.id;
        self.changesets
            .lock()
            .entry(id)
            .or_insert_with(|| self.store.get_changeset(id).expect("changeset row exists before being written"));
        self.store.put_changeset(cs);
    }

    fn remember_node(&self, id: OsmId) {
        self.nodes.lock().entry(id).or_insert_with(|| RowUndo {
            prev: self.store.get_node(id),
            prev_history_len: self.store.with_tables(|t| t.node_history.get(&id).map_or(0, Vec::len)),
        });
    }

    fn remember_way(&self, id: OsmId) {
        self.ways.lock().entry(id).or_insert_with(|| RowUndo {
            prev: self.store.get_way(id),
            prev_history_len: self.store.with_tables(|t| t.way_history.get(&id).map_or(0, Vec::len)),
        });
    }

    fn remember_relation(&self, id: OsmId) {
        self.relations.lock().entry(id).or_insert_with(|| RowUndo {
            prev: self.store.get_relation(id),
            prev_history_len: self.store.with_tables(|t| t.relation_history.get(&id).map_or(0, Vec::len)),
        });
    }

    /// The transaction succeeded; its writes (already applied in place)
    /// stand. Exists only to mark the commit point symmetrically with
    /// [`Transaction::rollback`].
    pub fn commit(self) {}

    /// Reverts every row this transaction wrote back to its pre-
    /// transaction state, and nothing else. Must run while this
    /// transaction still holds the row-lock guards covering those rows.
    pub fn rollback(self) {
        self.store.with_tables(|t| {
            for (id, undo) in self.nodes.into_inner() {
                restore_row(&mut t.current_nodes, &mut t.node_history, id, undo);
            }
            for (id, undo) in self.ways.into_inner() {
                restore_row(&mut t.current_ways, &mut t.way_history, id, undo);
            }
            for (id, undo) in self.relations.into_inner() {
                restore_row(&mut t.current_relations, &mut t.relation_history, id, undo);
            }
            for (id, cs) in self.changesets.into_inner() {
                t.changesets.insert(id, cs);
            }
        });
    }
}

fn restore_row<T>(
    current: &mut BTreeMap<OsmId, T>,
    history: &mut BTreeMap<OsmId, Vec<super::HistoryEntry<T>>>,
    id: OsmId,
    undo: RowUndo<T>,
) {
    match undo.prev {
        Some(row) => {
            current.insert(id, row);
        }
        None => {
            current.remove(&id);
        }
    }
    if let Some(h) = history.get_mut(&id) {
        h.truncate(undo.prev_history_len);
        if h.is_empty() {
            history.remove(&id);
        }
    }
}
