//! The transactional relational store the pipeline is built on.
//!
//! `Store` is the single source of truth for changesets, nodes, ways, and
//! relations, both current and historic. It pairs [`tables::Tables`] (the
//! actual row data) with [`locks::LockTable`] (the row-lock discipline
//! spec §5 describes), so that acquiring a lock and reading/writing data
//! are the separate steps they'd be against a real database.
//!
//! Every upload runs inside one logical transaction: the pipeline driver
//! (`crate::pipeline`) opens a [`Transaction`] with [`Store::begin`],
//! threads it into every updater in place of a bare `&Store`, and holds
//! whatever row-lock guards it has acquired for the duration of the
//! upload. On any error the driver calls [`Transaction::rollback`], which
//! undoes only the specific rows that transaction wrote, so a failed
//! upload leaves the store's other rows - including ones a concurrently
//! committing transaction just wrote - untouched (spec §5, P6, P8).

mod locks;
mod tables;
mod txn;

pub use locks::{ChangesetGuard, ExclusiveRowGuard, SharedRowGuard};
pub use tables::{HistoryEntry, Tables};
pub use txn::Transaction;

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::model::{Changeset, Kind, Node, OsmId, Relation, Tags, Way};

/// The transactional store.
pub struct Store {
    tables: Mutex<Tables>,
    locks: locks::LockTable,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::new()),
            locks: locks::LockTable::new(),
        }
    }

    /// Runs `f` with exclusive access to the backing tables. Kept short:
    /// callers should not do anything but read/write rows inside the
    /// closure.
    pub fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut guard = self.tables.lock();
        f(&mut guard)
    }

    /// Opens a transaction that journals every row it writes, so it can be
    /// rolled back in isolation from whatever else is writing to the store
    /// concurrently (spec §5, P6, P8).
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    // -- locking -----------------------------------------------------

    /// Non-blocking exclusive lock on one changeset row (spec §5).
    pub fn try_lock_changeset(&self, id: OsmId) -> Option<ChangesetGuard> {
        self.locks.try_lock_changeset(id)
    }

    /// Blocking exclusive locks on current element rows, ascending id
    /// order.
    pub fn lock_exclusive(&self, kind: Kind, ids: &[OsmId]) -> Vec<ExclusiveRowGuard> {
        self.locks.lock_exclusive(kind, ids)
    }

    /// Blocking shared locks on rows referenced by a new way/relation,
    /// ascending id order.
    pub fn lock_shared(&self, kind: Kind, ids: &[OsmId]) -> Vec<SharedRowGuard> {
        self.locks.lock_shared(kind, ids)
    }

    // -- changesets ----------------------------------------------------

    /// Creates a new changeset owned by `user_id`, seeded with `tags`.
    /// Mirrors `ApiDB_Changeset_Updater::api_create_changeset`: insert,
    /// bump the user's changeset count, replace tags, and subscribe the
    /// owner.
    pub fn create_changeset(
        &self,
        user_id: OsmId,
        tags: Tags,
        now: OffsetDateTime,
        config: &Config,
    ) -> OsmId {
        self.with_tables(|t| {
            let id = t.allocate_changeset_id();
            let cs = Changeset {
                id,
                user_id,
                created_at: now,
                closed_at: now + config.changeset_timeout_idle,
                bbox: Default::default(),
                num_changes: 0,
                tags,
                comments: Vec::new(),
            };
            t.changesets.insert(id, cs);
            *t.user_changeset_counts.entry(user_id).or_insert(0) += 1;
            t.changeset_subscribers.entry(id).or_default().push(user_id);
            id
        })
    }

    /// Fetches a changeset by id.
    pub fn get_changeset(&self, id: OsmId) -> Option<Changeset> {
        self.with_tables(|t| t.changesets.get(&id).cloned())
    }

    /// Replaces a changeset's mutable fields after the caller has
    /// computed the new values under lock.
    pub fn put_changeset(&self, cs: Changeset) {
        self.with_tables(|t| {
            t.changesets.insert(cs.id, cs);
        });
    }

    // -- nodes -----------------------------------------------------------

    /// Inserts a brand-new node into both current and history stores.
    pub fn insert_node(&self, node: Node) {
        self.with_tables(|t| {
            t.node_history.entry(node.id).or_default().push(HistoryEntry {
                version: node.version,
                row: node.clone(),
                redaction: None,
            });
            t.current_nodes.insert(node.id, node);
        });
    }

    /// Fetches a node's current row.
    pub fn get_node(&self, id: OsmId) -> Option<Node> {
        self.with_tables(|t| t.current_nodes.get(&id).cloned())
    }

    /// Replaces a node's current row and appends the new state to
    /// history.
    pub fn put_node(&self, node: Node) {
        self.with_tables(|t| {
            t.node_history.entry(node.id).or_default().push(HistoryEntry {
                version: node.version,
                row: node.clone(),
                redaction: None,
            });
            t.current_nodes.insert(node.id, node);
        });
    }

    // -- ways --------------------------------------------------------

    /// Inserts a brand-new way into both current and history stores.
    pub fn insert_way(&self, way: Way) {
        self.with_tables(|t| {
            t.way_history.entry(way.id).or_default().push(HistoryEntry {
                version: way.version,
                row: way.clone(),
                redaction: None,
            });
            t.current_ways.insert(way.id, way);
        });
    }

    /// Fetches a way's current row.
    pub fn get_way(&self, id: OsmId) -> Option<Way> {
        self.with_tables(|t| t.current_ways.get(&id).cloned())
    }

    /// Replaces a way's current row and appends the new state to
    /// history.
    pub fn put_way(&self, way: Way) {
        self.with_tables(|t| {
            t.way_history.entry(way.id).or_default().push(HistoryEntry {
                version: way.version,
                row: way.clone(),
                redaction: None,
            });
            t.current_ways.insert(way.id, way);
        });
    }

    /// Ids of ways whose current node list still references `node_id`.
    pub fn ways_referencing_node(&self, node_id: OsmId) -> Vec<OsmId> {
        self.with_tables(|t| t.ways_referencing_node(node_id))
    }

    // -- relations -------------------------------------------------------

    /// Inserts a brand-new relation into both current and history
    /// stores.
    pub fn insert_relation(&self, relation: Relation) {
        self.with_tables(|t| {
            t.relation_history
                .entry(relation.id)
                .or_default()
                .push(HistoryEntry {
                    version: relation.version,
                    row: relation.clone(),
                    redaction: None,
                });
            t.current_relations.insert(relation.id, relation);
        });
    }

    /// Fetches a relation's current row.
    pub fn get_relation(&self, id: OsmId) -> Option<Relation> {
        self.with_tables(|t| t.current_relations.get(&id).cloned())
    }

    /// Replaces a relation's current row and appends the new state to
    /// history.
    pub fn put_relation(&self, relation: Relation) {
        self.with_tables(|t| {
            t.relation_history
                .entry(relation.id)
                .or_default()
                .push(HistoryEntry {
                    version: relation.version,
                    row: relation.clone(),
                    redaction: None,
                });
            t.current_relations.insert(relation.id, relation);
        });
    }

    /// Ids of relations whose current member list references
    /// `(kind, id)`.
    pub fn relations_referencing(&self, kind: Kind, id: OsmId) -> Vec<OsmId> {
        self.with_tables(|t| t.relations_referencing(kind, id))
    }

    /// Visibility check used by referential-integrity guards.
    pub fn is_visible(&self, kind: Kind, id: OsmId) -> bool {
        self.with_tables(|t| match kind {
            Kind::Node => t.node_visible(id),
            Kind::Way => t.way_visible(id),
            Kind::Relation => t.relation_visible(id),
        })
    }

    /// Fails with [`ApiError::NotFound`] listing every id in `ids` that
    /// has no current row at all (spec §4.4 "Lock targets... missing ids
    /// fail with NotFound").
    pub fn require_existing(&self, kind: Kind, ids: &[OsmId]) -> Result<()> {
        let missing: Vec<OsmId> = self.with_tables(|t| {
            ids.iter()
                .copied()
                .filter(|id| match kind {
                    Kind::Node => !t.current_nodes.contains_key(id),
                    Kind::Way => !t.current_ways.contains_key(id),
                    Kind::Relation => !t.current_relations.contains_key(id),
                })
                .collect()
        });
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!(
                "The following {kind} ids are not known on the database: {missing:?}"
            )))
        }
    }
}
