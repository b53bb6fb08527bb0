//! The in-memory backing tables.
//!
//! Two tables per element kind - `current` (at most one row per id) and
//! `history` (one row per edition) - plus the association tables for way
//! nodes and relation members, and the changeset/user tables (spec §3,
//! §6 "Persisted state"). Access always goes through [`super::Store`],
//! which pairs this data with the row-lock discipline in
//! [`super::locks`].

use std::collections::BTreeMap;

use crate::model::{Changeset, Kind, Node, OsmId, Relation, Way};

/// One immutable historic revision, keyed by `(id, version)`.
///
/// `redaction` mirrors the nullable foreign key spec §6 puts on the
/// history table only, never on `current`: a moderator-assigned reason
/// for hiding a historic edition from ordinary API consumers. The upload
/// pipeline never sets it - redaction is a moderation endpoint out of
/// scope here - so every entry this crate writes carries `None`; the
/// field exists so the persisted-state shape matches spec §6 in full.
#[derive(Debug, Clone)]
pub struct HistoryEntry<T> {
    pub version: u32,
    pub row: T,
    pub redaction: Option<OsmId>,
}

/// All persisted state the pipeline reads and writes.
#[derive(Default, Clone)]
pub struct Tables {
    pub current_nodes: BTreeMap<OsmId, Node>,
    pub node_history: BTreeMap<OsmId, Vec<HistoryEntry<Node>>>,

    pub current_ways: BTreeMap<OsmId, Way>,
    pub way_history: BTreeMap<OsmId, Vec<HistoryEntry<Way>>>,

    pub current_relations: BTreeMap<OsmId, Relation>,
    pub relation_history: BTreeMap<OsmId, Vec<HistoryEntry<Relation>>>,

    pub changesets: BTreeMap<OsmId, Changeset>,
    pub changeset_subscribers: BTreeMap<OsmId, Vec<OsmId>>,

    pub user_changeset_counts: BTreeMap<OsmId, u64>,

    next_node_id: OsmId,
    next_way_id: OsmId,
    next_relation_id: OsmId,
    next_changeset_id: OsmId,
}

impl Tables {
    pub fn new() -> Self {
        Self {
            next_node_id: 1,
            next_way_id: 1,
            next_relation_id: 1,
            next_changeset_id: 1,
            ..Default::default()
        }
    }

    pub fn allocate_id(&mut self, kind: Kind) -> OsmId {
        let counter = match kind {
            Kind::Node => &mut self.next_node_id,
            Kind::Way => &mut self.next_way_id,
            Kind::Relation => &mut self.next_relation_id,
        };
        let id = *counter;
        *counter += 1;
        id
    }

    pub fn allocate_changeset_id(&mut self) -> OsmId {
        let id = self.next_changeset_id;
        self.next_changeset_id += 1;
        id
    }

    /// Whether a node is currently visible (exists and not a tombstone).
    pub fn node_visible(&self, id: OsmId) -> bool {
        self.current_nodes.get(&id).is_some_and(|n| n.visible)
    }

    /// Whether a way is currently visible.
    pub fn way_visible(&self, id: OsmId) -> bool {
        self.current_ways.get(&id).is_some_and(|w| w.visible)
    }

    /// Whether a relation is currently visible.
    pub fn relation_visible(&self, id: OsmId) -> bool {
        self.current_relations
            .get(&id)
            .is_some_and(|r| r.visible)
    }

    /// Ways whose current node list still references `node_id`.
    pub fn ways_referencing_node(&self, node_id: OsmId) -> Vec<OsmId> {
        self.current_ways
            .iter()
            .filter(|(_, w)| w.visible && w.nodes.iter().any(|n| n.node_id == node_id))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Relations whose current member list references `(kind, id)`.
    pub fn relations_referencing(
        &self,
        kind: Kind,
        id: OsmId,
    ) -> Vec<OsmId> {
        self.current_relations
            .iter()
            .filter(|(_, r)| {
                r.visible
                    && r.members
                        .iter()
                        .any(|m| Kind::from(m.member_type) == kind && m.member_id == id)
            })
            .map(|(rid, _)| *rid)
            .collect()
    }
}
