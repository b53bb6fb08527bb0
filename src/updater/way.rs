//! Way create/modify/delete (spec §4.5).
//!
//! Structured like [`crate::updater::node::NodeUpdater`]: stage by index,
//! then apply each phase as one batch. Ways additionally take shared locks
//! on the nodes they reference, so a concurrent delete of a referenced node
//! can't race a way create/modify that's about to point at it.

use time::OffsetDateTime;

use crate::changeset::ChangesetUpdater;
use crate::config::Config;
use crate::diff::DiffResult;
use crate::error::{ApiError, Result};
use crate::model::{BBox, ElementRef, Kind, OsmId, PlaceholderId, Version, Way, WayNode, WayPayload};
use crate::placeholder::PlaceholderResolver;
use crate::store::Transaction;
#[cfg(test)]
use crate::store::Store;
use crate::updater::join_ids;

struct NewWay {
    index: usize,
    placeholder_id: PlaceholderId,
    payload: WayPayload,
}

struct ModifyWay {
    index: usize,
    id: ElementRef,
    version: Version,
    payload: WayPayload,
}

struct DeleteWay {
    index: usize,
    id: ElementRef,
    version: Version,
    if_unused: bool,
}

/// Stages and applies way operations for one upload.
pub struct WayUpdater<'s> {
    store: &'s Transaction<'s>,
    config: &'s Config,
    changeset: OsmId,
    creates: Vec<NewWay>,
    modifies: Vec<ModifyWay>,
    deletes: Vec<DeleteWay>,
}

impl<'s> WayUpdater<'s> {
    pub fn new(store: &'s Transaction<'s>, config: &'s Config, changeset: OsmId) -> Self {
        Self {
            store,
            config,
            changeset,
            creates: Vec::new(),
            modifies: Vec::new(),
            deletes: Vec::new(),
        }
    }

    pub fn add_create(&mut self, index: usize, placeholder_id: PlaceholderId, payload: WayPayload) {
        self.creates.push(NewWay {
            index,
            placeholder_id,
            payload,
        });
    }

    pub fn add_modify(&mut self, index: usize, id: ElementRef, version: Version, payload: WayPayload) {
        self.modifies.push(ModifyWay {
            index,
            id,
            version,
            payload,
        });
    }

    pub fn add_delete(&mut self, index: usize, id: ElementRef, version: Version, if_unused: bool) {
        self.deletes.push(DeleteWay {
            index,
            id,
            version,
            if_unused,
        });
    }

    pub fn has_work(&self) -> bool {
        !self.creates.is_empty() || !self.modifies.is_empty() || !self.deletes.is_empty()
    }

    /// Resolves `nodes` against already-created placeholders and the
    /// store, takes shared locks on the resolved ids (ascending order),
    /// and fails if any is unknown or already deleted (spec §4.5 "node
    /// references must exist and be visible").
    fn resolve_and_lock_nodes(
        &self,
        way_id: i64,
        resolver: &PlaceholderResolver,
        nodes: &[ElementRef],
    ) -> Result<(Vec<OsmId>, Vec<crate::store::SharedRowGuard>)> {
        let resolved: Vec<OsmId> = nodes
            .iter()
            .map(|n| resolver.resolve(Kind::Node, *n))
            .collect::<Result<_>>()?;
        // `is_visible` is false for both a missing id and a tombstoned one,
        // which is exactly the single PreconditionFailed spec §4.5 wants
        // here - unlike a modify/delete target, a referenced node that
        // simply doesn't exist is not a NotFound.
        let guards = self.store.lock_shared(Kind::Node, &resolved);
        let missing_or_invisible: Vec<OsmId> = resolved
            .iter()
            .copied()
            .filter(|id| !self.store.is_visible(Kind::Node, *id))
            .collect();
        if !missing_or_invisible.is_empty() {
            return Err(ApiError::PreconditionFailed(format!(
                "Way {way_id} requires the nodes with id in {{{}}}, which either do not exist, or are not visible.",
                join_ids(&missing_or_invisible)
            )));
        }
        Ok((resolved, guards))
    }

    /// Envelope of the current positions of `node_ids`, as seen at the
    /// moment a way referencing them is committed (spec §4.5: way writes
    /// don't move nodes, but still expand the changeset bbox by the
    /// envelope of the nodes they currently reference).
    fn node_bbox(&self, node_ids: &[OsmId]) -> BBox {
        let mut bbox = BBox::empty();
        for id in node_ids {
            if let Some(node) = self.store.get_node(*id) {
                bbox.expand(BBox::point(node.lat, node.lon));
            }
        }
        bbox
    }

    pub fn process_creates(
        &self,
        resolver: &mut PlaceholderResolver,
        cs: &mut ChangesetUpdater,
        now: OffsetDateTime,
        diff: &mut DiffResult,
    ) -> Result<()> {
        if self.creates.is_empty() {
            return Ok(());
        }
        let mut bbox = BBox::empty();
        for new_way in &self.creates {
            if new_way.payload.nodes.is_empty() {
                return Err(ApiError::BadRequest(format!(
                    "Way {} must reference at least one node",
                    new_way.placeholder_id
                )));
            }
            if new_way.payload.nodes.len() as u32 > self.config.way_max_nodes {
                return Err(ApiError::BadRequest(format!(
                    "Way {} has more than the maximum of {} nodes",
                    new_way.placeholder_id, self.config.way_max_nodes
                )));
            }
            check_tag_count(self.config, new_way.payload.tags.len())?;

            let (node_ids, _guards) =
                self.resolve_and_lock_nodes(new_way.placeholder_id, resolver, &new_way.payload.nodes)?;
            bbox.expand(self.node_bbox(&node_ids));

            let id = self.store.with_tables(|t| t.allocate_id(Kind::Way));
            let way_nodes = node_ids
                .into_iter()
                .enumerate()
                .map(|(i, node_id)| WayNode {
                    node_id,
                    sequence_id: (i + 1) as u32,
                })
                .collect();
            let way = Way {
                id,
                version: 1,
                changeset: self.changeset,
                visible: true,
                timestamp: now,
                nodes: way_nodes,
                tags: new_way.payload.tags.clone(),
            };
            self.store.insert_way(way);
            resolver.register(Kind::Way, new_way.placeholder_id, id)?;
            diff.record_created(new_way.index, Kind::Way, new_way.placeholder_id, id);
        }
        cs.expand_bbox(bbox);
        cs.update_bbox_and_count(now, self.creates.len() as u32)
    }

    pub fn process_modifies(
        &self,
        resolver: &PlaceholderResolver,
        cs: &mut ChangesetUpdater,
        now: OffsetDateTime,
        diff: &mut DiffResult,
    ) -> Result<()> {
        if self.modifies.is_empty() {
            return Ok(());
        }
        let mut resolved_ids = Vec::with_capacity(self.modifies.len());
        for m in &self.modifies {
            resolved_ids.push(resolver.resolve(Kind::Way, m.id)?);
        }
        self.store.require_existing(Kind::Way, &resolved_ids)?;
        let _guards = self.store.lock_exclusive(Kind::Way, &resolved_ids);

        let mut bbox = BBox::empty();
        for (m, id) in self.modifies.iter().zip(&resolved_ids) {
            if m.payload.nodes.is_empty() {
                return Err(ApiError::BadRequest(format!("Way {id} must reference at least one node")));
            }
            if m.payload.nodes.len() as u32 > self.config.way_max_nodes {
                return Err(ApiError::BadRequest(format!(
                    "Way {id} has more than the maximum of {} nodes",
                    self.config.way_max_nodes
                )));
            }
            check_tag_count(self.config, m.payload.tags.len())?;

            let mut way = self
                .store
                .get_way(*id)
                .ok_or_else(|| ApiError::NotFound(format!("Way {id} not found")))?;
            if !way.visible {
                return Err(ApiError::Gone(format!("The way with id {id} has already been deleted")));
            }
            if way.version != m.version {
                return Err(ApiError::Conflict(format!(
                    "Version mismatch: Provided {}, server had {} of Way {id}",
                    m.version, way.version
                )));
            }

            let (node_ids, _guards) = self.resolve_and_lock_nodes(*id as i64, resolver, &m.payload.nodes)?;
            bbox.expand(self.node_bbox(&node_ids));
            way.nodes = node_ids
                .into_iter()
                .enumerate()
                .map(|(i, node_id)| WayNode {
                    node_id,
                    sequence_id: (i + 1) as u32,
                })
                .collect();
            way.changeset = self.changeset;
            way.version += 1;
            way.timestamp = now;
            way.tags = m.payload.tags.clone();
            let new_version = way.version;
            self.store.put_way(way);
            diff.record_modified(m.index, Kind::Way, *id, new_version);
        }
        cs.expand_bbox(bbox);
        cs.update_bbox_and_count(now, self.modifies.len() as u32)
    }

    pub fn process_deletes(
        &self,
        resolver: &PlaceholderResolver,
        cs: &mut ChangesetUpdater,
        now: OffsetDateTime,
        diff: &mut DiffResult,
    ) -> Result<()> {
        if self.deletes.is_empty() {
            return Ok(());
        }
        let mut resolved_ids = Vec::with_capacity(self.deletes.len());
        for d in &self.deletes {
            resolved_ids.push(resolver.resolve(Kind::Way, d.id)?);
        }
        self.store.require_existing(Kind::Way, &resolved_ids)?;
        let _guards = self.store.lock_exclusive(Kind::Way, &resolved_ids);

        let mut applied = 0u32;
        for (d, id) in self.deletes.iter().zip(&resolved_ids) {
            let mut way = self
                .store
                .get_way(*id)
                .ok_or_else(|| ApiError::NotFound(format!("Way {id} not found")))?;

            if !way.visible {
                if d.if_unused {
                    diff.record_skipped(d.index, Kind::Way, *id, way.version);
                    continue;
                }
                return Err(ApiError::Gone(format!("The way with id {id} has already been deleted")));
            }
            if way.version != d.version {
                return Err(ApiError::Conflict(format!(
                    "Version mismatch: Provided {}, server had {} of Way {id}",
                    d.version, way.version
                )));
            }

            let referencing_relations = self.store.relations_referencing(Kind::Way, *id);
            if !referencing_relations.is_empty() {
                if d.if_unused {
                    diff.record_skipped(d.index, Kind::Way, *id, way.version);
                    continue;
                }
                return Err(ApiError::PreconditionFailed(format!(
                    "Way {id} is still used by relations {}.",
                    join_ids(&referencing_relations)
                )));
            }

            way.visible = false;
            way.changeset = self.changeset;
            way.version += 1;
            way.timestamp = now;
            way.nodes.clear();
            self.store.put_way(way);
            applied += 1;
            diff.record_deleted(d.index, Kind::Way, *id);
        }
        cs.update_bbox_and_count(now, applied)
    }
}

fn check_tag_count(config: &Config, count: usize) -> Result<()> {
    if let Some(max) = config.element_max_tags {
        if count as u32 > max {
            return Err(ApiError::BadRequest(format!(
                "Element exceeds the maximum of {max} tags"
            )));
        }
    }
    Ok(())
}
