//! Node create/modify/delete (spec §4.4).
//!
//! Mirrors `ApiDB_Node_Updater`'s two-phase shape: operations are staged by
//! index as the payload is walked, then each phase (`process_creates`,
//! `process_modifies`, `process_deletes`) is applied as one batch against
//! the store, in that fixed order, so that a create earlier in the upload
//! is always visible to a later modify or delete of the same node.

use time::OffsetDateTime;

use crate::changeset::ChangesetUpdater;
use crate::config::Config;
use crate::diff::DiffResult;
use crate::error::{ApiError, Result};
use crate::model::{BBox, ElementRef, Kind, Node, NodePayload, OsmId, PlaceholderId, Version};
use crate::placeholder::PlaceholderResolver;
use crate::store::Transaction;
#[cfg(test)]
use crate::store::Store;
use crate::tile;
use crate::updater::join_ids;

struct NewNode {
    index: usize,
    placeholder_id: PlaceholderId,
    payload: NodePayload,
}

struct ModifyNode {
    index: usize,
    id: ElementRef,
    version: Version,
    payload: NodePayload,
}

struct DeleteNode {
    index: usize,
    id: ElementRef,
    version: Version,
    if_unused: bool,
}

/// Stages and applies node operations for one upload.
pub struct NodeUpdater<'s> {
    store: &'s Transaction<'s>,
    config: &'s Config,
    changeset: OsmId,
    creates: Vec<NewNode>,
    modifies: Vec<ModifyNode>,
    deletes: Vec<DeleteNode>,
}

impl<'s> NodeUpdater<'s> {
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

    /// Stages a create, to be applied by [`NodeUpdater::process_creates`].
    pub fn add_create(&mut self, index: usize, placeholder_id: PlaceholderId, payload: NodePayload) {
        self.creates.push(NewNode {
            index,
            placeholder_id,
            payload,
        });
    }

    /// Stages a modify, to be applied by [`NodeUpdater::process_modifies`].
    pub fn add_modify(&mut self, index: usize, id: ElementRef, version: Version, payload: NodePayload) {
        self.modifies.push(ModifyNode {
            index,
            id,
            version,
            payload,
        });
    }

    /// Stages a delete, to be applied by [`NodeUpdater::process_deletes`].
    pub fn add_delete(&mut self, index: usize, id: ElementRef, version: Version, if_unused: bool) {
        self.deletes.push(DeleteNode {
            index,
            id,
            version,
            if_unused,
        });
    }

    pub fn has_work(&self) -> bool {
        !self.creates.is_empty() || !self.modifies.is_empty() || !self.deletes.is_empty()
    }

    /// Validates and inserts every staged create, then folds their bboxes
    /// and count into `cs` in one call (spec §4.3/§4.4).
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
        for new_node in &self.creates {
            let pos = &new_node.payload.position;
            if !tile::valid_lat(pos.lat) || !tile::valid_lon(pos.lon) {
                return Err(ApiError::BadRequest(format!(
                    "Node {} has invalid coordinates {}, {}",
                    new_node.placeholder_id, pos.lat, pos.lon
                )));
            }
            check_tag_count(self.config, new_node.payload.tags.len())?;

            let lat = tile::scale_coord(pos.lat, self.config.scale);
            let lon = tile::scale_coord(pos.lon, self.config.scale);
            let id = self.store.with_tables(|t| t.allocate_id(Kind::Node));
            let node = Node {
                id,
                version: 1,
                lat,
                lon,
                tile: tile::tile_for(lat, lon),
                changeset: self.changeset,
                visible: true,
                timestamp: now,
                tags: new_node.payload.tags.clone(),
            };
            self.store.insert_node(node);
            resolver.register(Kind::Node, new_node.placeholder_id, id)?;
            bbox.expand(BBox::point(lat, lon));
            diff.record_created(new_node.index, Kind::Node, new_node.placeholder_id, id);
        }
        cs.expand_bbox(bbox);
        cs.update_bbox_and_count(now, self.creates.len() as u32)
    }

    /// Applies every staged modify under exclusive row locks, in ascending
    /// id order, then folds bboxes and count into `cs`.
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
            resolved_ids.push(resolver.resolve(Kind::Node, m.id)?);
        }
        self.store.require_existing(Kind::Node, &resolved_ids)?;
        let _guards = self.store.lock_exclusive(Kind::Node, &resolved_ids);

        let mut bbox = BBox::empty();
        for (m, id) in self.modifies.iter().zip(&resolved_ids) {
            let pos = &m.payload.position;
            if !tile::valid_lat(pos.lat) || !tile::valid_lon(pos.lon) {
                return Err(ApiError::BadRequest(format!(
                    "Node {} has invalid coordinates {}, {}",
                    id, pos.lat, pos.lon
                )));
            }
            check_tag_count(self.config, m.payload.tags.len())?;

            let mut node = self
                .store
                .get_node(*id)
                .ok_or_else(|| ApiError::NotFound(format!("Node {id} not found")))?;
            if !node.visible {
                return Err(ApiError::Gone(format!(
                    "The node with id {id} has already been deleted"
                )));
            }
            if node.version != m.version {
                return Err(ApiError::Conflict(format!(
                    "Version mismatch: Provided {}, server had {} of Node {id}",
                    m.version, node.version
                )));
            }

            bbox.expand(BBox::point(node.lat, node.lon));
            let lat = tile::scale_coord(pos.lat, self.config.scale);
            let lon = tile::scale_coord(pos.lon, self.config.scale);
            bbox.expand(BBox::point(lat, lon));

            node.lat = lat;
            node.lon = lon;
            node.tile = tile::tile_for(lat, lon);
            node.changeset = self.changeset;
            node.version += 1;
            node.timestamp = now;
            node.tags = m.payload.tags.clone();
            let new_version = node.version;
            self.store.put_node(node);
            diff.record_modified(m.index, Kind::Node, *id, new_version);
        }
        cs.expand_bbox(bbox);
        cs.update_bbox_and_count(now, self.modifies.len() as u32)
    }

    /// Applies every staged delete under exclusive row locks, honoring
    /// `if_unused` referential-integrity fallback (spec §4.4 "Delete").
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
            resolved_ids.push(resolver.resolve(Kind::Node, d.id)?);
        }
        self.store.require_existing(Kind::Node, &resolved_ids)?;
        let _guards = self.store.lock_exclusive(Kind::Node, &resolved_ids);

        let mut bbox = BBox::empty();
        let mut applied = 0u32;
        for (d, id) in self.deletes.iter().zip(&resolved_ids) {
            let mut node = self
                .store
                .get_node(*id)
                .ok_or_else(|| ApiError::NotFound(format!("Node {id} not found")))?;

            if !node.visible {
                if d.if_unused {
                    diff.record_skipped(d.index, Kind::Node, *id, node.version);
                    continue;
                }
                return Err(ApiError::Gone(format!(
                    "The node with id {id} has already been deleted"
                )));
            }
            if node.version != d.version {
                return Err(ApiError::Conflict(format!(
                    "Version mismatch: Provided {}, server had {} of Node {id}",
                    d.version, node.version
                )));
            }

            let referencing_ways = self.store.ways_referencing_node(*id);
            if !referencing_ways.is_empty() {
                if d.if_unused {
                    diff.record_skipped(d.index, Kind::Node, *id, node.version);
                    continue;
                }
                return Err(ApiError::PreconditionFailed(format!(
                    "Node {id} is still used by ways {}.",
                    join_ids(&referencing_ways)
                )));
            }
            let referencing_relations = self.store.relations_referencing(Kind::Node, *id);
            if !referencing_relations.is_empty() {
                if d.if_unused {
                    diff.record_skipped(d.index, Kind::Node, *id, node.version);
                    continue;
                }
                return Err(ApiError::PreconditionFailed(format!(
                    "Node {id} is still used by relations {}.",
                    join_ids(&referencing_relations)
                )));
            }

            bbox.expand(BBox::point(node.lat, node.lon));
            node.visible = false;
            node.changeset = self.changeset;
            node.version += 1;
            node.timestamp = now;
            self.store.put_node(node);
            applied += 1;
            diff.record_deleted(d.index, Kind::Node, *id);
        }
        cs.expand_bbox(bbox);
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
