//! Relation create/modify/delete (spec §4.6).
//!
//! Members may reference nodes, ways, or other relations, including cycles
//! (a relation may contain itself, or two relations may contain each
//! other). Shared locks are taken on every referenced element except the
//! relation's own id, which the caller already holds exclusively - taking
//! a shared lock on it too would deadlock against `parking_lot`'s
//! non-reentrant `RwLock`.

use time::OffsetDateTime;

use crate::changeset::ChangesetUpdater;
use crate::config::Config;
use crate::diff::DiffResult;
use crate::error::{ApiError, Result};
use crate::model::{ElementRef, Kind, MemberKind, OsmId, PlaceholderId, Relation, RelationMember, RelationPayload, Version};
use crate::placeholder::PlaceholderResolver;
use crate::store::Transaction;
#[cfg(test)]
use crate::store::Store;
use crate::updater::join_ids;

struct NewRelation {
    index: usize,
    placeholder_id: PlaceholderId,
    payload: RelationPayload,
}

struct ModifyRelation {
    index: usize,
    id: ElementRef,
    version: Version,
    payload: RelationPayload,
}

struct DeleteRelation {
    index: usize,
    id: ElementRef,
    version: Version,
    if_unused: bool,
}

/// Stages and applies relation operations for one upload.
pub struct RelationUpdater<'s> {
    store: &'s Transaction<'s>,
    config: &'s Config,
    changeset: OsmId,
    creates: Vec<NewRelation>,
    modifies: Vec<ModifyRelation>,
    deletes: Vec<DeleteRelation>,
}

impl<'s> RelationUpdater<'s> {
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

    pub fn add_create(&mut self, index: usize, placeholder_id: PlaceholderId, payload: RelationPayload) {
        self.creates.push(NewRelation {
            index,
            placeholder_id,
            payload,
        });
    }

    pub fn add_modify(&mut self, index: usize, id: ElementRef, version: Version, payload: RelationPayload) {
        self.modifies.push(ModifyRelation {
            index,
            id,
            version,
            payload,
        });
    }

    pub fn add_delete(&mut self, index: usize, id: ElementRef, version: Version, if_unused: bool) {
        self.deletes.push(DeleteRelation {
            index,
            id,
            version,
            if_unused,
        });
    }

    pub fn has_work(&self) -> bool {
        !self.creates.is_empty() || !self.modifies.is_empty() || !self.deletes.is_empty()
    }

    /// Resolves every member reference, checks it exists and is visible,
    /// and takes shared locks on the resolved set (minus `self_id`, which
    /// the caller already holds exclusively if this is a modify).
    fn resolve_and_lock_members(
        &self,
        resolver: &PlaceholderResolver,
        members: &[(MemberKind, ElementRef, String)],
        self_id: Option<OsmId>,
    ) -> Result<(Vec<RelationMember>, Vec<crate::store::SharedRowGuard>)> {
        let mut resolved = Vec::with_capacity(members.len());
        for (member_type, reference, role) in members {
            let kind: Kind = (*member_type).into();
            let id = resolver.resolve(kind, *reference)?;
            resolved.push((kind, id, role.clone()));
        }

        let mut guards = Vec::new();
        for kind in Kind::PROCESSING_ORDER {
            let ids: Vec<OsmId> = resolved
                .iter()
                .filter(|(k, id, _)| *k == kind && Some(*id) != self_id)
                .map(|(_, id, _)| *id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            // A missing member and a tombstoned one are the same failure
            // here (spec §4.6 "every referenced member must exist and be
            // visible"): both are PreconditionFailed, never NotFound -
            // that status is reserved for a modify/delete's own target.
            let missing_or_invisible: Vec<OsmId> = ids
                .iter()
                .copied()
                .filter(|id| !self.store.is_visible(kind, *id))
                .collect();
            if !missing_or_invisible.is_empty() {
                return Err(ApiError::PreconditionFailed(format!(
                    "Relation references missing or deleted {kind} {missing_or_invisible:?}"
                )));
            }
            guards.extend(self.store.lock_shared(kind, &ids));
        }

        let members = resolved
            .into_iter()
            .enumerate()
            .map(|(i, (kind, id, role))| RelationMember {
                member_type: member_kind(kind),
                member_id: id,
                role,
                sequence_id: (i + 1) as u32,
            })
            .collect();
        Ok((members, guards))
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
        for new_rel in &self.creates {
            if let Some(max) = self.config.relation_max_members {
                if new_rel.payload.members.len() as u32 > max {
                    return Err(ApiError::BadRequest(format!(
                        "Relation {} has more than the maximum of {max} members",
                        new_rel.placeholder_id
                    )));
                }
            }
            check_tag_count(self.config, new_rel.payload.tags.len())?;

            let (members, _guards) = self.resolve_and_lock_members(resolver, &new_rel.payload.members, None)?;

            let id = self.store.with_tables(|t| t.allocate_id(Kind::Relation));
            let relation = Relation {
                id,
                version: 1,
                changeset: self.changeset,
                visible: true,
                timestamp: now,
                members,
                tags: new_rel.payload.tags.clone(),
            };
            self.store.insert_relation(relation);
            resolver.register(Kind::Relation, new_rel.placeholder_id, id)?;
            diff.record_created(new_rel.index, Kind::Relation, new_rel.placeholder_id, id);
        }
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
            resolved_ids.push(resolver.resolve(Kind::Relation, m.id)?);
        }
        self.store.require_existing(Kind::Relation, &resolved_ids)?;
        let _guards = self.store.lock_exclusive(Kind::Relation, &resolved_ids);

        for (m, id) in self.modifies.iter().zip(&resolved_ids) {
            if let Some(max) = self.config.relation_max_members {
                if m.payload.members.len() as u32 > max {
                    return Err(ApiError::BadRequest(format!(
                        "Relation {id} has more than the maximum of {max} members"
                    )));
                }
            }
            check_tag_count(self.config, m.payload.tags.len())?;

            let mut relation = self
                .store
                .get_relation(*id)
                .ok_or_else(|| ApiError::NotFound(format!("Relation {id} not found")))?;
            if !relation.visible {
                return Err(ApiError::Gone(format!(
                    "The relation with id {id} has already been deleted"
                )));
            }
            if relation.version != m.version {
                return Err(ApiError::Conflict(format!(
                    "Version mismatch: Provided {}, server had {} of Relation {id}",
                    m.version, relation.version
                )));
            }

            let (members, _guards) = self.resolve_and_lock_members(resolver, &m.payload.members, Some(*id))?;
            relation.members = members;
            relation.changeset = self.changeset;
            relation.version += 1;
            relation.timestamp = now;
            relation.tags = m.payload.tags.clone();
            let new_version = relation.version;
            self.store.put_relation(relation);
            diff.record_modified(m.index, Kind::Relation, *id, new_version);
        }
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
            resolved_ids.push(resolver.resolve(Kind::Relation, d.id)?);
        }
        self.store.require_existing(Kind::Relation, &resolved_ids)?;
        let _guards = self.store.lock_exclusive(Kind::Relation, &resolved_ids);

        let mut applied = 0u32;
        for (d, id) in self.deletes.iter().zip(&resolved_ids) {
            let mut relation = self
                .store
                .get_relation(*id)
                .ok_or_else(|| ApiError::NotFound(format!("Relation {id} not found")))?;

            if !relation.visible {
                if d.if_unused {
                    diff.record_skipped(d.index, Kind::Relation, *id, relation.version);
                    continue;
                }
                return Err(ApiError::Gone(format!(
                    "The relation with id {id} has already been deleted"
                )));
            }
            if relation.version != d.version {
                return Err(ApiError::Conflict(format!(
                    "Version mismatch: Provided {}, server had {} of Relation {id}",
                    d.version, relation.version
                )));
            }

            let referencing_relations = self.store.relations_referencing(Kind::Relation, *id);
            if !referencing_relations.is_empty() {
                if d.if_unused {
                    diff.record_skipped(d.index, Kind::Relation, *id, relation.version);
                    continue;
                }
                return Err(ApiError::PreconditionFailed(format!(
                    "Relation {id} is still used by relations {}.",
                    join_ids(&referencing_relations)
                )));
            }

            relation.visible = false;
            relation.changeset = self.changeset;
            relation.version += 1;
            relation.timestamp = now;
            relation.members.clear();
            self.store.put_relation(relation);
            applied += 1;
            diff.record_deleted(d.index, Kind::Relation, *id);
        }
        cs.update_bbox_and_count(now, applied)
    }
}

fn member_kind(kind: Kind) -> MemberKind {
    match kind {
        Kind::Node => MemberKind::Node,
        Kind::Way => MemberKind::Way,
        Kind::Relation => MemberKind::Relation,
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
