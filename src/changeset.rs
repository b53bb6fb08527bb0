//! Changeset admission, bbox/quota bookkeeping, and tag management
//! (spec §4.3).

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{ApiError, Result};
use crate::model::{BBox, Changeset, OsmId, Tags};
use crate::store::{ChangesetGuard, Store, Transaction};

/// Operates on a single changeset for the lifetime of one upload (or one
/// lifecycle endpoint call). Holds the changeset's exclusive row lock for
/// as long as the updater is alive once [`ChangesetUpdater::lock_for_edit`]
/// has succeeded.
pub struct ChangesetUpdater<'s> {
    store: &'s Transaction<'s>,
    config: &'s Config,
    ctx: RequestContext,
    changeset_id: OsmId,
    /// In-memory copy of bbox/num_changes, loaded by `lock_for_edit` and
    /// kept current as operations are applied; only flushed to the store
    /// by [`ChangesetUpdater::update_bbox_and_count`].
    bbox: BBox,
    num_changes: u32,
    _guard: Option<ChangesetGuard>,
}

impl<'s> ChangesetUpdater<'s> {
    /// Builds an updater bound to `changeset_id`, not yet locked.
    pub fn new(store: &'s Transaction<'s>, config: &'s Config, ctx: RequestContext, changeset_id: OsmId) -> Self {
        Self {
            store,
            config,
            ctx,
            changeset_id,
            bbox: BBox::empty(),
            num_changes: 0,
            _guard: None,
        }
    }

    /// Locks the changeset for editing (spec §4.3 `lock_for_edit`).
    ///
    /// 1. Verifies the changeset exists and is owned by the requesting
    ///    user.
    /// 2. Acquires a non-blocking exclusive row lock.
    /// 3. Fails if the changeset is already closed.
    /// 4. If `check_limit`, fails if the changeset is already at quota.
    /// 5. Loads the current bbox and `num_changes` into memory.
    pub fn lock_for_edit(&mut self, now: OffsetDateTime, check_limit: bool) -> Result<()> {
        let cs = self
            .store
            .get_changeset(self.changeset_id)
            .ok_or_else(|| ApiError::NotFound(format!("Changeset {} not found", self.changeset_id)))?;

        if cs.user_id != self.ctx.user_id {
            return Err(ApiError::Conflict(
                "The user doesn't own that changeset".to_string(),
            ));
        }

        let guard = self.store.try_lock_changeset(self.changeset_id).ok_or_else(|| {
            ApiError::Conflict(format!(
                "Changeset {} is currently locked by another process",
                self.changeset_id
            ))
        })?;

        if cs.closed_at < now {
            return Err(ApiError::Conflict(format!(
                "The changeset {} was closed at {}",
                self.changeset_id, cs.closed_at
            )));
        }

        if check_limit && cs.num_changes >= self.config.changeset_max_elements {
            return Err(ApiError::Conflict(format!(
                "The changeset {} was closed at {}",
                self.changeset_id, now
            )));
        }

        self.bbox = cs.bbox;
        self.num_changes = cs.num_changes;
        self._guard = Some(guard);
        debug!(changeset = self.changeset_id, "locked changeset for edit");
        Ok(())
    }

    /// Current in-memory bbox, expanded as operations are staged.
    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// Expands the in-memory bbox by `delta`. Callers accumulate several
    /// deltas across a phase before calling
    /// [`ChangesetUpdater::update_bbox_and_count`] to persist them.
    pub fn expand_bbox(&mut self, delta: BBox) {
        self.bbox.expand(delta);
    }

    /// Adds `new_ops` to `num_changes`, fails if the new total would
    /// exceed the configured limit, persists the updated count/bbox, and
    /// recomputes `closed_at` (spec §4.3 `update_bbox_and_count`).
    pub fn update_bbox_and_count(&mut self, now: OffsetDateTime, new_ops: u32) -> Result<()> {
        if self.num_changes + new_ops > self.config.changeset_max_elements {
            return Err(ApiError::Conflict(format!(
                "The changeset {} was closed at {}",
                self.changeset_id, now
            )));
        }
        self.num_changes += new_ops;

        let mut cs = self
            .store
            .get_changeset(self.changeset_id)
            .ok_or_else(|| ApiError::ServerError("changeset vanished mid-transaction".to_string()))?;
        cs.num_changes = self.num_changes;
        cs.bbox = self.bbox;
        cs.closed_at = recompute_closed_at(cs.created_at, now, self.config);
        self.store.put_changeset(cs);
        Ok(())
    }

    /// Creates a brand-new changeset owned by the requesting user (spec
    /// §4.3 `create`).
    pub fn create(store: &'s Store, config: &'s Config, ctx: RequestContext, tags: Tags, now: OffsetDateTime) -> OsmId {
        store.create_changeset(ctx.user_id, tags, now, config)
    }

    /// Replaces the changeset's tag set (authoritative replacement).
    pub fn update_tags(&mut self, tags: Tags) -> Result<()> {
        let mut cs = self
            .store
            .get_changeset(self.changeset_id)
            .ok_or_else(|| ApiError::NotFound(format!("Changeset {} not found", self.changeset_id)))?;
        cs.tags = tags;
        self.store.put_changeset(cs);
        Ok(())
    }

    /// Unconditionally closes the changeset (`closed_at = now`).
    pub fn close(&mut self, now: OffsetDateTime) -> Result<()> {
        let mut cs = self
            .store
            .get_changeset(self.changeset_id)
            .ok_or_else(|| ApiError::NotFound(format!("Changeset {} not found", self.changeset_id)))?;
        if cs.user_id != self.ctx.user_id {
            return Err(ApiError::Conflict(
                "The user doesn't own that changeset".to_string(),
            ));
        }
        cs.closed_at = now;
        self.store.put_changeset(cs);
        warn!(changeset = self.changeset_id, "changeset closed");
        Ok(())
    }

    /// The changeset id this updater operates on.
    pub fn changeset_id(&self) -> OsmId {
        self.changeset_id
    }
}

/// `closed_at` is clipped so the changeset's total lifespan never exceeds
/// `changeset_timeout_open_max`, subject to that cap extended by
/// `changeset_timeout_idle` from now (spec §4.3).
fn recompute_closed_at(created_at: OffsetDateTime, now: OffsetDateTime, config: &Config) -> OffsetDateTime {
    let capped = created_at + config.changeset_timeout_open_max;
    let extended = now + config.changeset_timeout_idle;
    if extended > capped {
        capped
    } else {
        extended
    }
}

/// Snapshot returned by lifecycle helpers that don't need a live updater.
pub fn describe(cs: &Changeset) -> String {
    format!(
        "changeset {} (user {}, {} changes)",
        cs.id, cs.user_id, cs.num_changes
    )
}
