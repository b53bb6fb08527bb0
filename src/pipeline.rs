//! The upload pipeline driver (spec §4, §5).
//!
//! Ties together payload parsing, changeset admission, placeholder
//! resolution, and the three element updaters into the single call a
//! transport layer makes per upload: [`upload`]. Ordering is fixed and not
//! configurable, mirroring cgimap's `ApiDB_Uploader::process_message`:
//!
//! 1. Parse and structurally validate the OsmChange document.
//! 2. Lock the target changeset, checking ownership/closed/quota.
//! 3. Optionally reject on the prospective bbox before any element write
//!    happens, so a bbox-size rejection never leaves a partial upload.
//! 4. Apply creates (node, then way, then relation - so a way create can
//!    reference a node placeholder minted earlier in this same upload).
//! 5. Apply modifies in the same kind order.
//! 6. Apply deletes in the reverse kind order (relation, then way, then
//!    node), so deleting a relation frees the ways/nodes it referenced
//!    before they're themselves targeted for deletion.
//!
//! A failure at any step returns immediately without reaching later
//! steps. [`upload`] opens a [`crate::store::Transaction`] before
//! [`run_transaction`]'s first write and rolls it back on any `Err`, so the
//! net effect matches the single serializable transaction spec §5
//! describes: either every operation's writes land, or none of them do
//! (spec P6) - and a rollback undoes only this upload's own rows, leaving
//! whatever a concurrently committing upload on a different changeset
//! wrote untouched (spec P8).

use time::OffsetDateTime;

use crate::changeset::ChangesetUpdater;
use crate::config::Config;
use crate::context::RequestContext;
use crate::diff::{DiffEntry, DiffResult};
use crate::error::Result;
use crate::model::{BBox, Kind, Operation, OsmId, Payload};
use crate::payload::{parse_osm_change, validate_operation};
use crate::placeholder::PlaceholderResolver;
use crate::ratelimit::{check_bbox_area, RateLimiter};
use crate::store::{Store, Transaction};
use crate::tile;
use crate::updater::node::NodeUpdater;
use crate::updater::relation::RelationUpdater;
use crate::updater::way::WayUpdater;

/// Outcome of a successful upload.
pub struct UploadResult {
    /// The changeset the upload was applied against.
    pub changeset_id: OsmId,
    /// One entry per input operation, in input order.
    pub diff: Vec<DiffEntry>,
}

/// Applies one OsmChange document to `changeset_id`.
///
/// `rate_limiter` is consulted first, against the raw byte length of
/// `xml`, when `config.ratelimiter_upload` is set. Pass `None` to skip
/// rate limiting (e.g. in tests, or when the transport layer already
/// enforces it).
pub fn upload(
    store: &Store,
    config: &Config,
    ctx: RequestContext,
    changeset_id: OsmId,
    xml: &[u8],
    now: OffsetDateTime,
    rate_limiter: Option<&dyn RateLimiter>,
) -> Result<UploadResult> {
    if config.ratelimiter_upload {
        if let Some(limiter) = rate_limiter {
            limiter.check_and_consume(&ctx, xml.len() as u64, now)?;
        }
    }

    let ops = parse_osm_change(xml, config.payload_max_size)?;
    for op in &ops {
        validate_operation(op)?;
    }

    // Open a transaction before the first write so any later error can
    // undo exactly this upload's own rows (spec §5 "transaction boundary",
    // P6, P8). Parsing/validation above never touch the store, so nothing
    // needs to be undone if they fail.
    let txn = store.begin();

    match run_transaction(&txn, config, ctx, changeset_id, ops, now) {
        Ok(result) => {
            txn.commit();
            Ok(result)
        }
        Err(err) => {
            txn.rollback();
            Err(err)
        }
    }
}

fn run_transaction<'s>(
    txn: &'s Transaction<'s>,
    config: &Config,
    ctx: RequestContext,
    changeset_id: OsmId,
    ops: Vec<Operation>,
    now: OffsetDateTime,
) -> Result<UploadResult> {
    let mut cs = ChangesetUpdater::new(txn, config, ctx, changeset_id);
    cs.lock_for_edit(now, true)?;

    if config.bbox_size_limiter_upload {
        check_bbox_area(config, prospective_bbox(&ops, cs.bbox(), config))?;
    }

    let mut resolver = PlaceholderResolver::new();
    let mut diff = DiffResult::new(ops.len());

    let mut nodes = NodeUpdater::new(txn, config, changeset_id);
    let mut ways = WayUpdater::new(txn, config, changeset_id);
    let mut relations = RelationUpdater::new(txn, config, changeset_id);

    for op in ops {
        match op {
            Operation::Create {
                index,
                placeholder_id,
                payload,
            } => match payload {
                Payload::Node(p) => nodes.add_create(index, placeholder_id, p),
                Payload::Way(p) => ways.add_create(index, placeholder_id, p),
                Payload::Relation(p) => relations.add_create(index, placeholder_id, p),
            },
            Operation::Modify {
                index,
                id,
                version,
                payload,
            } => match payload {
                Payload::Node(p) => nodes.add_modify(index, id, version, p),
                Payload::Way(p) => ways.add_modify(index, id, version, p),
                Payload::Relation(p) => relations.add_modify(index, id, version, p),
            },
            Operation::Delete {
                index,
                kind,
                id,
                version,
                if_unused,
            } => match kind {
                Kind::Node => nodes.add_delete(index, id, version, if_unused),
                Kind::Way => ways.add_delete(index, id, version, if_unused),
                Kind::Relation => relations.add_delete(index, id, version, if_unused),
            },
        }
    }

    nodes.process_creates(&mut resolver, &mut cs, now, &mut diff)?;
    ways.process_creates(&mut resolver, &mut cs, now, &mut diff)?;
    relations.process_creates(&mut resolver, &mut cs, now, &mut diff)?;

    nodes.process_modifies(&resolver, &mut cs, now, &mut diff)?;
    ways.process_modifies(&resolver, &mut cs, now, &mut diff)?;
    relations.process_modifies(&resolver, &mut cs, now, &mut diff)?;

    relations.process_deletes(&resolver, &mut cs, now, &mut diff)?;
    ways.process_deletes(&resolver, &mut cs, now, &mut diff)?;
    nodes.process_deletes(&resolver, &mut cs, now, &mut diff)?;

    Ok(UploadResult {
        changeset_id,
        diff: diff.finish(),
    })
}

/// Unions every node position a create or modify operation would write
/// with the changeset's current bbox, without mutating anything. Used so
/// the bbox-size admission check runs before any element write.
fn prospective_bbox(ops: &[Operation], current: BBox, config: &Config) -> BBox {
    let mut bbox = current;
    for op in ops {
        let position = match op {
            Operation::Create {
                payload: Payload::Node(p),
                ..
            }
            | Operation::Modify {
                payload: Payload::Node(p),
                ..
            } => &p.position,
            _ => continue,
        };
        if !tile::valid_lat(position.lat) || !tile::valid_lon(position.lon) {
            continue;
        }
        let lat = tile::scale_coord(position.lat, config.scale);
        let lon = tile::scale_coord(position.lon, config.scale);
        bbox.expand(BBox::point(lat, lon));
    }
    bbox
}
