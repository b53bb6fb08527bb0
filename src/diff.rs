//! The diff-result emitter (spec §4.7).
//!
//! Accumulates one outcome per input operation as the element updaters
//! process them, then replays them in input order. The pipeline never
//! calls [`DiffResult::into_entries`] on a partially populated
//! accumulator - see [`DiffResult::finish`].

use serde::Serialize;

use crate::model::{Kind, OsmId, PlaceholderId, Version};

/// What happened to one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DiffOutcome {
    /// A create: `new_id` is freshly assigned, version is always 1.
    Created { new_id: OsmId, new_version: Version },
    /// A modify: version is the client's claimed version plus one.
    Modified { new_id: OsmId, new_version: Version },
    /// An effective delete: no new id or version is reported.
    Deleted,
    /// A delete skipped via `if_unused`: reports the element's current,
    /// unchanged, id and version.
    Skipped { new_id: OsmId, current_version: Version },
}

/// One entry of the diff-result, tagged with its position in the input
/// stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    /// Position of the source operation in the upload.
    pub index: usize,
    /// Which kind of element this concerns.
    pub kind: Kind,
    /// The id the client used to refer to this element: the placeholder
    /// for a create, the server id otherwise.
    pub old_id: i64,
    /// The recorded outcome.
    pub outcome: DiffOutcome,
}

impl DiffEntry {
    /// The server id this entry reports, if its outcome carries one
    /// (everything but a plain delete).
    pub fn new_id(&self) -> Option<OsmId> {
        match self.outcome {
            DiffOutcome::Created { new_id, .. }
            | DiffOutcome::Modified { new_id, .. }
            | DiffOutcome::Skipped { new_id, .. } => Some(new_id),
            DiffOutcome::Deleted => None,
        }
    }
}

/// Accumulates diff entries out of order (as updaters finish each phase)
/// and replays them in input order once the upload is complete.
#[derive(Default)]
pub struct DiffResult {
    entries: Vec<Option<DiffEntry>>,
}

impl DiffResult {
    /// Prepares an accumulator sized for `operation_count` operations.
    pub fn new(operation_count: usize) -> Self {
        Self {
            entries: vec![None; operation_count],
        }
    }

    /// Records the outcome for operation `index`. Panics if `index` is
    /// out of range or already recorded - both are pipeline-driver bugs,
    /// never a consequence of client input.
    pub fn record(&mut self, index: usize, kind: Kind, old_id: i64, outcome: DiffOutcome) {
        let slot = self
            .entries
            .get_mut(index)
            .unwrap_or_else(|| panic!("diff index {index} out of range"));
        assert!(slot.is_none(), "diff index {index} recorded twice");
        *slot = Some(DiffEntry {
            index,
            kind,
            old_id,
            outcome,
        });
    }

    /// Convenience for a create outcome, `old_id` being the placeholder.
    pub fn record_created(&mut self, index: usize, kind: Kind, placeholder_id: PlaceholderId, new_id: OsmId) {
        self.record(
            index,
            kind,
            placeholder_id,
            DiffOutcome::Created {
                new_id,
                new_version: 1,
            },
        );
    }

    /// Convenience for a modify outcome.
    pub fn record_modified(&mut self, index: usize, kind: Kind, id: OsmId, new_version: Version) {
        self.record(
            index,
            kind,
            id as i64,
            DiffOutcome::Modified { new_id: id, new_version },
        );
    }

    /// Convenience for an effective delete outcome.
    pub fn record_deleted(&mut self, index: usize, kind: Kind, id: OsmId) {
        self.record(index, kind, id as i64, DiffOutcome::Deleted);
    }

    /// Convenience for a skipped-via-`if_unused` delete outcome.
    pub fn record_skipped(&mut self, index: usize, kind: Kind, id: OsmId, current_version: Version) {
        self.record(
            index,
            kind,
            id as i64,
            DiffOutcome::Skipped {
                new_id: id,
                current_version,
            },
        );
    }

    /// Replays recorded entries in input order. Fails (pipeline bug, not
    /// client-facing) if any operation never got an outcome recorded.
    pub fn finish(self) -> Vec<DiffEntry> {
        self.entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| e.unwrap_or_else(|| panic!("operation {i} produced no diff outcome")))
            .collect()
    }
}

/// Renders a finished diff-result as the `<diffResult>` document an OSM
/// editing client expects in response to an upload (spec §4.7).
pub fn to_xml(entries: &[DiffEntry]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<diffResult generator=\"changeset-engine\" version=\"0.6\">\n");
    for e in entries {
        let tag = match e.kind {
            Kind::Node => "node",
            Kind::Way => "way",
            Kind::Relation => "relation",
        };
        let line = match e.outcome {
            DiffOutcome::Created { new_id, new_version } => {
                format!("  <{tag} old_id=\"{}\" new_id=\"{new_id}\" new_version=\"{new_version}\"/>\n", e.old_id)
            }
            DiffOutcome::Modified { new_id, new_version } => {
                format!("  <{tag} old_id=\"{}\" new_id=\"{new_id}\" new_version=\"{new_version}\"/>\n", e.old_id)
            }
            DiffOutcome::Deleted => format!("  <{tag} old_id=\"{}\"/>\n", e.old_id),
            DiffOutcome::Skipped { new_id, current_version } => format!(
                "  <{tag} old_id=\"{}\" new_id=\"{new_id}\" new_version=\"{current_version}\"/>\n",
                e.old_id
            ),
        };
        out.push_str(&line);
    }
    out.push_str("</diffResult>\n");
    out
}

/// Renders a finished diff-result as JSON, for callers that prefer it over
/// the XML wire format (spec §4.7 notes both are acceptable response
/// encodings).
pub fn to_json(entries: &[DiffEntry]) -> serde_json::Value {
    serde_json::json!({
        "diffResult": entries,
    })
}
