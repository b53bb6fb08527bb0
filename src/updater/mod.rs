//! Element updaters: one per kind, staged then applied in three phases
//! (spec §4.4-§4.6). [`crate::pipeline`] drives all three in the fixed
//! order creates, modifies, deletes, within the fixed kind order
//! node/way/relation for creates (so a placeholder is always resolvable
//! downstream of the kind that created it) and the reverse order for
//! deletes (so referential integrity is checked leaf-first).

pub mod node;
pub mod relation;
pub mod way;

/// Renders a list of ids as cgimap's `string_agg(...,',')`-style reference
/// list: comma-separated, no braces, no surrounding whitespace (as opposed
/// to `to_string(std::set<...>)`'s `{1,2,3}`, used for a different message
/// elsewhere).
pub(crate) fn join_ids(ids: &[crate::model::OsmId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}
