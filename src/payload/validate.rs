//! Structural checks applied to a parsed [`crate::model::Operation`]
//! before it reaches an updater (spec §4.1, cgimap's
//! `changeset_input_format` string-length limits).

use crate::error::{ApiError, Result};
use crate::model::{Operation, Payload};

/// Maximum length, in characters, of a tag key, tag value, or member role
/// (cgimap's `changeset_input_format.hpp` hard-codes 255 for all three).
pub const MAX_TAG_STRING_LEN: usize = 255;

/// Checks tag/role string-length limits and rejects empty tag keys. Count
/// limits (`element_max_tags`, `way_max_nodes`, `relation_max_members`)
/// are enforced by the updaters, which have `Config` in scope.
pub fn validate_operation(op: &Operation) -> Result<()> {
    let payload = match op {
        Operation::Create { payload, .. } => Some(payload),
        Operation::Modify { payload, .. } => Some(payload),
        Operation::Delete { .. } => None,
    };
    let Some(payload) = payload else { return Ok(()) };

    match payload {
        Payload::Node(n) => validate_tags(&n.tags),
        Payload::Way(w) => validate_tags(&w.tags),
        Payload::Relation(r) => {
            validate_tags(&r.tags)?;
            for (_, _, role) in &r.members {
                validate_string(role, "member role")?;
            }
            Ok(())
        }
    }
}

fn validate_tags(tags: &std::collections::BTreeMap<String, String>) -> Result<()> {
    for (k, v) in tags {
        if k.is_empty() {
            return Err(ApiError::BadRequest("Tag keys may not be empty".to_string()));
        }
        validate_string(k, "tag key")?;
        validate_string(v, "tag value")?;
    }
    Ok(())
}

fn validate_string(s: &str, what: &str) -> Result<()> {
    if s.chars().count() > MAX_TAG_STRING_LEN {
        return Err(ApiError::BadRequest(format!(
            "{what} has more than {MAX_TAG_STRING_LEN} characters"
        )));
    }
    Ok(())
}
