//! The caller identity the pipeline consumes.
//!
//! Authentication itself is out of scope (spec §1): by the time a request
//! reaches this crate, it has already been authenticated and reduced to a
//! `RequestContext`.

use crate::model::OsmId;

/// The authenticated user making the request, plus the bits of their
/// account the pipeline needs to enforce limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    /// The authenticated user's id.
    pub user_id: OsmId,
    /// Moderators get a larger rate-limit bucket (spec §5).
    pub is_moderator: bool,
}

impl RequestContext {
    /// Builds a context for a regular (non-moderator) user.
    pub fn user(user_id: OsmId) -> Self {
        Self {
            user_id,
            is_moderator: false,
        }
    }

    /// Builds a context for a moderator.
    pub fn moderator(user_id: OsmId) -> Self {
        Self {
            user_id,
            is_moderator: true,
        }
    }
}
