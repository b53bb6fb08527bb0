//! Crate-wide error type.
//!
//! The pipeline never panics on malformed input or on a failed invariant
//! check; every fallible operation returns [`Result`]. The variants mirror
//! the fixed error taxonomy an OSM-style editing API exposes to clients: the
//! HTTP status code a caller would map each variant to is documented on the
//! variant itself, but this crate never constructs an HTTP response -
//! that's the transport layer's job.

use thiserror::Error;

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, ApiError>;

/// The fixed error taxonomy of the upload pipeline (spec §7).
///
/// Every variant carries a human-readable message that names the failing
/// entity (id, version, referenced ids) where applicable. Constructing any
/// variant is a signal to the pipeline driver to abort and roll back the
/// enclosing transaction; no updater ever partially commits around one of
/// these.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Payload violates the grammar, placeholder rules, or a size limit
    /// that's knowable from the document itself. Maps to HTTP 400.
    #[error("Bad Request: {0}")]
    BadRequest(String),

    /// The changeset or a referenced existing element is absent. Maps to
    /// HTTP 404.
    #[error("Not Found: {0}")]
    NotFound(String),

    /// Changeset ownership mismatch, closed, locked, version mismatch, or
    /// over element limit. Maps to HTTP 409.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Attempt to delete an already-deleted element without `if-unused`.
    /// Maps to HTTP 410.
    #[error("Gone: {0}")]
    Gone(String),

    /// Referential integrity violation without `if-unused`: a referenced
    /// element is missing/invisible on create, or a referenced-elsewhere
    /// element was targeted for delete. Maps to HTTP 412.
    #[error("Precondition Failed: {0}")]
    PreconditionFailed(String),

    /// Upload exceeds `payload_max_size` or the configured bbox-size limit.
    /// Maps to HTTP 413.
    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    /// Unsupported content-encoding on the upload body. Maps to HTTP 415.
    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    /// Rate-limiter rejection. `retry_after_secs` is the interval a client
    /// should wait before retrying. Maps to HTTP 429.
    #[error("Bandwidth Limit Exceeded, retry after {retry_after_secs}s")]
    BandwidthLimitExceeded {
        /// Seconds the client should wait before retrying.
        retry_after_secs: u64,
    },

    /// An invariant the pipeline assumes was violated at runtime (e.g. an
    /// expected-unique row missing after an insert). Never caused by
    /// client input. Maps to HTTP 500.
    #[error("Server Error: {0}")]
    ServerError(String),
}

impl ApiError {
    /// Short machine-readable name for the variant, useful for logging and
    /// for tests that assert on the error kind without matching the full
    /// message text.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Gone(_) => "Gone",
            ApiError::PreconditionFailed(_) => "PreconditionFailed",
            ApiError::PayloadTooLarge(_) => "PayloadTooLarge",
            ApiError::UnsupportedMediaType(_) => "UnsupportedMediaType",
            ApiError::BandwidthLimitExceeded { .. } => "BandwidthLimitExceeded",
            ApiError::ServerError(_) => "ServerError",
        }
    }
}
