//! Tunable limits for the upload pipeline (spec §6).
//!
//! `Config` is constructed once at startup and threaded by reference into
//! the pipeline driver and every updater; nothing here is mutated after
//! construction (spec §9 "Global configuration").

use time::Duration;

/// Tunable limits for the upload pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Max decompressed upload bytes.
    pub payload_max_size: u32,
    /// Max operations per changeset.
    pub changeset_max_elements: u32,
    /// Absolute lifespan cap for a changeset (`closed_at - created_at`).
    pub changeset_timeout_open_max: Duration,
    /// Extension of `closed_at` granted per edit.
    pub changeset_timeout_idle: Duration,
    /// Max node references per way.
    pub way_max_nodes: u32,
    /// Max members per relation. `None` means unlimited.
    pub relation_max_members: Option<u32>,
    /// Max tags per element. `None` means unlimited.
    pub element_max_tags: Option<u32>,
    /// Coordinate multiplier used to convert decimal degrees to the
    /// integer representation stored on disk.
    pub scale: i64,
    /// Per-second byte refill rate for a regular user's token bucket.
    pub ratelimit_bytes_per_second: u32,
    /// Per-second byte refill rate for a moderator's token bucket.
    pub ratelimit_bytes_per_second_moderator: u32,
    /// Maximum burst debt for a regular user.
    pub ratelimit_max_debt: u64,
    /// Maximum burst debt for a moderator.
    pub ratelimit_max_debt_moderator: u64,
    /// Whether the rate limiter is consulted before uploads.
    pub ratelimiter_upload: bool,
    /// Whether the bbox-size limiter is consulted before uploads.
    pub bbox_size_limiter_upload: bool,
    /// Max bbox area (square degrees) a single user's uploads may expand
    /// a changeset to, when `bbox_size_limiter_upload` is enabled.
    pub map_area_max: f64,
}

impl Default for Config {
    /// Defaults exactly matching spec §6's table.
    fn default() -> Self {
        Self {
            payload_max_size: 50_000_000,
            changeset_max_elements: 10_000,
            changeset_timeout_open_max: Duration::days(1),
            changeset_timeout_idle: Duration::hours(1),
            way_max_nodes: 2_000,
            relation_max_members: None,
            element_max_tags: None,
            scale: 10_000_000,
            ratelimit_bytes_per_second: 100 * 1024,
            ratelimit_bytes_per_second_moderator: 1024 * 1024,
            ratelimit_max_debt: 250 * 1024 * 1024,
            ratelimit_max_debt_moderator: 1024 * 1024 * 1024,
            ratelimiter_upload: false,
            bbox_size_limiter_upload: false,
            map_area_max: 0.25,
        }
    }
}

impl Config {
    /// A stricter preset suited to small test fixtures: tight changeset
    /// and way limits so scenario tests can exercise the limit paths
    /// without uploading thousands of elements.
    pub fn for_tests() -> Self {
        Self {
            changeset_max_elements: 10_000,
            way_max_nodes: 2_000,
            ..Self::default()
        }
    }
}
