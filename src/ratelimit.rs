//! Per-user byte-budget rate limiting (spec §5 "Bandwidth admission").
//!
//! A token bucket keyed by user id: every accepted upload debits its byte
//! size immediately and the debt drains at a fixed per-second rate.
//! Moderators get a larger rate and a larger allowed debt. This is
//! deliberately the simplest implementation of the policy, not a general
//! leaky-bucket library - cgimap's own rate limiter is exactly this shape,
//! backed by memcached instead of an in-process map.

use std::collections::HashMap;

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::config::Config;
use crate::context::RequestContext;
use crate::error::{ApiError, Result};

struct Bucket {
    debt_bytes: u64,
    last_update: OffsetDateTime,
}

/// Consulted once per upload before the payload is parsed (spec §5).
pub trait RateLimiter {
    /// Checks whether `ctx` may spend `bytes` now, and if so records the
    /// spend. Fails with [`ApiError::BandwidthLimitExceeded`] otherwise.
    fn check_and_consume(&self, ctx: &RequestContext, bytes: u64, now: OffsetDateTime) -> Result<()>;
}

/// An in-process, per-user token bucket. Not shared across server
/// instances - fine for this crate's scope (spec §1 explicitly places
/// distributed rate-limit coordination out of scope).
pub struct InMemoryRateLimiter<'c> {
    config: &'c Config,
    buckets: Mutex<HashMap<u64, Bucket>>,
}

impl<'c> InMemoryRateLimiter<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for InMemoryRateLimiter<'_> {
    fn check_and_consume(&self, ctx: &RequestContext, bytes: u64, now: OffsetDateTime) -> Result<()> {
        let (rate, max_debt) = if ctx.is_moderator {
            (
                self.config.ratelimit_bytes_per_second_moderator as u64,
                self.config.ratelimit_max_debt_moderator,
            )
        } else {
            (
                self.config.ratelimit_bytes_per_second as u64,
                self.config.ratelimit_max_debt,
            )
        };

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(ctx.user_id).or_insert_with(|| Bucket {
            debt_bytes: 0,
            last_update: now,
        });

        let elapsed = (now - bucket.last_update).whole_seconds().max(0) as u64;
        let drained = elapsed.saturating_mul(rate);
        bucket.debt_bytes = bucket.debt_bytes.saturating_sub(drained);
        bucket.last_update = now;

        // spec §5: an *already* over-debt user is rejected outright, with
        // `retry_after = (current_debt - max_debt) / refill_rate + 1`
        // (plain integer division). A user at or under their debt ceiling
        // is admitted even if this request's bytes push them over it -
        // the overage is what the next request will be rejected against,
        // mirroring "bytes consumed by the response are added to the
        // bucket when the response body is flushed".
        if bucket.debt_bytes > max_debt {
            let overage = bucket.debt_bytes - max_debt;
            let retry_after_secs = overage / rate.max(1) + 1;
            return Err(ApiError::BandwidthLimitExceeded { retry_after_secs });
        }

        bucket.debt_bytes += bytes;
        Ok(())
    }
}

/// Checks the combined bbox a changeset would reach after absorbing
/// `delta` against `map_area_max` (spec §5 "Bbox admission"). Only
/// consulted when `Config::bbox_size_limiter_upload` is set.
pub fn check_bbox_area(config: &Config, combined: crate::model::BBox) -> Result<()> {
    if !config.bbox_size_limiter_upload {
        return Ok(());
    }
    let Some(b) = combined.bounds else { return Ok(()) };
    let scale = config.scale as f64;
    let width = (b.max_lon - b.min_lon) as f64 / scale;
    let height = (b.max_lat - b.min_lat) as f64 / scale;
    let area = width * height;
    if area > config.map_area_max {
        return Err(ApiError::PayloadTooLarge(format!(
            "The maximum bbox size is {}, and your uploaded area is {area}",
            config.map_area_max
        )));
    }
    Ok(())
}
