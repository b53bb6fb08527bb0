//! Transactional changeset upload pipeline for an OSM-style editing API.
//!
//! This crate implements the core of an editing API's bulk-mutation
//! endpoint: given an authenticated user, a target changeset, and an
//! OsmChange document, it applies every create/modify/delete in order,
//! enforcing placeholder-id resolution, optimistic concurrency, per-
//! changeset/per-user quotas, and referential integrity between nodes,
//! ways, and relations - then reports a diff-result mapping client ids to
//! server-assigned ids and versions.
//!
//! The HTTP/FastCGI transport, authentication, and the read-side query API
//! are all out of scope; [`pipeline::upload`] is the single entry point a
//! transport layer calls once it has authenticated a request and extracted
//! the target changeset id and request body.
//!
//! # Layout
//!
//! - [`model`] - the element/changeset/operation data model.
//! - [`tile`] - the spatial index function shared by node writes.
//! - [`config`] - tunable limits (`Config`).
//! - [`context`] - the authenticated caller (`RequestContext`).
//! - [`error`] - the crate-wide error taxonomy (`ApiError`).
//! - [`store`] - the in-memory transactional store and its row-lock
//!   discipline.
//! - [`placeholder`] - client placeholder-id resolution, scoped to one
//!   upload.
//! - [`changeset`] - changeset admission, bbox/quota bookkeeping.
//! - [`updater`] - the node/way/relation updaters.
//! - [`payload`] - OsmChange XML parsing and structural validation.
//! - [`diff`] - the diff-result accumulator and XML/JSON rendering.
//! - [`ratelimit`] - per-user bandwidth admission and bbox-size admission.
//! - [`pipeline`] - the driver tying all of the above together.
//! - [`logging`] - `tracing` subscriber setup for binaries.

pub mod changeset;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod logging;
pub mod model;
pub mod payload;
pub mod pipeline;
pub mod placeholder;
pub mod ratelimit;
pub mod store;
pub mod tile;
pub mod updater;

pub use config::Config;
pub use context::RequestContext;
pub use error::{ApiError, Result};
pub use pipeline::{upload, UploadResult};
pub use store::Store;
