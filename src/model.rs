//! Data model for map elements.
//!
//! This module defines the core types the upload pipeline operates on:
//! nodes, ways, relations, changesets, and the tagged sum of upload
//! operations that the payload parser produces.
//!
//! # Key Types
//!
//! - [`Node`] / [`Way`] / [`Relation`] - the three element kinds.
//! - [`Operation`] - a single create/modify/delete instruction from the
//!   upload document.
//! - [`ElementRef`] - a reference to another element that may still be an
//!   unresolved client placeholder.
//! - [`BBox`] - the spatial envelope tracked per changeset.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Server-assigned identifier. Always positive once assigned.
pub type OsmId = u64;

/// Client-assigned identifier scoped to a single upload. Always negative.
pub type PlaceholderId = i64;

/// Per-element-identity version counter. Starts at 1 on create and
/// increases by exactly one on every successful modify or delete.
pub type Version = u32;

/// Tags are key/value string pairs, unique by key within one element.
pub type Tags = BTreeMap<String, String>;

/// Which of the three element kinds an operation or reference concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// A point.
    Node,
    /// An ordered sequence of node references.
    Way,
    /// An ordered sequence of typed, roled members.
    Relation,
}

impl Kind {
    /// Fixed processing order for creates: downstream kinds must see
    /// upstream kinds' freshly assigned ids (spec §4.6).
    pub const PROCESSING_ORDER: [Kind; 3] = [Kind::Node, Kind::Way, Kind::Relation];
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Node => "node",
            Kind::Way => "way",
            Kind::Relation => "relation",
        };
        f.write_str(s)
    }
}

/// A reference to another element, either already-resolved to a server id
/// or still a client placeholder awaiting resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRef {
    /// A concrete, already-known server id.
    Id(OsmId),
    /// A negative id scoped to the enclosing upload, not yet resolved.
    Placeholder(PlaceholderId),
}

impl ElementRef {
    /// Builds an `ElementRef` from a signed id per the OSM convention:
    /// negative is a placeholder, non-negative is a server id.
    pub fn from_signed(id: i64) -> Self {
        if id < 0 {
            ElementRef::Placeholder(id)
        } else {
            ElementRef::Id(id as OsmId)
        }
    }

    /// Returns the resolved server id, if this reference is already
    /// resolved.
    pub fn resolved(&self) -> Option<OsmId> {
        match self {
            ElementRef::Id(id) => Some(*id),
            ElementRef::Placeholder(_) => None,
        }
    }
}

/// Decimal-degree latitude/longitude, pre-scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    /// Latitude in decimal degrees, `-90..=90`.
    pub lat: f64,
    /// Longitude in decimal degrees, `-180..=180`.
    pub lon: f64,
}

/// A bounding box over integer-scaled coordinates (degrees * `scale`).
///
/// An empty `BBox` (the default) contributes nothing when unioned with
/// another box; it is the identity element for [`BBox::expand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BBox {
    /// Populated bounds, or `None` for an empty box.
    pub bounds: Option<BBoxBounds>,
}

/// Concrete bounds of a non-empty [`BBox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBoxBounds {
    /// Minimum scaled latitude.
    pub min_lat: i64,
    /// Minimum scaled longitude.
    pub min_lon: i64,
    /// Maximum scaled latitude.
    pub max_lat: i64,
    /// Maximum scaled longitude.
    pub max_lon: i64,
}

impl BBox {
    /// An empty bounding box, the identity element of [`BBox::expand`].
    pub const fn empty() -> Self {
        BBox { bounds: None }
    }

    /// A single-point bounding box at the given scaled coordinates.
    pub fn point(lat: i64, lon: i64) -> Self {
        BBox {
            bounds: Some(BBoxBounds {
                min_lat: lat,
                min_lon: lon,
                max_lat: lat,
                max_lon: lon,
            }),
        }
    }

    /// Expands this box in place to cover `other` as well.
    pub fn expand(&mut self, other: BBox) {
        let Some(ob) = other.bounds else { return };
        self.bounds = Some(match self.bounds {
            None => ob,
            Some(b) => BBoxBounds {
                min_lat: b.min_lat.min(ob.min_lat),
                min_lon: b.min_lon.min(ob.min_lon),
                max_lat: b.max_lat.max(ob.max_lat),
                max_lon: b.max_lon.max(ob.max_lon),
            },
        });
    }
}

/// A node: a single tagged point.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Server-assigned id.
    pub id: OsmId,
    /// Current version.
    pub version: Version,
    /// Scaled latitude (`degrees * scale`).
    pub lat: i64,
    /// Scaled longitude (`degrees * scale`).
    pub lon: i64,
    /// Morton-interleaved spatial index over `(lat, lon)`.
    pub tile: u64,
    /// Owning changeset.
    pub changeset: OsmId,
    /// `false` marks this row as a tombstone.
    pub visible: bool,
    /// Transaction wall-clock time of the last write.
    pub timestamp: time::OffsetDateTime,
    /// Tags, unique by key.
    pub tags: Tags,
}

/// A single entry in a way's ordered node-reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WayNode {
    /// The referenced node.
    pub node_id: OsmId,
    /// 1-based position within the way-version.
    pub sequence_id: u32,
}

/// A way: an ordered sequence of node references plus tags.
#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    /// Server-assigned id.
    pub id: OsmId,
    /// Current version.
    pub version: Version,
    /// Owning changeset.
    pub changeset: OsmId,
    /// `false` marks this row as a tombstone.
    pub visible: bool,
    /// Transaction wall-clock time of the last write.
    pub timestamp: time::OffsetDateTime,
    /// Ordered node references, 1-based `sequence_id`.
    pub nodes: Vec<WayNode>,
    /// Tags, unique by key.
    pub tags: Tags,
}

/// The kind of element a relation member points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberKind {
    /// A node member.
    Node,
    /// A way member.
    Way,
    /// A relation member (cycles permitted).
    Relation,
}

impl From<MemberKind> for Kind {
    fn from(mk: MemberKind) -> Self {
        match mk {
            MemberKind::Node => Kind::Node,
            MemberKind::Way => Kind::Way,
            MemberKind::Relation => Kind::Relation,
        }
    }
}

/// A single entry in a relation's ordered member list.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationMember {
    /// Which kind of element this member refers to.
    pub member_type: MemberKind,
    /// The referenced element's id.
    pub member_id: OsmId,
    /// Free-form role string (may be empty).
    pub role: String,
    /// 1-based position within the relation-version.
    pub sequence_id: u32,
}

/// A relation: an ordered sequence of typed, roled members plus tags.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// Server-assigned id.
    pub id: OsmId,
    /// Current version.
    pub version: Version,
    /// Owning changeset.
    pub changeset: OsmId,
    /// `false` marks this row as a tombstone.
    pub visible: bool,
    /// Transaction wall-clock time of the last write.
    pub timestamp: time::OffsetDateTime,
    /// Ordered members.
    pub members: Vec<RelationMember>,
    /// Tags, unique by key.
    pub tags: Tags,
}

/// Unresolved payload for a node create/modify, as produced by the parser
/// (before placeholder resolution and scaling have happened to the degree
/// the updater needs).
#[derive(Debug, Clone, PartialEq)]
pub struct NodePayload {
    /// Decimal-degree position.
    pub position: LatLon,
    /// Tags.
    pub tags: Tags,
}

/// Unresolved payload for a way create/modify.
#[derive(Debug, Clone, PartialEq)]
pub struct WayPayload {
    /// Ordered node references, possibly still placeholders.
    pub nodes: Vec<ElementRef>,
    /// Tags.
    pub tags: Tags,
}

/// Unresolved payload for a relation create/modify.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationPayload {
    /// Ordered members, possibly still placeholders.
    pub members: Vec<(MemberKind, ElementRef, String)>,
    /// Tags.
    pub tags: Tags,
}

/// Kind-specific payload carried by a create/modify operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Node payload.
    Node(NodePayload),
    /// Way payload.
    Way(WayPayload),
    /// Relation payload.
    Relation(RelationPayload),
}

impl Payload {
    /// The [`Kind`] this payload belongs to.
    pub fn kind(&self) -> Kind {
        match self {
            Payload::Node(_) => Kind::Node,
            Payload::Way(_) => Kind::Way,
            Payload::Relation(_) => Kind::Relation,
        }
    }
}

/// A single create/modify/delete instruction from the upload document,
/// tagged with its position in the input stream so the diff-result can be
/// emitted in the same order.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// A new element, identified within this upload by `placeholder_id`.
    Create {
        /// Position of this operation in the input stream.
        index: usize,
        /// Client-assigned negative id, unique per kind within the upload.
        placeholder_id: PlaceholderId,
        /// The new element's content.
        payload: Payload,
    },
    /// A modification of an existing element, guarded by optimistic
    /// concurrency on `version`.
    Modify {
        /// Position of this operation in the input stream.
        index: usize,
        /// The element's server id, or a placeholder created earlier in
        /// this same upload.
        id: ElementRef,
        /// The version the client last observed.
        version: Version,
        /// The element's new content.
        payload: Payload,
    },
    /// A deletion of an existing element, guarded by optimistic
    /// concurrency on `version`.
    Delete {
        /// Position of this operation in the input stream.
        index: usize,
        /// Which kind of element this deletes.
        kind: Kind,
        /// The element's server id, or a placeholder created earlier in
        /// this same upload.
        id: ElementRef,
        /// The version the client last observed.
        version: Version,
        /// If set, referential-integrity or already-deleted failures are
        /// converted into a skipped outcome instead of aborting the
        /// upload.
        if_unused: bool,
    },
}

impl Operation {
    /// Position of this operation in the original upload stream.
    pub fn index(&self) -> usize {
        match self {
            Operation::Create { index, .. }
            | Operation::Modify { index, .. }
            | Operation::Delete { index, .. } => *index,
        }
    }

    /// Which [`Kind`] this operation concerns.
    pub fn kind(&self) -> Kind {
        match self {
            Operation::Create { payload, .. } => payload.kind(),
            Operation::Modify { payload, .. } => payload.kind(),
            Operation::Delete { kind, .. } => *kind,
        }
    }
}

/// A single discussion comment attached to a changeset, append-only and
/// never written by the upload pipeline itself (changeset-discussion
/// endpoints are out of scope; only the storage shape is carried so the
/// data model matches the persisted-state layout in full).
#[derive(Debug, Clone, PartialEq)]
pub struct ChangesetComment {
    /// Author of the comment.
    pub author_id: OsmId,
    /// Comment body.
    pub body: String,
    /// When the comment was posted.
    pub created_at: time::OffsetDateTime,
}

/// A changeset: the atomicity and quota scope for a batch of element
/// edits.
#[derive(Debug, Clone, PartialEq)]
pub struct Changeset {
    /// Server-assigned id.
    pub id: OsmId,
    /// Owning user.
    pub user_id: OsmId,
    /// Creation time.
    pub created_at: time::OffsetDateTime,
    /// The time after which the changeset is considered closed.
    pub closed_at: time::OffsetDateTime,
    /// Spatial envelope of all node edits in this changeset, pre- and
    /// post-modification.
    pub bbox: BBox,
    /// Count of element operations applied so far.
    pub num_changes: u32,
    /// Changeset-level tags.
    pub tags: Tags,
    /// Discussion comments, in posting order. Always empty coming out of
    /// the upload pipeline.
    pub comments: Vec<ChangesetComment>,
}
