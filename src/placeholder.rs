//! Maps client-assigned placeholder ids to server-assigned ids within one
//! upload (spec §4.2).

use std::collections::HashMap;

use crate::error::{ApiError, Result};
use crate::model::{ElementRef, Kind, OsmId, PlaceholderId};

/// Three disjoint maps, one per element kind, from placeholder id to
/// server id. Scoped to a single upload and discarded afterward.
#[derive(Default)]
pub struct PlaceholderResolver {
    nodes: HashMap<PlaceholderId, OsmId>,
    ways: HashMap<PlaceholderId, OsmId>,
    relations: HashMap<PlaceholderId, OsmId>,
}

impl PlaceholderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn map_mut(&mut self, kind: Kind) -> &mut HashMap<PlaceholderId, OsmId> {
        match kind {
            Kind::Node => &mut self.nodes,
            Kind::Way => &mut self.ways,
            Kind::Relation => &mut self.relations,
        }
    }

    fn map(&self, kind: Kind) -> &HashMap<PlaceholderId, OsmId> {
        match kind {
            Kind::Node => &self.nodes,
            Kind::Way => &self.ways,
            Kind::Relation => &self.relations,
        }
    }

    /// Registers a freshly assigned id for a placeholder. Fails if the
    /// placeholder was already registered for this kind (spec §4.2: "the
    /// same placeholder id twice within the same kind").
    pub fn register(&mut self, kind: Kind, placeholder_id: PlaceholderId, new_id: OsmId) -> Result<()> {
        if self.map_mut(kind).insert(placeholder_id, new_id).is_some() {
            return Err(ApiError::BadRequest(
                "Placeholder IDs must be unique for created elements".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves an [`ElementRef`], looking up the placeholder map for
    /// `kind` if it's unresolved. Fails with [`ApiError::BadRequest`] if
    /// the placeholder was never registered.
    pub fn resolve(&self, kind: Kind, reference: ElementRef) -> Result<OsmId> {
        match reference {
            ElementRef::Id(id) => Ok(id),
            ElementRef::Placeholder(p) => self.map(kind).get(&p).copied().ok_or_else(|| {
                ApiError::BadRequest(format!("Placeholder not found for {kind} reference {p}"))
            }),
        }
    }
}
