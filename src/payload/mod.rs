//! OsmChange payload parsing and validation (spec §4.1).

mod validate;
mod xml;

pub use validate::{MAX_TAG_STRING_LEN, validate_operation};
pub use xml::parse_osm_change;
