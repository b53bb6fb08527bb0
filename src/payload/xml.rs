//! Streaming OsmChange XML parser.
//!
//! Built on `quick-xml`'s pull-parser event loop rather than serde
//! deserialization, since the document structure (child `tag`/`nd`/
//! `member` elements, optional attributes with OSM-specific defaulting)
//! doesn't map cleanly onto `#[derive(Deserialize)]`. Mirrors the shape of
//! cgimap's `changeset_input_format`: one pass over the document, elements
//! staged into `Operation`s tagged with their position in document order.

use std::collections::BTreeMap;
use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ApiError, Result};
use crate::model::{ElementRef, Kind, LatLon, MemberKind, NodePayload, Operation, Payload, RelationPayload, Tags, WayPayload};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Block {
    Create,
    Modify,
    Delete,
}

/// Parses a complete `<osmChange>` document into operations, in document
/// order. `max_size` bounds the decompressed byte length (spec §5
/// "Payload admission").
pub fn parse_osm_change(xml: &[u8], max_size: u32) -> Result<Vec<Operation>> {
    if xml.len() as u64 > max_size as u64 {
        return Err(ApiError::PayloadTooLarge(format!(
            "Upload payload of {} bytes exceeds the maximum of {max_size}",
            xml.len()
        )));
    }

    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut block: Option<Block> = None;
    let mut block_if_unused = false;
    let mut index = 0usize;
    let mut ops = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Eof => break,
            Event::Start(e) => match local_name(&e).as_slice() {
                b"create" => block = Some(Block::Create),
                b"modify" => block = Some(Block::Modify),
                b"delete" => {
                    block = Some(Block::Delete);
                    block_if_unused = has_attr(&e, "if-unused");
                }
                b"node" => {
                    let op = parse_node(&mut reader, &e, block.required()?, block_if_unused, index)?;
                    ops.push(op);
                    index += 1;
                }
                b"way" => {
                    let op = parse_way(&mut reader, &e, block.required()?, block_if_unused, index)?;
                    ops.push(op);
                    index += 1;
                }
                b"relation" => {
                    let op = parse_relation(&mut reader, &e, block.required()?, block_if_unused, index)?;
                    ops.push(op);
                    index += 1;
                }
                _ => {}
            },
            Event::Empty(e) => match local_name(&e).as_slice() {
                b"node" => {
                    let op = parse_empty_node(&e, block.required()?, block_if_unused, index)?;
                    ops.push(op);
                    index += 1;
                }
                b"way" => {
                    let op = build_way(&e, Vec::new(), Tags::new(), block.required()?, block_if_unused, index)?;
                    ops.push(op);
                    index += 1;
                }
                b"relation" => {
                    let op = build_relation(&e, Vec::new(), Tags::new(), block.required()?, block_if_unused, index)?;
                    ops.push(op);
                    index += 1;
                }
                _ => {}
            },
            Event::End(e) => match local_name(&e).as_slice() {
                b"create" | b"modify" | b"delete" => block = None,
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    Ok(ops)
}

trait RequiredBlock {
    fn required(self) -> Result<Block>;
}

impl RequiredBlock for Option<Block> {
    fn required(self) -> Result<Block> {
        self.ok_or_else(|| ApiError::BadRequest("Element outside of create/modify/delete block".to_string()))
    }
}

fn xml_err(e: quick_xml::Error) -> ApiError {
    ApiError::BadRequest(format!("Malformed OsmChange document: {e}"))
}

fn local_name(e: &BytesStart) -> Vec<u8> {
    e.local_name().as_ref().to_vec()
}

fn has_attr(e: &BytesStart, name: &str) -> bool {
    e.attributes().flatten().any(|a| a.key.as_ref() == name.as_bytes())
}

fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .map(|a| a.unescape_value().unwrap_or_default().into_owned())
}

fn require_attr(e: &BytesStart, name: &str, element: &str) -> Result<String> {
    attr(e, name).ok_or_else(|| ApiError::BadRequest(format!("{element} is missing required attribute '{name}'")))
}

fn parse_id(e: &BytesStart, element: &str) -> Result<ElementRef> {
    let raw = require_attr(e, "id", element)?;
    let id: i64 = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("{element} has a non-numeric id '{raw}'")))?;
    Ok(ElementRef::from_signed(id))
}

fn parse_version(e: &BytesStart, element: &str, required: bool) -> Result<u32> {
    match attr(e, "version") {
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("{element} has a non-numeric version '{raw}'"))),
        None if required => Err(ApiError::BadRequest(format!(
            "{element} is missing required attribute 'version'"
        ))),
        None => Ok(0),
    }
}

fn parse_lat_lon(e: &BytesStart) -> Result<LatLon> {
    let lat_raw = require_attr(e, "lat", "node")?;
    let lon_raw = require_attr(e, "lon", "node")?;
    let lat: f64 = lat_raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("node has a non-numeric lat '{lat_raw}'")))?;
    let lon: f64 = lon_raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("node has a non-numeric lon '{lon_raw}'")))?;
    Ok(LatLon { lat, lon })
}

fn element_if_unused(e: &BytesStart, block: Block, block_default: bool) -> bool {
    if block != Block::Delete {
        return false;
    }
    has_attr(e, "if-unused") || block_default
}

fn parse_empty_node(e: &BytesStart, block: Block, block_default: bool, index: usize) -> Result<Operation> {
    build_node(e, Tags::new(), block, block_default, index)
}

fn parse_node<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart,
    block: Block,
    block_default: bool,
    index: usize,
) -> Result<Operation> {
    let tags = read_tags(reader, b"node")?;
    build_node(start, tags, block, block_default, index)
}

fn build_node(e: &BytesStart, tags: Tags, block: Block, block_default: bool, index: usize) -> Result<Operation> {
    let id = parse_id(e, "node")?;
    match block {
        Block::Create => {
            let ElementRef::Placeholder(placeholder_id) = id else {
                return Err(ApiError::BadRequest(
                    "Created elements must use a negative placeholder id".to_string(),
                ));
            };
            let position = parse_lat_lon(e)?;
            Ok(Operation::Create {
                index,
                placeholder_id,
                payload: Payload::Node(NodePayload { position, tags }),
            })
        }
        Block::Modify => {
            let version = parse_version(e, "node", true)?;
            let position = parse_lat_lon(e)?;
            Ok(Operation::Modify {
                index,
                id,
                version,
                payload: Payload::Node(NodePayload { position, tags }),
            })
        }
        Block::Delete => {
            let version = parse_version(e, "node", true)?;
            Ok(Operation::Delete {
                index,
                kind: Kind::Node,
                id,
                version,
                if_unused: element_if_unused(e, block, block_default),
            })
        }
    }
}

fn parse_way<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart,
    block: Block,
    block_default: bool,
    index: usize,
) -> Result<Operation> {
    let mut nodes = Vec::new();
    let mut tags = Tags::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Empty(e) => match local_name(&e).as_slice() {
                b"nd" => {
                    let raw = require_attr(&e, "ref", "way nd")?;
                    let id: i64 = raw
                        .parse()
                        .map_err(|_| ApiError::BadRequest(format!("way nd has a non-numeric ref '{raw}'")))?;
                    nodes.push(ElementRef::from_signed(id));
                }
                b"tag" => insert_tag(&e, &mut tags)?,
                _ => {}
            },
            Event::End(e) if local_name(&e).as_slice() == b"way" => break,
            Event::Eof => return Err(ApiError::BadRequest("Unexpected end of document inside way".to_string())),
            _ => {}
        }
        buf.clear();
    }
    build_way(start, nodes, tags, block, block_default, index)
}

fn build_way(
    e: &BytesStart,
    nodes: Vec<ElementRef>,
    tags: Tags,
    block: Block,
    block_default: bool,
    index: usize,
) -> Result<Operation> {
    let id = parse_id(e, "way")?;
    match block {
        Block::Create => {
            let ElementRef::Placeholder(placeholder_id) = id else {
                return Err(ApiError::BadRequest(
                    "Created elements must use a negative placeholder id".to_string(),
                ));
            };
            Ok(Operation::Create {
                index,
                placeholder_id,
                payload: Payload::Way(WayPayload { nodes, tags }),
            })
        }
        Block::Modify => {
            let version = parse_version(e, "way", true)?;
            Ok(Operation::Modify {
                index,
                id,
                version,
                payload: Payload::Way(WayPayload { nodes, tags }),
            })
        }
        Block::Delete => {
            let version = parse_version(e, "way", true)?;
            Ok(Operation::Delete {
                index,
                kind: Kind::Way,
                id,
                version,
                if_unused: element_if_unused(e, block, block_default),
            })
        }
    }
}

fn parse_relation<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart,
    block: Block,
    block_default: bool,
    index: usize,
) -> Result<Operation> {
    let mut members = Vec::new();
    let mut tags = Tags::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Empty(e) => match local_name(&e).as_slice() {
                b"member" => members.push(parse_member(&e)?),
                b"tag" => insert_tag(&e, &mut tags)?,
                _ => {}
            },
            Event::End(e) if local_name(&e).as_slice() == b"relation" => break,
            Event::Eof => {
                return Err(ApiError::BadRequest(
                    "Unexpected end of document inside relation".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    build_relation(start, members, tags, block, block_default, index)
}

fn parse_member(e: &BytesStart) -> Result<(MemberKind, ElementRef, String)> {
    let type_raw = require_attr(e, "type", "relation member")?;
    let member_type = match type_raw.as_str() {
        "node" => MemberKind::Node,
        "way" => MemberKind::Way,
        "relation" => MemberKind::Relation,
        other => {
            return Err(ApiError::BadRequest(format!(
                "relation member has an unknown type '{other}'"
            )))
        }
    };
    let ref_raw = require_attr(e, "ref", "relation member")?;
    let id: i64 = ref_raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("relation member has a non-numeric ref '{ref_raw}'")))?;
    let role = attr(e, "role").unwrap_or_default();
    Ok((member_type, ElementRef::from_signed(id), role))
}

fn build_relation(
    e: &BytesStart,
    members: Vec<(MemberKind, ElementRef, String)>,
    tags: Tags,
    block: Block,
    block_default: bool,
    index: usize,
) -> Result<Operation> {
    let id = parse_id(e, "relation")?;
    match block {
        Block::Create => {
            let ElementRef::Placeholder(placeholder_id) = id else {
                return Err(ApiError::BadRequest(
                    "Created elements must use a negative placeholder id".to_string(),
                ));
            };
            Ok(Operation::Create {
                index,
                placeholder_id,
                payload: Payload::Relation(RelationPayload { members, tags }),
            })
        }
        Block::Modify => {
            let version = parse_version(e, "relation", true)?;
            Ok(Operation::Modify {
                index,
                id,
                version,
                payload: Payload::Relation(RelationPayload { members, tags }),
            })
        }
        Block::Delete => {
            let version = parse_version(e, "relation", true)?;
            Ok(Operation::Delete {
                index,
                kind: Kind::Relation,
                id,
                version,
                if_unused: element_if_unused(e, block, block_default),
            })
        }
    }
}

fn read_tags<R: BufRead>(reader: &mut Reader<R>, end_name: &[u8]) -> Result<Tags> {
    let mut tags = Tags::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Empty(e) if local_name(&e).as_slice() == b"tag" => insert_tag(&e, &mut tags)?,
            Event::End(e) if local_name(&e) == end_name => break,
            Event::Eof => return Err(ApiError::BadRequest("Unexpected end of document inside element".to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(tags)
}

fn insert_tag(e: &BytesStart, tags: &mut BTreeMap<String, String>) -> Result<()> {
    let k = require_attr(e, "k", "tag")?;
    let v = attr(e, "v").unwrap_or_default();
    if tags.insert(k.clone(), v).is_some() {
        return Err(ApiError::BadRequest(format!("Duplicate tag key '{k}'")));
    }
    Ok(())
}
