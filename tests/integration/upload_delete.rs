//! Properties P4/P5 and scenarios S4/S6: delete operations honor
//! `if_unused` and referential integrity.

use std::collections::BTreeMap;

use changeset_engine::changeset::ChangesetUpdater;
use changeset_engine::context::RequestContext;
use changeset_engine::diff::DiffOutcome;
use changeset_engine::pipeline::upload;
use changeset_engine::{Config, Store};
use time::OffsetDateTime;

fn now() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
}

fn new_changeset(store: &Store, config: &Config, ctx: RequestContext) -> u64 {
    ChangesetUpdater::create(store, config, ctx, BTreeMap::new(), now())
}

#[test]
fn p4_plain_delete_makes_invisible_and_bumps_version() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let create_xml = br#"<osmChange version="0.6"><create><node id="-1" lat="1" lon="1"/></create></osmChange>"#;
    let created = upload(&store, &config, ctx, cs_id, create_xml, now(), None).unwrap();
    let node_id = created.diff[0].new_id().unwrap();

    let delete_xml =
        format!(r#"<osmChange version="0.6"><delete><node id="{node_id}" version="1"/></delete></osmChange>"#);
    let result = upload(&store, &config, ctx, cs_id, delete_xml.as_bytes(), now(), None).unwrap();

    match result.diff[0].outcome {
        DiffOutcome::Deleted => {}
        other => panic!("expected Deleted, got {other:?}"),
    }
    let node = store.get_node(node_id).unwrap();
    assert!(!node.visible);
    assert_eq!(node.version, 2);
}

#[test]
fn s4_delete_referenced_node_without_if_unused_fails() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let create_xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1" lon="1"/>
            <node id="-2" lat="2" lon="2"/>
            <way id="-3"><nd ref="-1"/><nd ref="-2"/></way>
        </create>
    </osmChange>"#;
    let created = upload(&store, &config, ctx, cs_id, create_xml, now(), None).unwrap();
    let node_id = created.diff[0].new_id().unwrap();

    let delete_xml =
        format!(r#"<osmChange version="0.6"><delete><node id="{node_id}" version="1"/></delete></osmChange>"#);
    let err = upload(&store, &config, ctx, cs_id, delete_xml.as_bytes(), now(), None).unwrap_err();
    assert_eq!(err.kind(), "PreconditionFailed");

    let node = store.get_node(node_id).unwrap();
    assert!(node.visible, "a rejected delete must not touch the node");
    assert_eq!(node.version, 1);
}

#[test]
fn p5_delete_referenced_node_with_if_unused_is_skipped_without_writing() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let create_xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1" lon="1"/>
            <node id="-2" lat="2" lon="2"/>
            <way id="-3"><nd ref="-1"/><nd ref="-2"/></way>
        </create>
    </osmChange>"#;
    let created = upload(&store, &config, ctx, cs_id, create_xml, now(), None).unwrap();
    let node_id = created.diff[0].new_id().unwrap();

    let delete_xml = format!(
        r#"<osmChange version="0.6"><delete if-unused="true"><node id="{node_id}" version="1"/></delete></osmChange>"#
    );
    let result = upload(&store, &config, ctx, cs_id, delete_xml.as_bytes(), now(), None).unwrap();

    match result.diff[0].outcome {
        DiffOutcome::Skipped { new_id, current_version } => {
            assert_eq!(new_id, node_id);
            assert_eq!(current_version, 1);
        }
        other => panic!("expected Skipped, got {other:?}"),
    }
    let node = store.get_node(node_id).unwrap();
    assert!(node.visible, "a skipped delete must not touch the node");
    assert_eq!(node.version, 1);
}

#[test]
fn s6_create_then_delete_same_placeholder_in_one_upload() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create><node id="-1" lat="1" lon="1"/></create>
        <delete><node id="-1" version="1"/></delete>
    </osmChange>"#;
    let result = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap();
    assert_eq!(result.diff.len(), 2);

    let node_id = result.diff[0].new_id().unwrap();
    match result.diff[1].outcome {
        DiffOutcome::Deleted => {}
        other => panic!("expected Deleted, got {other:?}"),
    }

    let node = store.get_node(node_id).unwrap();
    assert!(!node.visible);
    assert_eq!(node.version, 2);
}

#[test]
fn deleting_an_already_deleted_node_fails_with_gone() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let create_xml = br#"<osmChange version="0.6"><create><node id="-1" lat="1" lon="1"/></create></osmChange>"#;
    let created = upload(&store, &config, ctx, cs_id, create_xml, now(), None).unwrap();
    let node_id = created.diff[0].new_id().unwrap();

    let delete_xml =
        format!(r#"<osmChange version="0.6"><delete><node id="{node_id}" version="1"/></delete></osmChange>"#);
    upload(&store, &config, ctx, cs_id, delete_xml.as_bytes(), now(), None).unwrap();

    let delete_again =
        format!(r#"<osmChange version="0.6"><delete><node id="{node_id}" version="2"/></delete></osmChange>"#);
    let err = upload(&store, &config, ctx, cs_id, delete_again.as_bytes(), now(), None).unwrap_err();
    assert_eq!(err.kind(), "Gone");
}
