//! Pipeline-level placeholder resolution: duplicate ids, unresolved
//! references, cross-kind independence, and create-then-modify of the
//! same placeholder within one upload (resolved in DESIGN.md).

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
fn duplicate_placeholder_within_a_kind_is_rejected() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1" lon="1"/>
            <node id="-1" lat="2" lon="2"/>
        </create>
    </osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");

    let cs = store.get_changeset(cs_id).unwrap();
    assert_eq!(cs.num_changes, 0);
}

#[test]
fn way_referencing_unknown_placeholder_fails() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <way id="-1"><nd ref="-99"/></way>
        </create>
    </osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");
}

#[test]
fn same_placeholder_value_is_independent_across_kinds() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1" lon="1"/>
            <way id="-1"><nd ref="-1"/></way>
        </create>
    </osmChange>"#;
    let result = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap();
    let node_id = result.diff[0].new_id().unwrap();
    let way_id = result.diff[1].new_id().unwrap();
    assert_ne!(node_id, way_id);

    let way = store.get_way(way_id).unwrap();
    assert_eq!(way.nodes[0].node_id, node_id);
}

#[test]
fn modify_referencing_a_placeholder_created_earlier_resolves_to_fresh_id() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create><node id="-1" lat="1" lon="1"/></create>
        <modify><node id="-1" version="1" lat="5" lon="5"/></modify>
    </osmChange>"#;
    let result = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap();

    let created_id = result.diff[0].new_id().unwrap();
    match result.diff[1].outcome {
        DiffOutcome::Modified { new_id, new_version } => {
            assert_eq!(new_id, created_id);
            assert_eq!(new_version, 2);
        }
        other => panic!("expected Modified, got {other:?}"),
    }

    let node = store.get_node(created_id).unwrap();
    assert_eq!(node.lat, 50_000_000);
    assert_eq!(node.version, 2);
}

#[test]
fn relation_can_reference_a_way_placeholder_from_the_same_upload() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1" lon="1"/>
            <way id="-2"><nd ref="-1"/></way>
            <relation id="-3"><member type="way" ref="-2" role="outer"/></relation>
        </create>
    </osmChange>"#;
    let result = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap();
    let way_id = result.diff[1].new_id().unwrap();
    let rel_id = result.diff[2].new_id().unwrap();

    let relation = store.get_relation(rel_id).unwrap();
    assert_eq!(relation.members[0].member_id, way_id);
}
