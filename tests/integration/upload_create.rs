//! Scenario S1/S2 and property P2: create operations assign fresh ids,
//! version 1, and the changeset's bbox/count reflect exactly the created
//! elements.

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
fn s1_single_node_create_sets_bbox_and_count() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1.0" lon="2.0" changeset="1"/>
        </create>
    </osmChange>"#;

    let result = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap();
    assert_eq!(result.diff.len(), 1);

    let entry = &result.diff[0];
    let new_id = match entry.outcome {
        DiffOutcome::Created { new_id, new_version } => {
            assert_eq!(new_version, 1);
            new_id
        }
        other => panic!("expected Created, got {other:?}"),
    };

    let node = store.get_node(new_id).unwrap();
    assert_eq!(node.lat, 10_000_000);
    assert_eq!(node.lon, 20_000_000);
    assert!(node.visible);

    let cs = store.get_changeset(cs_id).unwrap();
    assert_eq!(cs.num_changes, 1);
    let bounds = cs.bbox.bounds.unwrap();
    assert_eq!((bounds.min_lat, bounds.min_lon), (10_000_000, 20_000_000));
    assert_eq!((bounds.max_lat, bounds.max_lon), (10_000_000, 20_000_000));
}

#[test]
fn s2_way_node_list_carries_assigned_id_with_sequence() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="0" lon="0"/>
            <way id="-2"><nd ref="-1"/></way>
        </create>
    </osmChange>"#;

    let result = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap();
    let node_id = result.diff[0].new_id().unwrap();
    let way_id = result.diff[1].new_id().unwrap();

    let way = store.get_way(way_id).unwrap();
    assert_eq!(way.nodes.len(), 1);
    assert_eq!(way.nodes[0].node_id, node_id);
    assert_eq!(way.nodes[0].sequence_id, 1);
}

#[test]
fn create_node_way_and_relation_in_one_upload() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="10" lon="10"/>
            <node id="-2" lat="20" lon="20"/>
            <way id="-3"><nd ref="-1"/><nd ref="-2"/><tag k="highway" v="residential"/></way>
            <relation id="-4">
                <member type="way" ref="-3" role="outer"/>
                <tag k="type" v="multipolygon"/>
            </relation>
        </create>
    </osmChange>"#;

    let result = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap();
    assert_eq!(result.diff.len(), 4);
    for entry in &result.diff {
        matches!(entry.outcome, DiffOutcome::Created { new_version: 1, .. });
    }

    let way_id = result.diff[2].new_id().unwrap();
    let rel_id = result.diff[3].new_id().unwrap();
    let relation = store.get_relation(rel_id).unwrap();
    assert_eq!(relation.members[0].member_id, way_id);
    assert_eq!(relation.tags.get("type").unwrap(), "multipolygon");

    let cs = store.get_changeset(cs_id).unwrap();
    assert_eq!(cs.num_changes, 4);
}

#[test]
fn p2_created_node_round_trips_tags_exactly() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="48.8566" lon="2.3522">
                <tag k="name" v="Paris"/>
                <tag k="population" v="2148000"/>
            </node>
        </create>
    </osmChange>"#;

    let result = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap();
    let node_id = result.diff[0].new_id().unwrap();
    let node = store.get_node(node_id).unwrap();

    assert_eq!(node.tags.get("name").unwrap(), "Paris");
    assert_eq!(node.tags.get("population").unwrap(), "2148000");
    assert_eq!(node.tags.len(), 2);
}

#[test]
fn way_with_zero_nodes_is_rejected() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <way id="-1"/>
        </create>
    </osmChange>"#;

    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");

    let cs = store.get_changeset(cs_id).unwrap();
    assert_eq!(cs.num_changes, 0, "a rejected upload writes nothing");
}

#[test]
fn p6_a_later_phase_failure_rolls_back_an_earlier_phase_that_already_wrote() {
    // The node phase commits its create (and the changeset's bbox/count)
    // before the way phase ever runs; the way in this upload references a
    // node id that doesn't exist, so the way phase fails after the node
    // phase already wrote through. The whole upload must still leave the
    // store exactly as it found it (spec §5, P6) - not with an orphan node.
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1" lon="1"/>
            <way id="-2"><nd ref="9999999"/></way>
        </create>
    </osmChange>"#;

    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "PreconditionFailed");

    assert!(
        store.get_node(1).is_none(),
        "the node phase's write must be undone by the way phase's later failure"
    );
    let cs = store.get_changeset(cs_id).unwrap();
    assert_eq!(cs.num_changes, 0);
    assert!(cs.bbox.bounds.is_none());
}
