//! Property P10 and other §4.1 parser/validation rules exercised through
//! the full pipeline: malformed documents, tag/string limits, and
//! per-kind count limits.

use std::collections::BTreeMap;

use changeset_engine::changeset::ChangesetUpdater;
use changeset_engine::context::RequestContext;
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
fn p10_tag_value_over_255_chars_is_rejected() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let long_value = "x".repeat(256);
    let xml = format!(
        r#"<osmChange version="0.6"><create><node id="-1" lat="1" lon="1"><tag k="note" v="{long_value}"/></node></create></osmChange>"#
    );
    let err = upload(&store, &config, ctx, cs_id, xml.as_bytes(), now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");
}

#[test]
fn p10_tag_key_at_exactly_255_chars_is_accepted() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let key = "k".repeat(255);
    let xml = format!(
        r#"<osmChange version="0.6"><create><node id="-1" lat="1" lon="1"><tag k="{key}" v="ok"/></node></create></osmChange>"#
    );
    upload(&store, &config, ctx, cs_id, xml.as_bytes(), now(), None).unwrap();
}

#[test]
fn malformed_xml_is_rejected_as_bad_request() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6"><create><node id="-1" lat="1" lon="1"></osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");
}

#[test]
fn element_outside_any_block_is_rejected() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6"><node id="-1" lat="1" lon="1"/></osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");
}

#[test]
fn duplicate_tag_key_on_one_element_is_rejected() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1" lon="1">
                <tag k="name" v="a"/>
                <tag k="name" v="b"/>
            </node>
        </create>
    </osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");
}

#[test]
fn way_exceeding_way_max_nodes_is_rejected() {
    let store = Store::new();
    let mut config = Config::for_tests();
    config.way_max_nodes = 2;
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1" lon="1"/>
            <node id="-2" lat="2" lon="2"/>
            <node id="-3" lat="3" lon="3"/>
            <way id="-4"><nd ref="-1"/><nd ref="-2"/><nd ref="-3"/></way>
        </create>
    </osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");
}

#[test]
fn relation_exceeding_relation_max_members_is_rejected() {
    let store = Store::new();
    let mut config = Config::for_tests();
    config.relation_max_members = Some(1);
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1" lon="1"/>
            <node id="-2" lat="2" lon="2"/>
            <relation id="-3">
                <member type="node" ref="-1" role="a"/>
                <member type="node" ref="-2" role="b"/>
            </relation>
        </create>
    </osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");
}

#[test]
fn element_exceeding_element_max_tags_is_rejected() {
    let store = Store::new();
    let mut config = Config::for_tests();
    config.element_max_tags = Some(1);
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <node id="-1" lat="1" lon="1">
                <tag k="a" v="1"/>
                <tag k="b" v="2"/>
            </node>
        </create>
    </osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");
}

#[test]
fn relation_member_with_unknown_type_is_rejected() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let xml = br#"<osmChange version="0.6">
        <create>
            <relation id="-1"><member type="area" ref="5" role="x"/></relation>
        </create>
    </osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "BadRequest");
}
