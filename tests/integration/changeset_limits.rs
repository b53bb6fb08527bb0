//! Scenario S5 and changeset admission rules (§4.3): element quota,
//! closed-changeset rejection, ownership, and lifespan capping.

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
fn s5_upload_past_element_quota_is_rejected_and_writes_nothing() {
    let store = Store::new();
    let mut config = Config::for_tests();
    config.changeset_max_elements = 3;
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let mut xml = String::from(r#"<osmChange version="0.6"><create>"#);
    for i in 1..=4 {
        xml.push_str(&format!(r#"<node id="-{i}" lat="{i}" lon="{i}"/>"#));
    }
    xml.push_str("</create></osmChange>");

    let err = upload(&store, &config, ctx, cs_id, xml.as_bytes(), now(), None).unwrap_err();
    assert_eq!(err.kind(), "Conflict");

    // P6: a failed upload leaves the store exactly as it found it, even
    // though process_creates had already inserted every node row before
    // the quota check in update_bbox_and_count rejected the batch.
    let cs = store.get_changeset(cs_id).unwrap();
    assert_eq!(cs.num_changes, 0);
    assert!(store.get_node(1).is_none(), "rolled-back creates must not persist");
}

#[test]
fn upload_against_a_closed_changeset_is_rejected() {
    let store = Store::new();
    let config = Config::for_tests();
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    {
        let txn = store.begin();
        let mut updater = ChangesetUpdater::new(&txn, &config, ctx, cs_id);
        updater.lock_for_edit(now(), true).unwrap();
        updater.close(now()).unwrap();
        txn.commit();
    }

    let xml = br#"<osmChange version="0.6"><create><node id="-1" lat="1" lon="1"/></create></osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "Conflict");
}

#[test]
fn upload_against_another_users_changeset_is_rejected() {
    let store = Store::new();
    let config = Config::for_tests();
    let owner = RequestContext::user(1);
    let other = RequestContext::user(2);
    let cs_id = new_changeset(&store, &config, owner);

    let xml = br#"<osmChange version="0.6"><create><node id="-1" lat="1" lon="1"/></create></osmChange>"#;
    let err = upload(&store, &config, other, cs_id, xml, now(), None).unwrap_err();
    assert_eq!(err.kind(), "Conflict");
}

#[test]
fn closed_at_never_exceeds_the_open_max_lifespan() {
    let store = Store::new();
    let mut config = Config::for_tests();
    config.changeset_timeout_open_max = time::Duration::hours(1);
    config.changeset_timeout_idle = time::Duration::minutes(30);
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let created_at = store.get_changeset(cs_id).unwrap().created_at;
    let cap = created_at + config.changeset_timeout_open_max;

    let xml = br#"<osmChange version="0.6"><create><node id="-1" lat="1" lon="1"/></create></osmChange>"#;
    // each edit lands before the changeset's current closed_at, extending
    // it by the idle window, but never past the open-max cap.
    upload(&store, &config, ctx, cs_id, xml, now() + time::Duration::minutes(20), None).unwrap();
    upload(&store, &config, ctx, cs_id, xml, now() + time::Duration::minutes(45), None).unwrap();

    let cs = store.get_changeset(cs_id).unwrap();
    assert_eq!(cs.closed_at, cap, "closed_at must clip to the open-max cap once reached");
}

#[test]
fn successive_uploads_fill_the_quota_exactly_to_the_limit() {
    let store = Store::new();
    let mut config = Config::for_tests();
    config.changeset_max_elements = 2;
    let ctx = RequestContext::user(1);
    let cs_id = new_changeset(&store, &config, ctx);

    let one = br#"<osmChange version="0.6"><create><node id="-1" lat="1" lon="1"/></create></osmChange>"#;
    upload(&store, &config, ctx, cs_id, one, now(), None).unwrap();
    let two = br#"<osmChange version="0.6"><create><node id="-1" lat="2" lon="2"/></create></osmChange>"#;
    upload(&store, &config, ctx, cs_id, two, now(), None).unwrap();

    let three = br#"<osmChange version="0.6"><create><node id="-1" lat="3" lon="3"/></create></osmChange>"#;
    let err = upload(&store, &config, ctx, cs_id, three, now(), None).unwrap_err();
    assert_eq!(err.kind(), "Conflict");

    let cs = store.get_changeset(cs_id).unwrap();
    assert_eq!(cs.num_changes, 2);
}
