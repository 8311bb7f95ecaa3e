//! End-to-end trigger → select → acknowledge flows against the public API.

use std::sync::Arc;

use campaign_in_app::{
    CampaignCatalog, CampaignStatus, ContentRef, JsonFileStorage, ManualClock,
    MemoryAssetOracle, MemoryStorage, StateStorage,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn campaign(id: i64, random_order: bool, message_ids: &[&str]) -> Value {
    let messages: Vec<Value> = message_ids
        .iter()
        .map(|m| json!({ "id": m, "formats": [ { "orientation": "any", "image": format!("{m}.png") } ] }))
        .collect();
    json!({
        "id": id,
        "triggers": ["app_launch"],
        "start": 0,
        "end": 10_000,
        "throttle_delay": 0,
        "random_order": random_order,
        "messages": messages,
    })
}

fn catalog(oracle: &Arc<MemoryAssetOracle>, clock: &Arc<ManualClock>) -> CampaignCatalog {
    CampaignCatalog::new(Arc::new(MemoryStorage::new()), "/assets")
        .with_asset_oracle(oracle.clone())
        .with_clock(clock.clone())
}

fn selected_message_id(catalog: &CampaignCatalog) -> Option<String> {
    let selection = catalog.on_trigger("app_launch").selection?;
    match selection.content()? {
        ContentRef::Message(m) => Some(m.id.clone()),
        ContentRef::Conversation(_) => None,
    }
}

#[test]
fn sequential_mode_waits_on_the_cursor_message() {
    let oracle = Arc::new(MemoryAssetOracle::new());
    let clock = Arc::new(ManualClock::new(ts(500)));
    let catalog = catalog(&oracle, &clock);
    catalog.load(&[campaign(1, false, &["m0", "m1", "m2"])]);
    oracle.mark_present("m1.png");
    oracle.mark_present("m2.png");

    let outcome = catalog.on_trigger("app_launch");
    assert!(outcome.selection.is_none());
    assert_eq!(outcome.diagnostics[&1], "hasn't finished downloading");
    assert_eq!(catalog.state(1).unwrap().cursor, 0);

    oracle.mark_present("m0.png");
    assert_eq!(selected_message_id(&catalog).as_deref(), Some("m0"));
}

#[test]
fn random_mode_picks_any_ready_message() {
    let oracle = Arc::new(MemoryAssetOracle::new());
    let clock = Arc::new(ManualClock::new(ts(500)));
    oracle.mark_present("m1.png");
    oracle.mark_present("m2.png");

    for seed in 0..16 {
        let catalog = catalog(&oracle, &clock).with_rng_seed(seed);
        catalog.load(&[campaign(1, true, &["m0", "m1", "m2"])]);
        let picked = selected_message_id(&catalog).unwrap();
        assert!(picked == "m1" || picked == "m2", "picked {picked}");
    }
}

#[test]
fn acknowledging_wraps_the_cursor() {
    let oracle = Arc::new(MemoryAssetOracle::new());
    let clock = Arc::new(ManualClock::new(ts(500)));
    let catalog = catalog(&oracle, &clock);
    catalog.load(&[campaign(1, false, &["m0", "m1"])]);
    catalog.acknowledge_display(1);
    assert_eq!(catalog.state(1).unwrap().cursor, 1);

    catalog.acknowledge_display(1);
    let state = catalog.state(1).unwrap();
    assert_eq!(state.cursor, 0);
    assert_eq!(state.impressions, 2);
    assert_eq!(state.status, CampaignStatus::Seen);
}

#[test]
fn cursor_tracks_acknowledgments_mod_length() {
    let oracle = Arc::new(MemoryAssetOracle::new());
    let clock = Arc::new(ManualClock::new(ts(500)));
    let catalog = catalog(&oracle, &clock);
    catalog.load(&[campaign(1, false, &["a", "b", "c"])]);

    for k in 1..=10u64 {
        catalog.acknowledge_display(1);
        let state = catalog.state(1).unwrap();
        assert_eq!(state.cursor, (k % 3) as usize);
        assert_eq!(state.impressions, k);
    }
}

#[test]
fn random_mode_never_moves_the_cursor() {
    let oracle = Arc::new(MemoryAssetOracle::new());
    let clock = Arc::new(ManualClock::new(ts(500)));
    let catalog = catalog(&oracle, &clock);
    catalog.load(&[campaign(1, true, &["a", "b", "c"])]);

    for _ in 0..5 {
        catalog.acknowledge_display(1);
    }
    let state = catalog.state(1).unwrap();
    assert_eq!(state.cursor, 0);
    assert_eq!(state.impressions, 5);
}

#[test]
fn empty_campaign_always_reports_no_messages() {
    let oracle = Arc::new(MemoryAssetOracle::new());
    let clock = Arc::new(ManualClock::new(ts(500)));
    let catalog = catalog(&oracle, &clock);
    catalog.load(&[campaign(1, false, &[])]);

    for now in [ts(-100), ts(500), ts(20_000)] {
        clock.set(now);
        let outcome = catalog.on_trigger("app_launch");
        assert!(outcome.selection.is_none());
        assert_eq!(outcome.diagnostics[&1], "no messages in campaign");
    }
}

#[test]
fn outside_window_never_selects() {
    let oracle = Arc::new(MemoryAssetOracle::new());
    let clock = Arc::new(ManualClock::new(ts(10_000)));
    let catalog = catalog(&oracle, &clock);
    catalog.load(&[campaign(1, true, &["a"])]);
    oracle.mark_present("a.png");

    let outcome = catalog.on_trigger("app_launch");
    assert!(outcome.selection.is_none());
    assert_eq!(outcome.diagnostics[&1], "outside eligibility window");

    clock.set(ts(9_999));
    assert!(catalog.on_trigger("app_launch").selection.is_some());
}

#[test]
fn readiness_query_is_stable() {
    let oracle = Arc::new(MemoryAssetOracle::new());
    let clock = Arc::new(ManualClock::new(ts(500)));
    let catalog = catalog(&oracle, &clock);
    catalog.load(&[campaign(1, false, &["a", "b"])]);
    oracle.mark_present("a.png");

    assert_eq!(catalog.assets_ready(1), Some(false));
    assert_eq!(catalog.assets_ready(1), Some(false));
    oracle.mark_present("b.png");
    assert_eq!(catalog.assets_ready(1), Some(true));
    assert_eq!(catalog.assets_ready(1), Some(true));
}

#[test]
fn conversation_manifest_follows_page_order() {
    let oracle = Arc::new(MemoryAssetOracle::new());
    let clock = Arc::new(ManualClock::new(ts(500)));
    let catalog = catalog(&oracle, &clock);
    catalog.load(&[json!({
        "id": 20,
        "triggers": ["app_launch"],
        "pages": [
            { "content": [ { "type": "text", "value": "Hi" }, { "type": "image", "value": "first.png" } ] },
            { "content": [ { "type": "image", "value": "second.png" } ] }
        ]
    })]);

    let snapshot = catalog.snapshot();
    let campaign = snapshot.get(20).unwrap();
    assert_eq!(campaign.manifest(), vec!["first.png", "second.png"]);
    assert_eq!(catalog.missing_assets(), vec!["first.png", "second.png"]);

    oracle.mark_present("first.png");
    oracle.mark_present("second.png");
    let selection = catalog.on_trigger("app_launch").selection.unwrap();
    match selection.content().unwrap() {
        ContentRef::Conversation(c) => assert_eq!(c.page_count(), 2),
        ContentRef::Message(_) => panic!("expected a conversation"),
    }
}

#[test]
fn state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let oracle = Arc::new(MemoryAssetOracle::new());
    let clock = Arc::new(ManualClock::new(ts(500)));
    let definitions = [campaign(1, false, &["a", "b", "c"]), campaign(2, false, &["d"])];

    {
        let catalog = CampaignCatalog::new(Arc::new(JsonFileStorage::new(&path)), "/assets")
            .with_asset_oracle(oracle.clone())
            .with_clock(clock.clone());
        catalog.load(&definitions);
        catalog.acknowledge_display(1);
        catalog.acknowledge_display(1);
        catalog.mark_deleted(2).unwrap();
    }

    let raw = JsonFileStorage::new(&path).load().unwrap();
    assert_eq!(raw["Next1"], "2");
    assert_eq!(raw["Status2"], "Deleted");

    let catalog = CampaignCatalog::new(Arc::new(JsonFileStorage::new(&path)), "/assets")
        .with_asset_oracle(oracle.clone())
        .with_clock(clock.clone());
    catalog.load(&definitions);

    let one = catalog.state(1).unwrap();
    assert_eq!(one.status, CampaignStatus::Seen);
    assert_eq!(one.cursor, 2);
    assert_eq!(one.impressions, 2);
    assert_eq!(catalog.state(2).unwrap().status, CampaignStatus::Deleted);
}

#[test]
fn throttle_window_is_restored_after_restart() {
    let storage = Arc::new(MemoryStorage::new());
    let oracle = Arc::new(MemoryAssetOracle::new());
    oracle.mark_present("a.png");
    let clock = Arc::new(ManualClock::new(ts(500)));
    let mut definition = campaign(1, false, &["a"]);
    definition["throttle_delay"] = json!(120);

    let first = CampaignCatalog::new(storage.clone(), "/assets")
        .with_asset_oracle(oracle.clone())
        .with_clock(clock.clone());
    first.load(&[definition.clone()]);
    first.acknowledge_display(1);
    drop(first);

    let second = CampaignCatalog::new(storage.clone(), "/assets")
        .with_asset_oracle(oracle.clone())
        .with_clock(clock.clone());
    second.load(&[definition]);
    clock.advance(Duration::seconds(60));
    assert!(second.on_trigger("app_launch").selection.is_none());
    clock.advance(Duration::seconds(60));
    assert!(second.on_trigger("app_launch").selection.is_some());
}
