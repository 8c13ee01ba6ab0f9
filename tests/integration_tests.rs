//! Integration tests for usergrid-migrate
//!
//! These run the full pipeline against in-process stores; no network is
//! needed.

use clap::Parser;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use usergrid_migrate::config::{AllowList, CliArgs, EndpointConfig, MigrateConfig, StoreSide};
use usergrid_migrate::mapping::MappingTable;
use usergrid_migrate::pipeline::{CreateNew, MigrationCoordinator};
use usergrid_migrate::store::{CollectionRef, Credentials, MemoryStore, Record, METADATA_FIELD};

fn record(uuid: &str, name: &str) -> Record {
    Record::from_value(json!({
        "uuid": uuid,
        "name": name,
        "type": "user",
        "metadata": {"path": format!("/users/{uuid}"), "size": 512}
    }))
    .unwrap()
}

fn side(org: &str) -> StoreSide {
    StoreSide {
        org: org.into(),
        endpoint: EndpointConfig::new("memory://"),
        credentials: None,
    }
}

fn config(mapping: MappingTable, workers: usize, max_empty_count: u32) -> MigrateConfig {
    let target_org = mapping.target_org("red").to_string();
    MigrateConfig {
        org: "red".into(),
        apps: AllowList::new(["*"]),
        collections: AllowList::all(),
        worker_count: workers,
        ql: "select *".into(),
        queue_timeout: Duration::from_millis(250),
        max_empty_count,
        queue_capacity: None,
        wait_interval: Duration::from_millis(10),
        mapping,
        source: side("red"),
        target: side(&target_org),
    }
}

fn run(config: MigrateConfig, source: &Arc<MemoryStore>, target: &Arc<MemoryStore>) -> usergrid_migrate::MigrationResult {
    let handler = Arc::new(CreateNew::new(Arc::new(config.mapping.clone())));
    MigrationCoordinator::new(Arc::new(config), source.clone(), target.clone(), handler)
        .run()
        .unwrap()
}

fn users_and_events() -> Arc<MemoryStore> {
    let source = Arc::new(MemoryStore::new());
    source.insert_records(
        "red",
        "shop",
        "users",
        vec![record("u-1", "alice"), record("u-2", "bob"), record("u-3", "carol")],
    );
    source.insert_records(
        "red",
        "shop",
        "events",
        (0..5).map(|i| record(&format!("e-{i}"), &format!("event{i}"))).collect(),
    );
    source
}

#[test]
fn test_internal_collection_skipped_and_users_copied() {
    let source = users_and_events();
    let target = Arc::new(MemoryStore::new());

    let result = run(config(MappingTable::default(), 1, 1), &source, &target);

    assert!(result.completed);
    assert_eq!(result.enumeration.published, 3);

    // Three items, then exactly one empty poll before the worker stopped
    assert_eq!(result.dequeued, 3);
    assert_eq!(result.polls, 4);

    let created = target.created();
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|(c, _)| c.collection == "users"));

    let events = target.records(&CollectionRef::new("red", "shop", "events"));
    assert!(events.is_empty());
}

#[test]
fn test_metadata_is_stripped_end_to_end() {
    let source = users_and_events();
    let target = Arc::new(MemoryStore::new());

    run(config(MappingTable::default(), 2, 1), &source, &target);

    let copied = target.records(&CollectionRef::new("red", "shop", "users"));
    assert_eq!(copied.len(), 3);
    for r in &copied {
        assert!(!r.contains(METADATA_FIELD));
        assert_eq!(r.get("type"), Some(&json!("user")));
    }
}

#[test]
fn test_org_mapping_applies_to_every_item() {
    let source = users_and_events();
    source.insert_records("red", "blog", "posts", vec![record("p-1", "hello")]);
    let target = Arc::new(MemoryStore::new());

    let mapping = MappingTable::from_pairs(&["red:blue"], &["shop:store"], &["posts:articles"]);
    run(config(mapping, 2, 1), &source, &target);

    let created = target.created();
    assert_eq!(created.len(), 4);
    assert!(created.iter().all(|(c, _)| c.org == "blue"));
    assert_eq!(
        target.records(&CollectionRef::new("blue", "store", "users")).len(),
        3
    );
    assert_eq!(
        target.records(&CollectionRef::new("blue", "blog", "articles")).len(),
        1
    );
}

#[test]
fn test_rejected_item_is_dropped_and_rest_continue() {
    let source = users_and_events();
    let target = Arc::new(MemoryStore::new());
    target.reject_name("bob");

    let result = run(config(MappingTable::default(), 1, 1), &source, &target);

    assert!(result.completed);
    assert_eq!(target.create_calls(), 3);

    let names: Vec<_> = target
        .records(&CollectionRef::new("red", "shop", "users"))
        .iter()
        .map(|r| r.name().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["alice", "carol"]);
}

#[test]
fn test_rerun_is_idempotent() {
    let source = users_and_events();
    let target = Arc::new(MemoryStore::new());

    run(config(MappingTable::default(), 3, 1), &source, &target);
    run(config(MappingTable::default(), 3, 1), &source, &target);

    assert_eq!(target.create_calls(), 6);
    assert_eq!(target.records(&CollectionRef::new("red", "shop", "users")).len(), 3);
}

#[test]
fn test_large_collection_with_pagination() {
    let source = Arc::new(MemoryStore::new());
    source.insert_records(
        "red",
        "shop",
        "orders",
        (0..250).map(|i| record(&format!("o-{i}"), &format!("order{i}"))).collect(),
    );
    let target = Arc::new(MemoryStore::new());

    let mut cfg = config(MappingTable::default(), 4, 2);
    cfg.source.endpoint.limit = 30;
    let result = run(cfg, &source, &target);

    assert_eq!(result.enumeration.published, 250);
    assert_eq!(target.records(&CollectionRef::new("red", "shop", "orders")).len(), 250);
    assert_eq!(source.page_requests(), 9);
}

#[test]
fn test_config_files_drive_authentication() {
    let mut source_file = NamedTempFile::new().unwrap();
    write!(
        source_file,
        r#"{{"endpoint": {{"api_url": "memory://source", "limit": 10}},
            "credentials": {{"red": {{"client_id": "src", "client_secret": "s3cret"}}}}}}"#
    )
    .unwrap();

    let mut target_file = NamedTempFile::new().unwrap();
    write!(
        target_file,
        r#"{{"endpoint": {{"api_url": "memory://target"}},
            "credentials": {{"blue": {{"client_id": "dst", "client_secret": "t0ken"}}}}}}"#
    )
    .unwrap();

    let args = CliArgs::parse_from([
        "usergrid-migrate",
        "-o",
        "red",
        "-a",
        "*",
        "--map-org",
        "red:blue",
        "--queue-timeout",
        "1",
        "-s",
        source_file.path().to_str().unwrap(),
        "-d",
        target_file.path().to_str().unwrap(),
    ]);
    let mut config = MigrateConfig::from_args(args).unwrap();
    config.queue_timeout = Duration::from_millis(250);

    let source = Arc::new(
        MemoryStore::new().with_required_credentials(Credentials::new("src", "s3cret")),
    );
    source.insert_records("red", "shop", "users", vec![record("u-1", "alice")]);
    let target = Arc::new(
        MemoryStore::new().with_required_credentials(Credentials::new("dst", "t0ken")),
    );

    let result = run(config, &source, &target);

    assert!(result.completed);
    assert!(source.is_authenticated());
    assert!(target.is_authenticated());
    assert_eq!(target.records(&CollectionRef::new("blue", "shop", "users")).len(), 1);
}
