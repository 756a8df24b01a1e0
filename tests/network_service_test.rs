//! Tests for NetworkService
//!
//! Every mutation is applied to the live network and then written through
//! PersistenceService. These tests drive the service the way the CLI does,
//! through a ServiceContainer rooted in a temporary data directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use bizgraph::application::services::{LoadStatus, NetworkService};
use bizgraph::application::ApplicationError;
use bizgraph::config::Settings;
use bizgraph::domain::{DomainError, NewNode, ValidationError};
use bizgraph::infrastructure::traits::{FileSystem, RealFileSystem};
use bizgraph::infrastructure::ServiceContainer;
use bizgraph::util::testing;

/// Real file system whose renames can be switched to fail mid-test.
#[derive(Default)]
struct ReadOnlySwitch {
    read_only: AtomicBool,
}

impl ReadOnlySwitch {
    fn set(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }
}

impl FileSystem for ReadOnlySwitch {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        RealFileSystem.read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        RealFileSystem.write(path, content)
    }

    fn exists(&self, path: &Path) -> bool {
        RealFileSystem.exists(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        RealFileSystem.create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        RealFileSystem.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        RealFileSystem.remove_file(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        RealFileSystem.copy(from, to)
    }
}

fn container_with(dir: &TempDir, fs: Arc<dyn FileSystem>) -> ServiceContainer {
    let settings = Settings {
        data_dir: dir.path().join("data"),
        network_file: "network.json".into(),
        min_children_threshold: 2,
    };
    ServiceContainer::with_deps(settings, fs)
}

fn container(dir: &TempDir) -> ServiceContainer {
    container_with(dir, Arc::new(RealFileSystem))
}

fn network_file(dir: &TempDir) -> PathBuf {
    dir.path().join("data").join("network.json")
}

fn stored(dir: &TempDir) -> serde_json::Value {
    let content = fs::read_to_string(network_file(dir)).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn backup_count(dir: &TempDir) -> usize {
    fs::read_dir(dir.path().join("data"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains("_backup_"))
        .count()
}

/// root with two default children: root.1, root.2
fn seeded(dir: &TempDir) -> NetworkService {
    let mut service = container(dir).network_service();
    service.add_node(None, NewNode::default()).unwrap();
    service.add_node(Some("root"), NewNode::default()).unwrap();
    service.add_node(Some("root"), NewNode::default()).unwrap();
    service
}

fn validation(err: ApplicationError) -> ValidationError {
    match err {
        ApplicationError::Domain(DomainError::Validation(v)) => v,
        other => panic!("expected validation error, got {other:?}"),
    }
}

// ============================================================
// initialize() tests
// ============================================================

#[test]
fn given_empty_data_dir_when_initializing_then_saves_fresh_document() {
    // Arrange
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();

    // Act
    let service = container(&temp).network_service();

    // Assert
    assert_eq!(service.status(), &LoadStatus::Missing);
    assert!(service.network().is_empty());
    let doc = stored(&temp);
    assert_eq!(doc["nodes"], json!({}));
    assert_eq!(doc["settings"]["min_children_threshold"], json!(2));
}

#[test]
fn given_saved_network_when_reopening_then_loads_it() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    drop(seeded(&temp));

    let service = container(&temp).network_service();

    assert_eq!(service.status(), &LoadStatus::Loaded);
    assert_eq!(service.network().len(), 3);
    assert_eq!(service.network().root(), Some("root"));
}

#[test]
fn given_external_edit_when_reloading_then_picks_up_file() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);
    fs::write(network_file(&temp), "not json").unwrap();

    let status = service.reload().clone();

    assert!(matches!(status, LoadStatus::Recovered(_)));
    assert!(service.network().is_empty());
}

// ============================================================
// add / remove
// ============================================================

#[test]
fn given_empty_network_when_building_then_ids_and_profit_follow_hierarchy() {
    // Arrange
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();

    // Act
    let mut service = seeded(&temp);

    // Assert
    let network = service.network();
    let root = network.node("root").unwrap();
    assert_eq!(root.value, 1000.0);
    assert_eq!(root.metrics.depth, 0);
    assert_eq!(root.metrics.profit, 2000.0);
    assert_eq!(root.metrics.children_count, 2);
    assert!(network.contains("root.1"));
    assert!(network.contains("root.2"));

    let err = service.remove_node("root").unwrap_err();
    assert_eq!(validation(err), ValidationError::HasChildren("root".into()));

    service.remove_node("root.1").unwrap();
    assert_eq!(
        service.network().node("root").unwrap().metrics.profit,
        1000.0
    );
    let doc = stored(&temp);
    assert_eq!(doc["nodes"]["root"]["profit"], json!(1000.0));
    assert!(doc["nodes"].get("root.1").is_none());
}

#[test]
fn given_threshold_two_when_adding_children_then_chokepoint_clears() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = container(&temp).network_service();
    service.add_node(None, NewNode::default()).unwrap();

    service.add_node(Some("root"), NewNode::default()).unwrap();
    let root = service.network().node("root").unwrap().metrics.clone();
    assert_eq!(root.needed_children, 1);
    assert!(root.is_chokepoint);
    assert!(root.criticality > 0.0);

    service.add_node(Some("root"), NewNode::default()).unwrap();
    let root = &service.network().node("root").unwrap().metrics;
    assert_eq!(root.needed_children, 0);
    assert!(!root.is_chokepoint);
    assert_eq!(root.criticality, 0.0);
}

#[test]
fn given_second_root_when_adding_then_rejects_without_saving() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);
    let before = fs::read_to_string(network_file(&temp)).unwrap();

    let err = service.add_node(None, NewNode::default()).unwrap_err();

    assert!(err.is_validation());
    assert_eq!(validation(err), ValidationError::DuplicateRoot);
    assert_eq!(fs::read_to_string(network_file(&temp)).unwrap(), before);
}

#[test]
fn given_properties_when_adding_then_they_are_persisted() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);

    let id = service
        .add_node(
            Some("root.1"),
            NewNode::default()
                .with_id("shop")
                .with_value(75.0)
                .with_property("city", json!("Lyon")),
        )
        .unwrap();

    assert_eq!(id, "shop");
    let doc = stored(&temp);
    assert_eq!(doc["nodes"]["shop"]["city"], json!("Lyon"));
    assert_eq!(doc["nodes"]["shop"]["parents"], json!(["root.1"]));
    assert_eq!(doc["graph"]["root.1"], json!([["shop", 1.0]]));
}

#[test]
fn given_failing_save_when_adding_then_keeps_node_and_next_save_persists_it() {
    // Arrange
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let disk = Arc::new(ReadOnlySwitch::default());
    let mut service = container_with(&temp, disk.clone()).network_service();
    service.add_node(None, NewNode::default()).unwrap();

    // Act
    disk.set(true);
    let err = service.add_node(Some("root"), NewNode::default()).unwrap_err();
    let on_disk_after_failure = stored(&temp);
    disk.set(false);
    service.add_node(Some("root"), NewNode::default()).unwrap();

    // Assert
    assert!(matches!(err, ApplicationError::Persistence { .. }));
    assert!(!err.is_validation());
    assert_eq!(on_disk_after_failure["nodes"].as_object().unwrap().len(), 1);
    assert!(service.network().contains("root.1"));
    let nodes = stored(&temp)["nodes"].as_object().unwrap().clone();
    assert!(nodes.contains_key("root.1"));
    assert!(nodes.contains_key("root.2"));
    assert_eq!(nodes["root"]["children_count"], json!(2));
    assert!(!temp.path().join("data").join("network.json.tmp").exists());
}

// ============================================================
// bulk delete
// ============================================================

#[test]
fn given_node_with_child_when_bulk_deleting_then_rejects_whole_batch() {
    // Arrange
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = container(&temp).network_service();
    service.add_node(None, NewNode::default()).unwrap();
    service
        .add_node(Some("root"), NewNode::default().with_id("a"))
        .unwrap();
    service
        .add_node(Some("root"), NewNode::default().with_id("b"))
        .unwrap();
    service
        .add_node(Some("a"), NewNode::default().with_id("a1"))
        .unwrap();

    // Act
    let err = service
        .remove_nodes(&["a".to_string(), "b".to_string()])
        .unwrap_err();

    // Assert
    match validation(err) {
        ValidationError::BulkRejected(reasons) => {
            assert_eq!(reasons.len(), 2);
            assert!(reasons.contains_key("a"));
            assert!(reasons.contains_key("b"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(service.network().contains("a"));
    assert!(service.network().contains("b"));
}

#[test]
fn given_leaves_when_bulk_deleting_then_removes_all_and_saves_once() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);
    let backups_before = backup_count(&temp);

    let report = service
        .remove_nodes(&[
            "root.1".to_string(),
            "root.2".to_string(),
            "root.1".to_string(),
        ])
        .unwrap();

    assert_eq!(report.deleted, vec!["root.1", "root.2"]);
    assert!(report.is_complete());
    assert_eq!(service.network().len(), 1);
    assert_eq!(backup_count(&temp), backups_before + 1);
    assert_eq!(stored(&temp)["nodes"].as_object().unwrap().len(), 1);
}

#[test]
fn given_no_ids_when_bulk_deleting_then_rejects() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);

    let err = service.remove_nodes(&[]).unwrap_err();

    assert_eq!(validation(err), ValidationError::EmptySelection);
}

// ============================================================
// settings
// ============================================================

#[test]
fn given_same_threshold_when_updating_settings_then_does_not_save() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);
    let backups_before = backup_count(&temp);

    let changed = service.update_settings(2).unwrap();

    assert!(!changed);
    assert_eq!(backup_count(&temp), backups_before);
}

#[test]
fn given_new_threshold_when_updating_settings_then_recomputes_and_saves() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);

    let changed = service.update_settings(4).unwrap();

    assert!(changed);
    let root = &service.network().node("root").unwrap().metrics;
    assert_eq!(root.needed_children, 2);
    assert_eq!(root.suggested_child_count, 4);
    assert_eq!(root.criticality, 0.5);
    assert_eq!(stored(&temp)["settings"]["min_children_threshold"], json!(4));
}

#[test]
fn given_zero_threshold_when_updating_settings_then_rejects() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);

    let err = service.update_settings(0).unwrap_err();

    assert_eq!(validation(err), ValidationError::ThresholdOutOfRange(0));
    assert_eq!(service.network().settings().min_children_threshold, 2);
}

// ============================================================
// import
// ============================================================

#[test]
fn given_fragment_json_when_importing_subtree_then_attaches_and_saves() {
    // Arrange
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);
    let fragment = json!({
        "nodes": {
            "hub": { "value": 10.0 },
            "root": { "value": 20.0 },
            "leaf": { "value": 30.0 }
        },
        "graph": {
            "hub": [["root", 1.0], ["leaf", 1.0]],
            "root": [],
            "leaf": []
        }
    });

    // Act
    let added = service
        .import_subtree_json("root.2", &fragment.to_string())
        .unwrap();

    // Assert
    assert_eq!(added.len(), 3);
    let network = service.network();
    assert_eq!(network.node("root.2").unwrap().metrics.children_count, 1);
    assert_eq!(network.node("root.2").unwrap().metrics.profit, 10.0);
    assert_eq!(network.len(), 6);
    for id in &added {
        assert!(id.starts_with("root.2_sub"), "unexpected id {id}");
    }
    assert_eq!(stored(&temp)["nodes"].as_object().unwrap().len(), 6);
}

#[test]
fn given_malformed_fragment_when_importing_subtree_then_leaves_network_alone() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);

    let err = service
        .import_subtree_json("root.2", r#"{"nodes": {"x": {}}}"#)
        .unwrap_err();

    assert!(matches!(
        validation(err),
        ValidationError::MalformedFragment(_)
    ));
    assert_eq!(service.network().len(), 3);
}

#[test]
fn given_document_when_replacing_network_then_previous_file_is_backed_up() {
    // Arrange
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);
    let replacement = json!({
        "nodes": {
            "hq": { "id": "hq", "parents": [], "value": 500.0 },
            "branch": { "id": "branch", "parents": ["hq"], "value": 120.0 }
        },
        "graph": { "hq": [["branch", 1.0]] },
        "settings": { "min_children_threshold": 3 }
    });
    let backups_before = backup_count(&temp);

    // Act
    let issues = service.replace_from_json(&replacement.to_string()).unwrap();

    // Assert
    assert!(issues.is_empty());
    let network = service.network();
    assert_eq!(network.root(), Some("hq"));
    assert_eq!(network.node("hq").unwrap().metrics.profit, 120.0);
    assert_eq!(network.settings().min_children_threshold, 3);
    assert_eq!(backup_count(&temp), backups_before + 1);
    assert_eq!(stored(&temp)["nodes"]["branch"]["depth"], json!(1));
}

#[test]
fn given_invalid_json_when_replacing_network_then_keeps_current() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);

    let err = service.replace_from_json("{ nope").unwrap_err();

    assert!(matches!(validation(err), ValidationError::InvalidDocument(_)));
    assert_eq!(service.network().len(), 3);
}

// ============================================================
// queries
// ============================================================

#[test]
fn given_network_when_querying_then_reports_insight_stats_and_suggestions() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let mut service = seeded(&temp);
    service.add_node(Some("root.1"), NewNode::default()).unwrap();

    let insight = service.insight("root.1").unwrap();
    assert_eq!(insight.parents, vec!["root"]);
    assert_eq!(insight.children, vec!["root.1.1"]);
    assert_eq!(insight.needed_children, 1);

    let stats = service.stats();
    assert_eq!(stats.total_nodes, 4);
    assert_eq!(stats.total_edges, 3);
    assert_eq!(stats.max_depth, 2);

    let ranked: Vec<String> = service
        .suggestions(5)
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ranked, vec!["root.2", "root.1.1", "root.1"]);

    let err = service.insight("missing").unwrap_err();
    assert_eq!(validation(err), ValidationError::NodeNotFound("missing".into()));
}

#[test]
fn given_network_when_exporting_then_snapshot_matches_file() {
    testing::init_test_setup();
    let temp = TempDir::new().unwrap();
    let service = seeded(&temp);

    let exported: serde_json::Value =
        serde_json::from_str(&service.export_json().unwrap()).unwrap();

    assert_eq!(exported, stored(&temp));
    assert_eq!(exported, service.snapshot().unwrap());
}
