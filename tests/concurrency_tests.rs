//! Concurrency tests for the settings tree
//!
//! Many tasks share one tree handle and mutate it between await points; these
//! tests drive interleaved writers, savers and readers and assert that the
//! backing files stay well-formed and the ordering invariants hold.

use std::sync::Arc;

use chathub::{
    notify::EventBus,
    persist::{PersistenceEngine, SaveScope},
    schema::core::core_schema,
    tree::SettingsTree,
    NodePath, ParamValue,
};
use tempfile::TempDir;

fn assemble_in(dir: &TempDir) -> SettingsTree {
    let (tree, rejected) = SettingsTree::assemble(
        &core_schema(),
        &[],
        PersistenceEngine::new(dir.path().to_path_buf()),
        Arc::new(EventBus::default()),
    )
    .unwrap();
    assert!(rejected.is_empty());
    tree
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_to_one_parameter_never_tear_the_file() {
    let dir = TempDir::new().unwrap();
    let tree = assemble_in(&dir);
    let path = NodePath::from(["marketplace", "refresh_minutes"]);

    let submitted: Vec<i64> = (1..=24).map(|i| i * 10).collect();
    let mut handles = Vec::new();
    for value in &submitted {
        let tree = tree.clone();
        let path = path.clone();
        let value = *value;
        handles.push(tokio::spawn(async move {
            tree.set_value(&path, value, true).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // The file parses cleanly and holds exactly one of the submitted values.
    let content = std::fs::read_to_string(dir.path().join("marketplace.toml")).unwrap();
    let table: toml::Table = content.parse().unwrap();
    let on_disk = table["refresh_minutes"].as_integer().unwrap();
    assert!(
        submitted.contains(&on_disk),
        "disk value {on_disk} was never submitted"
    );

    // Last writer wins in memory, and disk agrees with memory.
    let in_memory = tree.get(&path).await.unwrap();
    assert_eq!(in_memory, ParamValue::Int(on_disk));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn writers_to_different_files_proceed_independently() {
    let dir = TempDir::new().unwrap();
    let tree = assemble_in(&dir);

    let mut handles = Vec::new();
    for i in 0..10_i64 {
        let tree = tree.clone();
        handles.push(tokio::spawn(async move {
            tree.set_value(
                &NodePath::from(["marketplace", "refresh_minutes"]),
                10 + i,
                true,
            )
            .await
            .unwrap();
            tree.set_value(
                &NodePath::from(["hub", "instance_name"]),
                format!("hub-{i}"),
                true,
            )
            .await
            .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let marketplace: toml::Table = std::fs::read_to_string(dir.path().join("marketplace.toml"))
        .unwrap()
        .parse()
        .unwrap();
    assert!(marketplace["refresh_minutes"].as_integer().is_some());

    let hub: toml::Table = std::fs::read_to_string(dir.path().join("hub.toml"))
        .unwrap()
        .parse()
        .unwrap();
    assert!(hub["instance_name"].as_str().unwrap().starts_with("hub-"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn entry_order_stays_strict_insertion_order_under_concurrent_reads() {
    let dir = TempDir::new().unwrap();
    let tree = assemble_in(&dir);
    let rules = NodePath::from(["autoresponse"]);

    // A reader hammers the container while entries are inserted one by one.
    let reader = {
        let tree = tree.clone();
        let rules = rules.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let rows = tree.snapshot(&rules).await.unwrap();
                // Any observed prefix must already be in insertion order.
                let ids: Vec<String> = rows.into_iter().map(|r| r.id).collect();
                for (i, id) in ids.iter().enumerate() {
                    assert_eq!(id, &format!("rule{i}"));
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for i in 0..10 {
        tree.add_auto_response(&format!("rule{i}")).await.unwrap();
        tokio::task::yield_now().await;
    }
    reader.await.unwrap();

    let final_ids: Vec<String> = tree
        .snapshot(&rules)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("rule{i}")).collect();
    assert_eq!(final_ids, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn removal_during_pending_saves_is_safe() {
    let dir = TempDir::new().unwrap();
    let tree = assemble_in(&dir);

    tree.add_notification_target(111, None).await.unwrap();
    tree.add_notification_target(222, Some(5)).await.unwrap();

    let saver = {
        let tree = tree.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                tree.save(&NodePath::from(["notifications"]), SaveScope::OwningFileOnly)
                    .await
                    .unwrap();
            }
        })
    };
    let remover = {
        let tree = tree.clone();
        tokio::spawn(async move {
            tree.remove_entry(&NodePath::from(["notifications"]), "111_None")
                .await
                .unwrap();
        })
    };

    saver.await.unwrap();
    remover.await.unwrap();

    // One more save reflects the final shape; the file stays parseable.
    tree.save(&NodePath::from(["notifications"]), SaveScope::OwningFileOnly)
        .await
        .unwrap();
    let table: toml::Table = std::fs::read_to_string(dir.path().join("notifications.toml"))
        .unwrap()
        .parse()
        .unwrap();
    let keys: Vec<&String> = table.keys().collect();
    assert!(keys.iter().all(|k| k.starts_with("222_5.")));
}
