use cascade_stacks::stack::stack_hash;
use cascade_stacks::store::{Store, CURRENT_VERSION};
use cascade_stacks::CascadeError;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_v0_file_with_legacy_cache_is_upgraded_on_disk() {
    let tmp = TempDir::new().unwrap();
    let store_path = tmp.path().join("stacks.json");
    let legacy_path = tmp.path().join("branch_cache.json");

    fs::write(
        &store_path,
        json!({
            "repos": { "/work/repo": { "stacks": { "feature-a": {
                "name": "feature-a",
                "branches": [
                    { "name": "feature-a", "parent": "main", "worktreePath": "/wt/a" },
                    { "name": "feature-b", "parent": "feature-a", "worktreePath": "/wt/b" }
                ]
            } } } }
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        &legacy_path,
        json!({ "/work/repo": {
            "feature-a": { "worktreePath": "/wt/stale" },
            "orphan": { "worktreePath": "", "prNumber": 9 }
        } })
        .to_string(),
    )
    .unwrap();

    let store = Store::new(&store_path).with_legacy_cache(&legacy_path);
    let doc = store.load().unwrap();
    let hash = stack_hash("main", "feature-a", 0);

    let repo = doc.repo("/work/repo").unwrap();
    let stack = &repo.stacks[&hash];
    assert_eq!(stack.root, "main");
    assert_eq!(stack.tree.children("feature-a", "main"), vec!["feature-b"]);

    // Entries from the store win over the legacy cache
    assert_eq!(
        repo.branch("feature-a").unwrap().worktree_path,
        Some(PathBuf::from("/wt/a"))
    );
    assert_eq!(repo.branches.get("orphan").unwrap().pr_number, Some(9));

    let on_disk = read_json(&store_path);
    assert_eq!(on_disk["version"], CURRENT_VERSION);
    assert!(on_disk["updatedAt"].is_string());
    assert!(on_disk["repos"]["/work/repo"]["stacks"][&hash].is_object());

    // A current document loads without being rewritten
    let before = fs::read_to_string(&store_path).unwrap();
    store.load().unwrap();
    assert_eq!(fs::read_to_string(&store_path).unwrap(), before);
}

#[test]
fn test_unmigratable_file_is_left_untouched() {
    let tmp = TempDir::new().unwrap();
    let store_path = tmp.path().join("stacks.json");
    let original = json!({
        "repos": { "/r": { "stacks": { "s": { "branches": [
            { "name": "a", "parent": "main" },
            { "name": "b", "parent": "develop" }
        ] } } } }
    })
    .to_string();
    fs::write(&store_path, &original).unwrap();

    let err = Store::new(&store_path).load().unwrap_err();
    assert!(matches!(err, CascadeError::PersistenceFailed(_)));
    assert_eq!(fs::read_to_string(&store_path).unwrap(), original);
}

#[test]
fn test_newer_version_is_refused() {
    let tmp = TempDir::new().unwrap();
    let store_path = tmp.path().join("stacks.json");
    fs::write(&store_path, json!({ "version": 99, "repos": {} }).to_string()).unwrap();

    assert!(matches!(
        Store::new(&store_path).load(),
        Err(CascadeError::PersistenceFailed(_))
    ));
}
