use super::test_helpers::{add_origin, commit_file, create_test_git_repo, git, manager_for};
use cascade_stacks::git::VersionControl;
use cascade_stacks::stack::{SyncEngine, SyncStatus};
use cascade_stacks::CascadeError;

#[test]
fn test_create_and_sync_chain_after_main_moves() {
    let (temp_dir, repo_path) = create_test_git_repo();
    let manager = manager_for(&temp_dir, &repo_path);

    let a = manager.create_branch("a", None).unwrap();
    let wt_a = a.worktree_path.clone().unwrap();
    commit_file(&wt_a, "a.txt", "a\n", "a");
    let b = manager.create_branch("b", Some("a")).unwrap();
    commit_file(b.worktree_path.as_ref().unwrap(), "b.txt", "b\n", "b");
    assert_eq!(a.stack_hash, b.stack_hash);

    commit_file(&repo_path, "main.txt", "m\n", "main moves");

    let results = SyncEngine::new(&manager).sync_stack(&a.stack_hash).unwrap();
    let statuses: Vec<_> = results.iter().map(|r| r.status.clone()).collect();
    assert_eq!(
        statuses,
        vec![
            SyncStatus::Rebased { onto: "main".into() },
            SyncStatus::Rebased { onto: "a".into() },
        ]
    );

    let vcs = manager.vcs();
    assert_eq!(vcs.commits_behind("a", "main").unwrap(), 0);
    assert_eq!(vcs.commits_ahead("b", "a").unwrap(), 1);
    assert_eq!(vcs.commits_behind("b", "a").unwrap(), 0);
}

#[test]
fn test_sync_moves_child_off_merged_parent() {
    let (temp_dir, repo_path) = create_test_git_repo();
    add_origin(&temp_dir, &repo_path);
    let manager = manager_for(&temp_dir, &repo_path);

    let a = manager.create_branch("a", Some("main")).unwrap();
    commit_file(a.worktree_path.as_ref().unwrap(), "a.txt", "a\n", "a");
    let b = manager.create_branch("b", Some("a")).unwrap();
    commit_file(b.worktree_path.as_ref().unwrap(), "b.txt", "b\n", "b");

    // a lands on the remote main; local main stays behind
    git(&repo_path, &["push", "origin", "a:main"]);

    let results = SyncEngine::new(&manager)
        .fetch_first(true)
        .sync_stack(&a.stack_hash)
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].status,
        SyncStatus::Reparented {
            from: "a".into(),
            to: "main".into()
        }
    );
    let b = manager.branch("b").unwrap().unwrap();
    assert_eq!(b.parent, "main");
    assert_eq!(b.base_branch, "a");
    assert!(manager.branch("a").unwrap().unwrap().is_merged);
    assert_eq!(manager.vcs().commits_ahead("b", "origin/main").unwrap(), 1);
}

#[test]
fn test_delete_refuses_parent_and_removes_leaf() {
    let (temp_dir, repo_path) = create_test_git_repo();
    let manager = manager_for(&temp_dir, &repo_path);

    manager.create_branch("a", None).unwrap();
    let b = manager.create_branch("b", Some("a")).unwrap();
    commit_file(b.worktree_path.as_ref().unwrap(), "b.txt", "b\n", "b");

    let err = manager.delete_branch("a", false).unwrap_err();
    assert!(matches!(err, CascadeError::HasChildren { .. }));
    assert!(manager.vcs().branch_exists("a"));

    manager.delete_branch("b", true).unwrap();
    assert!(!manager.vcs().branch_exists("b"));
    assert!(!b.worktree_path.unwrap().exists());
    assert!(!manager.is_tracked("b").unwrap());
}

#[test]
fn test_repair_follows_branch_renamed_in_worktree() {
    let (temp_dir, repo_path) = create_test_git_repo();
    let manager = manager_for(&temp_dir, &repo_path);

    let a = manager.create_branch("a", None).unwrap();
    manager.create_branch("child", Some("a")).unwrap();
    git(a.worktree_path.as_ref().unwrap(), &["branch", "-m", "a", "renamed"]);

    let report = manager.repair(false).unwrap();
    assert_eq!(report.renames.len(), 1);
    assert_eq!(report.renames[0].new_name, "renamed");
    assert!(report.orphans.is_empty());

    assert_eq!(manager.branch("child").unwrap().unwrap().parent, "renamed");
    assert!(!manager.is_tracked("a").unwrap());
}
