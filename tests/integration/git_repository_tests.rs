use super::test_helpers::{commit_file, create_test_git_repo, git};
use cascade_stacks::git::{GitRepository, RebaseOutcome, VersionControl};
use cascade_stacks::utils::paths;

#[test]
fn test_worktree_create_list_remove() {
    let (temp_dir, repo_path) = create_test_git_repo();
    let repo = GitRepository::open(&repo_path).unwrap();
    let wt = temp_dir.path().join("worktrees").join("feature");

    repo.create_worktree("feature", &wt, "main").unwrap();
    assert!(repo.branch_exists("feature"));
    assert!(wt.join("README.md").exists());

    let listed = repo.list_worktrees().unwrap();
    assert!(listed
        .iter()
        .any(|w| w.branch.as_deref() == Some("feature") && paths::same_location(&w.path, &wt)));

    repo.remove_worktree(&wt, false, Some("feature")).unwrap();
    assert!(!wt.exists());
    assert!(!repo.branch_exists("feature"));
}

#[test]
fn test_remove_worktree_prunes_vanished_directory() {
    let (temp_dir, repo_path) = create_test_git_repo();
    let repo = GitRepository::open(&repo_path).unwrap();
    let wt = temp_dir.path().join("gone");

    repo.create_worktree("gone", &wt, "main").unwrap();
    std::fs::remove_dir_all(&wt).unwrap();

    repo.remove_worktree(&wt, true, Some("gone")).unwrap();
    assert!(!repo.branch_exists("gone"));
    assert!(repo
        .list_worktrees()
        .unwrap()
        .iter()
        .all(|w| w.branch.as_deref() != Some("gone")));
}

#[test]
fn test_open_from_linked_worktree_uses_main_root() {
    let (temp_dir, repo_path) = create_test_git_repo();
    let repo = GitRepository::open(&repo_path).unwrap();
    let wt = temp_dir.path().join("linked");
    repo.create_worktree("linked", &wt, "main").unwrap();

    let from_linked = GitRepository::open(&wt).unwrap();
    assert!(paths::same_location(from_linked.root_path(), &repo_path));
}

#[test]
fn test_ahead_behind_and_merged() {
    let (temp_dir, repo_path) = create_test_git_repo();
    let repo = GitRepository::open(&repo_path).unwrap();
    let initial = git(&repo_path, &["rev-parse", "HEAD"]);
    let wt = temp_dir.path().join("feature");

    repo.create_worktree("feature", &wt, "main").unwrap();
    commit_file(&wt, "one.txt", "1\n", "one");
    commit_file(&wt, "two.txt", "2\n", "two");
    commit_file(&repo_path, "main.txt", "m\n", "main moves");

    assert_eq!(repo.commits_ahead("feature", "main").unwrap(), 2);
    assert_eq!(repo.commits_behind("feature", "main").unwrap(), 1);
    assert!(!repo.is_branch_merged("feature", "main").unwrap());
    assert!(repo.is_branch_merged(&initial, "feature").unwrap());
    assert_eq!(repo.merge_base("feature", "main").unwrap(), initial);
    assert_eq!(repo.branch_head("feature").unwrap(), git(&wt, &["rev-parse", "HEAD"]));
}

#[test]
fn test_rebase_conflict_leaves_rebase_in_progress() {
    let (temp_dir, repo_path) = create_test_git_repo();
    let repo = GitRepository::open(&repo_path).unwrap();
    commit_file(&repo_path, "file.txt", "base\n", "base");

    let wt = temp_dir.path().join("feature");
    repo.create_worktree("feature", &wt, "main").unwrap();
    commit_file(&wt, "file.txt", "feature\n", "feature edit");
    commit_file(&repo_path, "file.txt", "main\n", "main edit");

    let outcome = repo.rebase(&wt, "feature", "main").unwrap();
    assert_eq!(outcome, RebaseOutcome::Conflict);
    assert!(repo.is_rebase_in_progress(&wt));
    assert!(!repo.is_rebase_in_progress(&repo_path));

    git(&wt, &["rebase", "--abort"]);
    assert!(!repo.is_rebase_in_progress(&wt));
}

#[test]
fn test_rebase_onto_replays_only_own_commits() {
    let (temp_dir, repo_path) = create_test_git_repo();
    let repo = GitRepository::open(&repo_path).unwrap();
    let wt_a = temp_dir.path().join("a");
    let wt_b = temp_dir.path().join("b");

    repo.create_worktree("a", &wt_a, "main").unwrap();
    commit_file(&wt_a, "a.txt", "a\n", "a");
    repo.create_worktree("b", &wt_b, "a").unwrap();
    commit_file(&wt_b, "b.txt", "b\n", "b");
    commit_file(&repo_path, "main.txt", "m\n", "main moves");

    let old_a = repo.branch_head("a").unwrap();
    assert_eq!(repo.rebase(&wt_a, "a", "main").unwrap(), RebaseOutcome::Success);
    assert_eq!(
        repo.rebase_onto(&wt_b, "b", "a", &old_a).unwrap(),
        RebaseOutcome::Success
    );

    assert_eq!(repo.commits_ahead("b", "a").unwrap(), 1);
    assert_eq!(repo.commits_behind("b", "a").unwrap(), 0);
    assert_eq!(repo.commits_behind("a", "main").unwrap(), 0);
}

#[test]
fn test_rebase_without_worktree_restores_checked_out_branch() {
    let (_temp_dir, repo_path) = create_test_git_repo();
    let repo = GitRepository::open(&repo_path).unwrap();

    git(&repo_path, &["checkout", "-b", "side"]);
    commit_file(&repo_path, "side.txt", "s\n", "side");
    git(&repo_path, &["checkout", "main"]);
    commit_file(&repo_path, "main.txt", "m\n", "main moves");

    assert_eq!(
        repo.rebase(&repo_path, "side", "main").unwrap(),
        RebaseOutcome::Success
    );
    assert_eq!(repo.commits_behind("side", "main").unwrap(), 0);
    assert_eq!(repo.commits_ahead("side", "main").unwrap(), 1);
    assert_eq!(
        git(&repo_path, &["symbolic-ref", "--short", "HEAD"]),
        "main"
    );
}
