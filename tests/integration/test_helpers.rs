use cascade_stacks::config::Settings;
use cascade_stacks::git::GitRepository;
use cascade_stacks::stack::StackManager;
use cascade_stacks::store::Store;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Run git in `dir`, panicking with its stderr on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Git command should start");

    if !output.status.success() {
        panic!(
            "Git command failed: git {}\nStderr: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Repository at `<tmp>/repo` on `main` with one commit
pub fn create_test_git_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().join("repo");
    std::fs::create_dir(&repo_path).unwrap();

    let git_commands = [
        vec!["init"],
        vec!["symbolic-ref", "HEAD", "refs/heads/main"],
        vec!["config", "user.name", "Test User"],
        vec!["config", "user.email", "test@example.com"],
        vec!["config", "core.autocrlf", "false"],
        vec!["config", "commit.gpgsign", "false"],
    ];
    for cmd_args in &git_commands {
        git(&repo_path, cmd_args);
    }

    commit_file(&repo_path, "README.md", "# Test Repository\n", "Initial commit");
    (temp_dir, repo_path)
}

/// Write `file` and commit it in the worktree at `dir`
pub fn commit_file(dir: &Path, file: &str, content: &str, message: &str) {
    std::fs::write(dir.join(file), content).unwrap();
    git(dir, &["add", file]);
    git(dir, &["commit", "-m", message]);
}

/// Bare `<tmp>/origin.git` registered as `origin` with `main` pushed
pub fn add_origin(temp_dir: &TempDir, repo_path: &Path) -> PathBuf {
    let origin = temp_dir.path().join("origin.git");
    git(temp_dir.path(), &["init", "--bare", "origin.git"]);
    git(repo_path, &["remote", "add", "origin", &origin.to_string_lossy()]);
    git(repo_path, &["push", "origin", "main"]);
    origin
}

/// Manager over the real repository; store and worktrees live next to it
pub fn manager_for(temp_dir: &TempDir, repo_path: &Path) -> StackManager<GitRepository> {
    let worktrees = temp_dir.path().join("worktrees");
    std::fs::create_dir_all(&worktrees).unwrap();

    let mut settings = Settings::default();
    settings.worktrees.base_dir = Some(worktrees);
    settings.git.fetch_before_sync = false;

    let store = Store::new(temp_dir.path().join("stacks.json"));
    StackManager::new(GitRepository::open(repo_path).unwrap(), store, settings)
}
