//! Shared fixtures for manager, cleanup and sync unit tests

use super::manager::StackManager;
use crate::config::Settings;
use crate::git::testing::FakeVcs;
use crate::store::Store;
use tempfile::TempDir;

pub(crate) struct Fixture {
    pub manager: StackManager<FakeVcs>,
    pub dir: TempDir,
}

/// Manager over an in-memory repository on `main`, store and worktree dir in a tempdir
pub(crate) fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let worktrees = dir.path().join("worktrees");
    std::fs::create_dir(&worktrees).unwrap();

    let mut settings = Settings::default();
    settings.worktrees.base_dir = Some(worktrees);

    let store = Store::new(dir.path().join("stacks.json"));
    Fixture {
        manager: StackManager::new(FakeVcs::new("main"), store, settings),
        dir,
    }
}
