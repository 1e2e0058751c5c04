pub mod cache;
pub mod cleanup;
pub mod manager;
#[allow(clippy::module_inception)]
pub mod stack;
pub mod sync;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{BranchCache, BranchEntry};
pub use cleanup::{OrphanCandidate, OrphanReason, RenameCandidate, RepairReport};
pub use manager::StackManager;
pub use stack::{sort_topologically, stack_hash, Branch, Stack};
pub use sync::{SyncEngine, SyncResult, SyncStatus};
pub use tree::BranchTree;
