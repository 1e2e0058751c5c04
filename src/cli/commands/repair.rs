use super::open_manager;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::stack::OrphanReason;

pub fn run(dry_run: bool) -> Result<()> {
    let manager = open_manager()?;
    let report = manager.repair(dry_run)?;

    if report.is_clean() {
        Output::success("Tracking matches git; nothing to repair");
        return Ok(());
    }

    if !report.renames.is_empty() {
        Output::section("Renamed branches");
        for rename in &report.renames {
            Output::bullet(format!("{} → {}", rename.old_name, rename.new_name));
        }
    }

    if !report.orphans.is_empty() {
        Output::section("Orphaned branches");
        for orphan in &report.orphans {
            let reason = match orphan.reason {
                OrphanReason::BranchMissing => "git branch is gone",
                OrphanReason::WorktreeMissing => "worktree directory is gone",
            };
            Output::bullet(format!("{} ({reason})", orphan.branch));
        }
    }

    println!();
    if report.dry_run {
        Output::warning("Dry run; nothing was changed");
        Output::tip("Run 'ca-stack repair' to apply");
    } else {
        Output::success(format!(
            "Applied {} rename(s), removed {} orphan(s)",
            report.renames.len(),
            report.orphans.len()
        ));
    }
    Ok(())
}
