use crate::stack::{Branch, BranchTree, Stack, SyncResult, SyncStatus};
use console::style;
use std::fmt::Display;

/// Centralized output formatting utilities for consistent CLI presentation
pub struct Output;

impl Output {
    /// Print a success message with checkmark
    pub fn success<T: Display>(message: T) {
        println!("{} {}", style("✓").green(), message);
    }

    /// Print an error message with X mark
    pub fn error<T: Display>(message: T) {
        println!("{} {}", style("✗").red(), message);
    }

    pub fn warning<T: Display>(message: T) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info<T: Display>(message: T) {
        println!("{} {}", style("ℹ").cyan(), message);
    }

    /// Print a sub-item with arrow prefix
    pub fn sub_item<T: Display>(message: T) {
        println!("  {} {}", style("→").dim(), message);
    }

    pub fn bullet<T: Display>(message: T) {
        println!("  {} {}", style("•").dim(), message);
    }

    /// Print a section header
    pub fn section<T: Display>(title: T) {
        println!("\n{}", style(title).bold().underlined());
    }

    /// Print a tip/suggestion
    pub fn tip<T: Display>(message: T) {
        println!("{} {}", style("TIP:").cyan(), style(message).dim());
    }

    /// Print a stack as an indented tree under its root
    pub fn stack_tree(stack: &Stack) {
        println!(
            "{} {} {}",
            style(&stack.name).bold(),
            style(format!("({})", stack.hash)).dim(),
            style(format!("on {}", stack.root)).cyan()
        );
        Self::tree_level(stack, &stack.tree, 1);
    }

    fn tree_level(stack: &Stack, tree: &BranchTree, depth: usize) {
        for (name, children) in tree.nodes() {
            let label = match stack.branch(name) {
                Some(branch) => branch_label(branch),
                None => name.clone(),
            };
            println!("{}{} {}", "  ".repeat(depth), style("└").dim(), label);
            Self::tree_level(stack, children, depth + 1);
        }
    }

    /// One line per sync result
    pub fn sync_result(result: &SyncResult) {
        let branch = style(&result.branch).cyan();
        match &result.status {
            SyncStatus::UpToDate => Self::bullet(format!("{branch} is up to date")),
            SyncStatus::Rebased { onto } => Self::success(format!("{branch} rebased onto {onto}")),
            SyncStatus::Reparented { from, to } => {
                Self::success(format!("{branch} moved from merged {from} onto {to}"))
            }
            SyncStatus::Conflict => {
                Self::error(format!("{branch} stopped on conflicts"));
                if let Some(path) = &result.worktree {
                    Self::sub_item(format!("Resolve in {}", path.display()));
                }
            }
            SyncStatus::Failed(message) => Self::error(format!("{branch} failed: {message}")),
            SyncStatus::RebaseInProgress => {
                Self::warning(format!("{branch} has a rebase in progress"));
                if let Some(path) = &result.worktree {
                    Self::sub_item(format!("Finish or abort it in {}", path.display()));
                }
            }
            SyncStatus::Skipped(reason) => Self::bullet(format!("{branch} skipped: {reason}")),
        }
    }
}

fn branch_label(branch: &Branch) -> String {
    let mut label = branch.name.clone();
    if let Some(pr) = branch.pr_number {
        label.push_str(&format!(" #{pr}"));
    }
    if branch.is_merged {
        return style(format!("{label} (merged)")).dim().to_string();
    }
    if branch.is_remote {
        label.push_str(" (remote)");
    }
    if branch.is_reparented() {
        label.push_str(&format!(" → {}", branch.parent));
    }
    label
}
