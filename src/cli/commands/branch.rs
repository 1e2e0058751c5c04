use super::open_manager;
use crate::cli::output::Output;
use crate::errors::Result;
use console::style;

pub fn create(name: &str, parent: Option<&str>) -> Result<()> {
    let manager = open_manager()?;
    let branch = manager.create_branch(name, parent)?;

    Output::success(format!("Created branch '{}' on '{}'", branch.name, branch.parent));
    if let Some(path) = &branch.worktree_path {
        Output::sub_item(format!("Worktree: {}", style(path.display()).cyan()));
    }
    Output::sub_item(format!("Stack: {}", style(&branch.stack_hash).dim()));
    Ok(())
}

pub fn track(name: &str, parent: Option<&str>, remote: bool, pr: Option<u64>) -> Result<()> {
    let manager = open_manager()?;
    let parent = parent.unwrap_or(&manager.settings().git.default_branch).to_string();

    let branch = if remote {
        manager.register_remote_branch(name, &parent, pr, None)?
    } else {
        let branch = manager.register_branch(name, &parent, None)?;
        if let Some(number) = pr {
            manager.set_pull_request(name, number, None)?;
        }
        branch
    };

    Output::success(format!("Tracking '{}' on '{}'", branch.name, branch.parent));
    if branch.worktree_path.is_none() && !branch.is_remote {
        Output::warning("No worktree found for this branch; it will be rebased in the main worktree");
    }
    Ok(())
}

pub fn delete(name: &str, force: bool) -> Result<()> {
    let manager = open_manager()?;
    manager.delete_branch(name, force)?;
    Output::success(format!("Deleted '{name}'"));
    Ok(())
}

pub fn untrack(name: &str) -> Result<()> {
    let manager = open_manager()?;
    manager.untrack_branch(name)?;
    Output::success(format!("Stopped tracking '{name}'"));
    Output::sub_item("The branch and its worktree were left in place");
    Ok(())
}

pub fn merged(name: &str) -> Result<()> {
    let manager = open_manager()?;
    manager.mark_merged(name)?;
    Output::success(format!("Marked '{name}' as merged"));
    Output::tip("Run 'ca-stack sync' to move its children onto their new parent");
    Ok(())
}

pub fn reparent(name: &str, new_parent: &str, rebase: bool) -> Result<()> {
    let manager = open_manager()?;
    let branch = manager.reparent_branch(name, new_parent, rebase)?;

    Output::success(format!("Moved '{}' onto '{}'", branch.name, branch.parent));
    if !rebase {
        Output::sub_item("Tracking only; run 'ca-stack sync' to rebase");
    }
    Ok(())
}

pub fn link_pr(branch: &str, number: u64, url: Option<String>) -> Result<()> {
    let manager = open_manager()?;
    manager.set_pull_request(branch, number, url)?;
    Output::success(format!("Linked '{branch}' to pull request #{number}"));
    Ok(())
}
