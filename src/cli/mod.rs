pub mod commands;
pub mod output;

use crate::errors::Result;
use crate::utils::async_ops::run_blocking;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ca-stack")]
#[command(about = "Stacked branches in git worktrees, kept rebased on their parents")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a branch in a new worktree on top of a parent
    Create {
        /// Name of the new branch
        name: String,
        /// Parent branch (defaults to git.default_branch)
        #[arg(long, short)]
        parent: Option<String>,
    },

    /// Start tracking an existing branch
    Track {
        /// Branch to track
        name: String,
        /// Parent branch (defaults to git.default_branch)
        #[arg(long, short)]
        parent: Option<String>,
        /// Someone else's branch, with no local worktree
        #[arg(long)]
        remote: bool,
        /// Pull request number of the branch
        #[arg(long)]
        pr: Option<u64>,
    },

    /// Delete a branch, its worktree and its tracking
    Delete {
        name: String,
        /// Delete even with children or unmerged commits
        #[arg(long, short)]
        force: bool,
    },

    /// Stop tracking a branch, leaving git untouched
    Untrack { name: String },

    /// Mark a branch as merged and remove its worktree
    Merged { name: String },

    /// Move a branch (and its descendants) under a new parent
    Move {
        name: String,
        new_parent: String,
        /// Only change tracking, do not rebase
        #[arg(long)]
        no_rebase: bool,
    },

    /// Link a branch to its pull request
    Pr {
        branch: String,
        number: u64,
        #[arg(long)]
        url: Option<String>,
    },

    /// Rebase branches onto their parents, following merged parents
    Sync {
        /// Sync only this branch
        branch: Option<String>,
        /// Sync every stack in the repository
        #[arg(long, conflicts_with = "branch")]
        all: bool,
        /// Skip fetching the remote first
        #[arg(long)]
        no_fetch: bool,
    },

    /// Rebase every descendant of a branch onto it
    Restack {
        /// Branch whose descendants move (defaults to the current branch)
        branch: Option<String>,
    },

    /// Reconcile tracking with renamed branches and vanished worktrees
    Repair {
        /// Report without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show stacks in this repository
    List,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., git.default_branch)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        self.setup_logging();

        // The core is synchronous; hosting lookups re-enter this runtime
        let runtime = tokio::runtime::Handle::current();

        match self.command {
            Commands::Config { action } => run_blocking(move || commands::config::run(action)).await,
            Commands::Create { name, parent } => {
                run_blocking(move || commands::branch::create(&name, parent.as_deref())).await
            }
            Commands::Track {
                name,
                parent,
                remote,
                pr,
            } => {
                run_blocking(move || commands::branch::track(&name, parent.as_deref(), remote, pr))
                    .await
            }
            Commands::Delete { name, force } => {
                run_blocking(move || commands::branch::delete(&name, force)).await
            }
            Commands::Untrack { name } => run_blocking(move || commands::branch::untrack(&name)).await,
            Commands::Merged { name } => run_blocking(move || commands::branch::merged(&name)).await,
            Commands::Move {
                name,
                new_parent,
                no_rebase,
            } => {
                run_blocking(move || commands::branch::reparent(&name, &new_parent, !no_rebase))
                    .await
            }
            Commands::Pr { branch, number, url } => {
                run_blocking(move || commands::branch::link_pr(&branch, number, url)).await
            }
            Commands::Sync {
                branch,
                all,
                no_fetch,
            } => {
                run_blocking(move || commands::sync::sync(branch, all, !no_fetch, runtime)).await
            }
            Commands::Restack { branch } => {
                run_blocking(move || commands::sync::restack(branch)).await
            }
            Commands::Repair { dry_run } => {
                run_blocking(move || commands::repair::run(dry_run)).await
            }
            Commands::List => run_blocking(commands::list::run).await,
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .without_time();

        if self.no_color {
            console::set_colors_enabled(false);
            subscriber.with_ansi(false).init();
        } else {
            subscriber.init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_flags() {
        let cli = Cli::try_parse_from(["ca-stack", "sync", "--all", "--no-fetch"]).unwrap();
        match cli.command {
            Commands::Sync {
                branch,
                all,
                no_fetch,
            } => {
                assert!(branch.is_none());
                assert!(all);
                assert!(no_fetch);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_sync_branch_conflicts_with_all() {
        assert!(Cli::try_parse_from(["ca-stack", "sync", "feature", "--all"]).is_err());
    }

    #[test]
    fn test_parse_track_remote() {
        let cli = Cli::try_parse_from([
            "ca-stack", "track", "theirs", "--parent", "feature", "--remote", "--pr", "42",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Track { remote: true, pr: Some(42), .. }
        ));
    }
}
