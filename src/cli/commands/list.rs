use super::open_manager;
use crate::cli::output::Output;
use crate::errors::Result;

pub fn run() -> Result<()> {
    let manager = open_manager()?;
    let stacks = manager.stacks()?;

    if stacks.is_empty() {
        Output::info("No stacks in this repository");
        Output::tip("Create one with 'ca-stack create <branch>'");
        return Ok(());
    }

    Output::section(format!("Stacks in {}", manager.repo_key()));
    for stack in &stacks {
        Output::stack_tree(stack);
    }
    Ok(())
}
