//! Add command implementation.
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::{CommandSetup, finish, report_pass};
use crate::cancel::CancelToken;
use crate::cli::{AddOpts, GlobalOpts};
use crate::dotfiles::manage::add_dotfiles;
use crate::logging::Logger;

/// Run the add command.
///
/// # Errors
///
/// Returns an error if setup fails or any file could not be added.
pub fn run(
    global: &GlobalOpts,
    opts: &AddOpts,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;
    let cwd = std::env::current_dir().context("failed to read current directory")?;

    log.stage("Adding dotfiles");
    let pass = add_dotfiles(&setup.ctx, cancel, &opts.paths, &cwd)?;
    report_pass(log.as_ref(), "dotfiles", &pass);
    finish(log)
}
