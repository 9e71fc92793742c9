//! Remove command implementation.
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::{CommandSetup, finish, report_pass};
use crate::cancel::CancelToken;
use crate::cli::{GlobalOpts, RemoveOpts};
use crate::dotfiles::manage::remove_dotfiles;
use crate::logging::Logger;

/// Run the remove command. Files in home are left in place.
///
/// # Errors
///
/// Returns an error if setup fails, the config directory cannot be scanned,
/// or any source could not be deleted.
pub fn run(
    global: &GlobalOpts,
    opts: &RemoveOpts,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;
    let cwd = std::env::current_dir().context("failed to read current directory")?;

    log.stage("Removing dotfiles");
    let pass = remove_dotfiles(&setup.ctx, cancel, &opts.paths, &cwd)?;
    report_pass(log.as_ref(), "dotfiles", &pass);
    finish(log)
}
