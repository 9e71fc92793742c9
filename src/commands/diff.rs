//! Diff command implementation.
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};

use super::CommandSetup;
use crate::cancel::CancelToken;
use crate::cli::{DiffOpts, GlobalOpts};
use crate::dotfiles::apply::filter_from_args;
use crate::dotfiles::diff::diff_dotfiles;
use crate::logging::Logger;

/// Run the diff command.
///
/// # Errors
///
/// Returns an error if setup fails, a requested path is not drifted, or the
/// diff tool fails.
pub fn run(
    global: &GlobalOpts,
    opts: &DiffOpts,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;
    let ctx = &setup.ctx;
    let cwd = std::env::current_dir().context("failed to read current directory")?;

    let diffs = diff_dotfiles(ctx, cancel, &filter_from_args(ctx, &opts.paths, &cwd))?;
    if diffs.is_empty() {
        if !opts.paths.is_empty() {
            bail!("dotfile not found or not drifted: {}", opts.paths.join(", "));
        }
        log.info("no drifted dotfiles found");
        return Ok(());
    }
    for diff in &diffs {
        log.stage(&diff.destination);
        for line in diff.output.lines() {
            log.info(line);
        }
    }
    Ok(())
}
