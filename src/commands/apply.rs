//! Apply command implementation.
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::{CommandSetup, finish, report_pass};
use crate::cancel::CancelToken;
use crate::cli::{ApplyOpts, GlobalOpts};
use crate::dotfiles::apply::filter_from_args;
use crate::engine::{self, ApplyOptions, Scope};
use crate::logging::Logger;

/// Run the apply command.
///
/// # Errors
///
/// Returns an error if setup fails, a fatal error (path validation, corrupt
/// lock file) aborts the run, or any item failed.
pub fn run(
    global: &GlobalOpts,
    opts: &ApplyOpts,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;
    let ctx = &setup.ctx;

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let options = ApplyOptions {
        fail_fast: opts.fail_fast,
        filter: filter_from_args(ctx, &opts.paths, &cwd),
        scope: Scope::from_flags(opts.domains.packages, opts.domains.dotfiles),
    };
    if !options.filter.is_empty() {
        log.debug(&format!("restricted to {} path(s)", opts.paths.len()));
    }

    let report = engine::apply(ctx, &options)?;
    if let Some(pass) = &report.packages {
        report_pass(log.as_ref(), "packages", pass);
    }
    if let Some(pass) = &report.dotfiles {
        report_pass(log.as_ref(), "dotfiles", pass);
    }
    finish(log)
}
