//! Uninstall command implementation.
use std::sync::Arc;

use anyhow::Result;

use super::{CommandSetup, finish};
use crate::cancel::CancelToken;
use crate::cli::{GlobalOpts, UninstallOpts};
use crate::logging::Logger;
use crate::packages::operations::uninstall_package;
use crate::reconcile::outcome::record;

/// Run the uninstall command.
///
/// # Errors
///
/// Returns an error if setup fails, the lock file is corrupt, or any package
/// failed to uninstall.
pub fn run(
    global: &GlobalOpts,
    opts: &UninstallOpts,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;
    let ctx = &setup.ctx;

    log.stage("Uninstalling packages");
    for name in &opts.packages {
        if let Err(reason) = cancel.check() {
            log.warn(&reason.to_string());
            break;
        }
        let result = uninstall_package(ctx, cancel, name, opts.manager.as_deref())?;
        record(log.as_ref(), &result);
    }
    finish(log)
}
