//! Install command implementation.
use std::sync::Arc;

use anyhow::Result;

use super::{CommandSetup, finish};
use crate::cancel::CancelToken;
use crate::cli::{GlobalOpts, InstallOpts};
use crate::logging::Logger;
use crate::packages::operations::install_package;
use crate::reconcile::outcome::record;

/// Run the install command.
///
/// # Errors
///
/// Returns an error if setup fails, the lock file is corrupt, or any package
/// failed to install.
pub fn run(
    global: &GlobalOpts,
    opts: &InstallOpts,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;
    let ctx = &setup.ctx;

    log.stage("Installing packages");
    for spec in &opts.packages {
        if let Err(reason) = cancel.check() {
            log.warn(&reason.to_string());
            break;
        }
        let result = install_package(ctx, cancel, spec, None)?;
        record(log.as_ref(), &result);
    }
    finish(log)
}
