//! Upgrade command implementation.
use std::sync::Arc;

use anyhow::Result;

use super::{CommandSetup, finish, report_pass};
use crate::cancel::CancelToken;
use crate::cli::{GlobalOpts, UpgradeOpts};
use crate::logging::Logger;
use crate::packages::operations::upgrade_packages;

/// Run the upgrade command.
///
/// # Errors
///
/// Returns an error if setup fails, a target is not managed, the lock file
/// is corrupt, or any package failed to upgrade.
pub fn run(
    global: &GlobalOpts,
    opts: &UpgradeOpts,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;

    log.stage("Upgrading packages");
    let pass = upgrade_packages(&setup.ctx, cancel, &opts.targets)?;
    report_pass(log.as_ref(), "packages", &pass);
    finish(log)
}
