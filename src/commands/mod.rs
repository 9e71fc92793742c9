//! Subcommand orchestration: build a [`Context`], call the engine, report.
pub mod add;
pub mod apply;
pub mod diff;
pub mod install;
pub mod remove;
pub mod search;
pub mod status;
pub mod uninstall;
pub mod upgrade;

use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cancel::CancelToken;
use crate::cli::GlobalOpts;
use crate::config::Config;
use crate::context::{Context, resolve_paths};
use crate::exec::SystemExecutor;
use crate::logging::{Log, Logger};
use crate::reconcile::ApplyResult;

/// Shared state produced by the common command setup sequence.
///
/// Resolves the home and config directories, loads `dotkeeper.toml` and
/// reports its validation warnings so that each command does not have to
/// repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Context for the engine.
    pub ctx: Context,
}

impl CommandSetup {
    /// Resolve paths, load configuration and build the context.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or the
    /// configuration file fails to parse.
    pub fn init(global: &GlobalOpts, log: &Arc<Logger>, cancel: &CancelToken) -> Result<Self> {
        let paths = resolve_paths(global.home.clone(), global.config_dir.clone())?;
        log.debug(&format!("home: {}", paths.home().display()));
        log.debug(&format!("config: {}", paths.config_dir().display()));

        let config = Config::load(paths.config_dir()).with_context(|| {
            format!(
                "failed to load configuration from {}",
                paths.config_dir().display()
            )
        })?;
        let warnings = config.validate();
        if !warnings.is_empty() {
            log.warn(&format!(
                "found {} configuration warning(s):",
                warnings.len()
            ));
            for warning in &warnings {
                log.warn(&format!("  [{}]: {}", warning.item, warning.message));
            }
        }

        let sink: Arc<dyn Log> = log.clone();
        let ctx = Context::new(
            config,
            paths,
            sink,
            Arc::new(SystemExecutor),
            global.dry_run,
        )
        .with_cancel(cancel.clone());
        if ctx.dry_run {
            log.dry_run("no changes will be made");
        }
        Ok(Self { ctx })
    }
}

/// Log a pass's totals and why it stopped early, if it did. Per-item lines
/// and warnings were already logged as the pass ran.
pub fn report_pass(log: &dyn Log, name: &str, pass: &ApplyResult) {
    if let Some(reason) = &pass.stopped {
        log.warn(&format!("{name}: {reason}"));
    }
    log.info(&format!("{name}: {}", pass.summary));
}

/// Print the summary and bail if any recorded action failed.
///
/// # Errors
///
/// Returns an error if one or more items failed.
pub fn finish(log: &Logger) -> Result<()> {
    log.print_summary();
    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} item(s) failed");
    }
    Ok(())
}
