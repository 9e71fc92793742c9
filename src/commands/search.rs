//! Search command implementation.
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::CommandSetup;
use crate::cancel::CancelToken;
use crate::cli::{GlobalOpts, SearchOpts};
use crate::logging::Logger;
use crate::packages::operations::{SearchResult, search_packages};

/// Lines to print for a set of search results.
#[must_use]
pub fn render(query: &str, results: &[SearchResult]) -> Vec<String> {
    let mut lines = Vec::new();
    for result in results {
        if let Some(error) = &result.error {
            lines.push(format!("{}: search failed: {error}", result.manager));
        } else if result.packages.is_empty() {
            lines.push(format!("{}: no matches", result.manager));
        } else {
            lines.push(format!("{}:", result.manager));
            lines.extend(result.packages.iter().map(|p| format!("  {p}")));
        }
    }
    if lines.is_empty() {
        lines.push(format!("no package manager could search for '{query}'"));
    }
    lines
}

/// Run the search command.
///
/// # Errors
///
/// Returns an error if setup fails, the requested manager is unknown or
/// unavailable, or the search was interrupted.
pub fn run(
    global: &GlobalOpts,
    opts: &SearchOpts,
    log: &Arc<Logger>,
    cancel: &CancelToken,
) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;
    let results = search_packages(&setup.ctx, cancel, &opts.query, opts.manager.as_deref())
        .with_context(|| format!("search for '{}' failed", opts.query))?;
    for line in render(&opts.query, &results) {
        log.info(&line);
    }
    Ok(())
}
