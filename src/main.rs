//! `dotkeeper` command-line entry point.
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use dotkeeper::cancel::CancelToken;
use dotkeeper::cli::{self, Command};
use dotkeeper::commands;
use dotkeeper::logging::{self, Logger};

#[allow(clippy::print_stdout)]
fn print_version() {
    let version = option_env!("DOTKEEPER_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    println!("dotkeeper {version}");
}

const fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Status(_) => "status",
        Command::Apply(_) => "apply",
        Command::Install(_) => "install",
        Command::Uninstall(_) => "uninstall",
        Command::Upgrade(_) => "upgrade",
        Command::Search(_) => "search",
        Command::Add(_) => "add",
        Command::Remove(_) => "remove",
        Command::Diff(_) => "diff",
        Command::Version => "version",
    }
}

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    if matches!(args.command, Command::Version) {
        print_version();
        return Ok(());
    }

    let name = command_name(&args.command);
    logging::init_subscriber(args.verbose, name);
    let log = Arc::new(Logger::new(name));

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        log.debug(&format!("could not install Ctrl-C handler: {e}"));
    }

    match &args.command {
        Command::Status(opts) => commands::status::run(&args.global, opts, &log, &cancel),
        Command::Apply(opts) => commands::apply::run(&args.global, opts, &log, &cancel),
        Command::Install(opts) => commands::install::run(&args.global, opts, &log, &cancel),
        Command::Uninstall(opts) => commands::uninstall::run(&args.global, opts, &log, &cancel),
        Command::Upgrade(opts) => commands::upgrade::run(&args.global, opts, &log, &cancel),
        Command::Search(opts) => commands::search::run(&args.global, opts, &log, &cancel),
        Command::Add(opts) => commands::add::run(&args.global, opts, &log, &cancel),
        Command::Remove(opts) => commands::remove::run(&args.global, opts, &log, &cancel),
        Command::Diff(opts) => commands::diff::run(&args.global, opts, &log, &cancel),
        Command::Version => Ok(()),
    }
}
