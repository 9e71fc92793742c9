//! Command-line interface definitions.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Parser, Debug)]
#[command(
    name = "dotkeeper",
    about = "Reconcile dotfiles and packages against a config directory",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Shared options.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Config directory (default: $DOTKEEPER_DIR or ~/.config/dotkeeper)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Home directory to manage (default: $HOME)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show managed, missing, drifted and untracked items
    Status(StatusOpts),
    /// Install missing packages and deploy missing or drifted dotfiles
    Apply(ApplyOpts),
    /// Install packages and record them in the lock file
    Install(InstallOpts),
    /// Uninstall packages and remove them from the lock file
    Uninstall(UninstallOpts),
    /// Upgrade managed packages and record their new versions
    Upgrade(UpgradeOpts),
    /// Search package managers
    Search(SearchOpts),
    /// Copy files from home into the config directory
    Add(AddOpts),
    /// Stop managing dotfiles, leaving the files in home
    #[command(alias = "rm")]
    Remove(RemoveOpts),
    /// Show how drifted dotfiles differ from their sources
    Diff(DiffOpts),
    /// Print version information
    Version,
}

/// Domain selection flags shared by `status` and `apply`.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct DomainFlags {
    /// Only packages
    #[arg(long, conflicts_with = "dotfiles")]
    pub packages: bool,

    /// Only dotfiles
    #[arg(long)]
    pub dotfiles: bool,
}

/// Options for the `status` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct StatusOpts {
    /// Domain selection.
    #[command(flatten)]
    pub domains: DomainFlags,

    /// List untracked dotfiles too
    #[arg(long)]
    pub untracked: bool,
}

/// Options for the `apply` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ApplyOpts {
    /// Stop at the first failed item
    #[arg(long)]
    pub fail_fast: bool,

    /// Domain selection.
    #[command(flatten)]
    pub domains: DomainFlags,

    /// Only apply these dotfile destinations (files or directories)
    #[arg(value_name = "PATH")]
    pub paths: Vec<String>,
}

/// Options for the `install` subcommand.
#[derive(Args, Debug, Clone)]
pub struct InstallOpts {
    /// Packages as `name` or `manager:name`
    #[arg(required = true, value_name = "PACKAGE")]
    pub packages: Vec<String>,
}

/// Options for the `uninstall` subcommand.
#[derive(Args, Debug, Clone)]
pub struct UninstallOpts {
    /// Package manager (default: resolved from the lock file)
    #[arg(short, long)]
    pub manager: Option<String>,

    /// Package names
    #[arg(required = true, value_name = "PACKAGE")]
    pub packages: Vec<String>,
}

/// Options for the `upgrade` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct UpgradeOpts {
    /// Packages as `name`, `manager:name` or a manager (default: all)
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,
}

/// Options for the `add` subcommand.
#[derive(Args, Debug, Clone)]
pub struct AddOpts {
    /// Files or directories under home
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<String>,
}

/// Options for the `remove` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RemoveOpts {
    /// Managed destinations (files or directories)
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<String>,
}

/// Options for the `diff` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct DiffOpts {
    /// Only these destinations (default: every drifted dotfile)
    #[arg(value_name = "PATH")]
    pub paths: Vec<String>,
}

/// Options for the `search` subcommand.
#[derive(Args, Debug, Clone)]
pub struct SearchOpts {
    /// Only search this package manager
    #[arg(short, long)]
    pub manager: Option<String>,

    /// Search term
    pub query: String,
}
