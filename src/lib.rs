//! Dotfile and package reconciliation engine.
//!
//! Compares what a config directory declares (dotfile sources and a lock
//! file of packages) with what a machine actually has (files in the home
//! directory, packages reported by external package managers), then
//! applies the difference. Runs are idempotent: a second apply with nothing
//! changed performs no writes and installs nothing.
//!
//! The public API is organised into layers:
//!
//! - **[`reconcile`]**: the domain-neutral item model and reconciler
//! - **[`dotfiles`]** and **[`packages`]**: per-domain adapters, apply logic
//!   and the collaborators they drive (templates, package managers)
//! - **[`lock`]**: versioned persistence of the declared package set
//! - **[`engine`]**: reconcile and apply across both domains, with the
//!   [`hooks`] configured around an apply
//! - **[`commands`]**: top-level subcommand orchestration
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cancel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod dotfiles;
pub mod engine;
pub mod error;
pub mod exec;
pub mod hooks;
pub mod lock;
pub mod logging;
pub mod packages;
pub mod reconcile;
