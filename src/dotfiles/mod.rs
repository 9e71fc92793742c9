//! Dotfile domain: path mapping, scanning, templates, comparison and
//! deployment of files from the config directory into home.
//!
//! A source `zshrc` in the config directory maps to `~/.zshrc`; a source
//! `config/nvim/init.lua` maps to `~/.config/nvim/init.lua`. Sources ending
//! in `.tmpl` are rendered before comparison and deployment.
pub mod apply;
pub mod atomic;
pub mod compare;
pub mod deploy;
pub mod diff;
pub mod filter;
pub mod manage;
pub mod paths;
pub mod provider;
pub mod scanner;
pub mod template;
