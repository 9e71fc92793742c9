//! Data-driven package manager definitions.
//!
//! Each manager is described by the commands used to list, install,
//! uninstall, upgrade and search packages. Built-in definitions cover `brew`,
//! `cargo`, `gem`, `npm`, `pipx` and `uv`; `[managers.<name>]` tables in
//! `dotkeeper.toml` override individual fields or add new managers.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Placeholder replaced with the package name in install/uninstall commands.
pub const PACKAGE_PLACEHOLDER: &str = "{package}";
/// Placeholder replaced with the query in search commands.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// How the output of a manager's list command is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListParse {
    /// One package per non-indented line: `name [version]`.
    #[default]
    Lines,
    /// JSON object whose `json_field` member maps names to `{ "version": .. }`.
    JsonMap,
    /// JSON array of objects; `json_field` names the package-name key.
    JsonArray,
}

/// How to list installed packages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListDefinition {
    /// Full command line, program first.
    pub command: Vec<String>,
    /// Output format.
    pub parse: ListParse,
    /// JSON member used by the JSON parse modes.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub json_field: String,
}

/// An install, uninstall, upgrade or search command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandDefinition {
    /// Full command line, program first, with a placeholder argument.
    pub command: Vec<String>,
    /// Output fragments that mean "nothing to do" and count as success.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub idempotent_patterns: Vec<String>,
}

impl CommandDefinition {
    fn new(command: &[&str], idempotent: &[&str]) -> Self {
        Self {
            command: command.iter().map(|s| (*s).to_string()).collect(),
            idempotent_patterns: idempotent.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Command line with `placeholder` replaced by `value`.
    #[must_use]
    pub fn render(&self, placeholder: &str, value: &str) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| arg.replace(placeholder, value))
            .collect()
    }
}

/// A package manager described entirely by data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerDefinition {
    /// Binary looked up on `PATH`.
    pub binary: String,
    /// Arguments that make the binary print its version (default `--version`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub version_args: Vec<String>,
    /// One-line description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// How to install the manager itself.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub install_hint: String,
    /// List installed packages.
    pub list: ListDefinition,
    /// Install one package.
    pub install: CommandDefinition,
    /// Uninstall one package.
    pub uninstall: CommandDefinition,
    /// Upgrade one package; empty when unsupported.
    pub upgrade: CommandDefinition,
    /// Search for packages; empty when unsupported.
    pub search: CommandDefinition,
}

impl ManagerDefinition {
    /// Version probe arguments, defaulting to `--version`.
    #[must_use]
    pub fn version_args(&self) -> Vec<&str> {
        if self.version_args.is_empty() {
            vec!["--version"]
        } else {
            self.version_args.iter().map(String::as_str).collect()
        }
    }

    /// Overlay non-empty fields of `other` onto `self`.
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self {
        fn take<T>(dst: &mut Vec<T>, src: Vec<T>) {
            if !src.is_empty() {
                *dst = src;
            }
        }
        fn take_str(dst: &mut String, src: String) {
            if !src.is_empty() {
                *dst = src;
            }
        }
        take_str(&mut self.binary, other.binary);
        take(&mut self.version_args, other.version_args);
        take_str(&mut self.description, other.description);
        take_str(&mut self.install_hint, other.install_hint);
        if !other.list.command.is_empty() {
            self.list = other.list;
        }
        for (dst, src) in [
            (&mut self.install, other.install),
            (&mut self.uninstall, other.uninstall),
            (&mut self.upgrade, other.upgrade),
            (&mut self.search, other.search),
        ] {
            take(&mut dst.command, src.command);
            take(&mut dst.idempotent_patterns, src.idempotent_patterns);
        }
        self
    }
}

fn list(command: &[&str], parse: ListParse, json_field: &str) -> ListDefinition {
    ListDefinition {
        command: command.iter().map(|s| (*s).to_string()).collect(),
        parse,
        json_field: json_field.to_string(),
    }
}

fn manager(
    binary: &str,
    description: &str,
    install_hint: &str,
    list: ListDefinition,
    commands: [CommandDefinition; 4],
) -> ManagerDefinition {
    let [install, uninstall, upgrade, search] = commands;
    ManagerDefinition {
        binary: binary.to_string(),
        version_args: Vec::new(),
        description: description.to_string(),
        install_hint: install_hint.to_string(),
        list,
        install,
        uninstall,
        upgrade,
        search,
    }
}

/// Built-in manager definitions keyed by name.
#[must_use]
pub fn builtin_managers() -> BTreeMap<String, ManagerDefinition> {
    let none = || CommandDefinition::default();
    let defs = [
        (
            "brew",
            manager(
                "brew",
                "Homebrew (macOS/Linux package manager)",
                "Visit https://brew.sh for installation instructions",
                list(&["brew", "list", "--versions"], ListParse::Lines, ""),
                [
                    CommandDefinition::new(&["brew", "install", "{package}"], &["already installed"]),
                    CommandDefinition::new(&["brew", "uninstall", "{package}"], &["no such keg"]),
                    CommandDefinition::new(&["brew", "upgrade", "{package}"], &["already up-to-date"]),
                    CommandDefinition::new(&["brew", "search", "{query}"], &[]),
                ],
            ),
        ),
        (
            "cargo",
            manager(
                "cargo",
                "Cargo (Rust package manager)",
                "Install Rust from https://rustup.rs/",
                list(&["cargo", "install", "--list"], ListParse::Lines, ""),
                [
                    CommandDefinition::new(
                        &["cargo", "install", "{package}"],
                        &["already exists", "already installed"],
                    ),
                    CommandDefinition::new(
                        &["cargo", "uninstall", "{package}"],
                        &["did not match any packages"],
                    ),
                    CommandDefinition::new(&["cargo", "install", "--force", "{package}"], &[]),
                    CommandDefinition::new(&["cargo", "search", "{query}"], &[]),
                ],
            ),
        ),
        (
            "gem",
            manager(
                "gem",
                "gem (Ruby package manager)",
                "Install Ruby from https://ruby-lang.org/",
                list(&["gem", "list", "--local"], ListParse::Lines, ""),
                [
                    CommandDefinition::new(
                        &["gem", "install", "{package}", "--user-install"],
                        &["already installed"],
                    ),
                    CommandDefinition::new(&["gem", "uninstall", "{package}", "-x"], &[]),
                    CommandDefinition::new(&["gem", "update", "{package}", "--user-install"], &["nothing to update"]),
                    CommandDefinition::new(&["gem", "search", "{query}"], &[]),
                ],
            ),
        ),
        (
            "npm",
            manager(
                "npm",
                "npm (Node.js package manager)",
                "Install Node.js from https://nodejs.org/",
                list(
                    &["npm", "list", "-g", "--depth=0", "--json"],
                    ListParse::JsonMap,
                    "dependencies",
                ),
                [
                    CommandDefinition::new(&["npm", "install", "-g", "{package}"], &["already installed"]),
                    CommandDefinition::new(
                        &["npm", "uninstall", "-g", "{package}"],
                        &["not installed", "not found"],
                    ),
                    CommandDefinition::new(&["npm", "update", "-g", "{package}"], &["up to date"]),
                    CommandDefinition::new(&["npm", "search", "--parseable", "{query}"], &[]),
                ],
            ),
        ),
        (
            "pipx",
            manager(
                "pipx",
                "pipx (isolated Python applications)",
                "Install pipx from https://pipx.pypa.io/",
                list(&["pipx", "list", "--short"], ListParse::Lines, ""),
                [
                    CommandDefinition::new(&["pipx", "install", "{package}"], &["already installed"]),
                    CommandDefinition::new(&["pipx", "uninstall", "{package}"], &["not installed"]),
                    CommandDefinition::new(&["pipx", "upgrade", "{package}"], &["already at latest"]),
                    none(),
                ],
            ),
        ),
        (
            "uv",
            manager(
                "uv",
                "uv (Python package manager)",
                "Install uv from https://docs.astral.sh/uv/",
                list(&["uv", "tool", "list"], ListParse::Lines, ""),
                [
                    CommandDefinition::new(&["uv", "tool", "install", "{package}"], &["already installed"]),
                    CommandDefinition::new(&["uv", "tool", "uninstall", "{package}"], &[]),
                    CommandDefinition::new(&["uv", "tool", "upgrade", "{package}"], &["nothing to upgrade"]),
                    none(),
                ],
            ),
        ),
    ];
    defs.into_iter()
        .map(|(name, def)| (name.to_string(), def))
        .collect()
}

/// Built-ins with `overrides` applied: existing names are merged field by
/// field, new names are added as-is.
#[must_use]
pub fn merge_definitions(
    overrides: &BTreeMap<String, ManagerDefinition>,
) -> BTreeMap<String, ManagerDefinition> {
    let mut defs = builtin_managers();
    for (name, def) in overrides {
        let merged = match defs.remove(name) {
            Some(base) => base.merged(def.clone()),
            None => def.clone(),
        };
        defs.insert(name.clone(), merged);
    }
    defs
}
