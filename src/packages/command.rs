//! Data-driven [`PackageManager`] over a [`ManagerDefinition`].
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::classify::{self, CommandOutcome, Operation};
use super::{InstalledPackage, PackageManager};
use crate::cancel::CancelToken;
use crate::config::managers::{
    CommandDefinition, ListParse, ManagerDefinition, PACKAGE_PLACEHOLDER, QUERY_PLACEHOLDER,
};
use crate::error::{ExecError, PackageError};
use crate::exec::{ExecResult, Executor};

/// Deadlines applied inside a [`CommandManager`]. Install, uninstall and
/// upgrade deadlines are set by the caller on the token it passes in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerTimeouts {
    /// Availability probe.
    pub availability: Option<Duration>,
    /// List and search.
    pub operation: Option<Duration>,
}

/// Package manager driven entirely by its definition's command lines.
#[derive(Debug, Clone)]
pub struct CommandManager {
    name: String,
    definition: ManagerDefinition,
    executor: Arc<dyn Executor>,
    timeouts: ManagerTimeouts,
}

fn limited(cancel: &CancelToken, timeout: Option<Duration>) -> CancelToken {
    timeout.map_or_else(|| cancel.clone(), |t| cancel.with_timeout(t))
}

impl CommandManager {
    /// Create a manager named `name`.
    #[must_use]
    pub fn new(
        name: &str,
        definition: ManagerDefinition,
        executor: Arc<dyn Executor>,
        timeouts: ManagerTimeouts,
    ) -> Self {
        Self {
            name: name.to_string(),
            definition,
            executor,
            timeouts,
        }
    }

    /// The definition this manager runs.
    #[must_use]
    pub const fn definition(&self) -> &ManagerDefinition {
        &self.definition
    }

    fn exec(
        &self,
        cancel: &CancelToken,
        command: &[String],
        operation: &str,
    ) -> Result<ExecResult, PackageError> {
        let Some((program, args)) = command.split_first() else {
            return Err(PackageError::Unsupported {
                manager: self.name.clone(),
                operation: operation.to_string(),
            });
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!("{}: {program} {}", self.name, args.join(" "));
        self.executor
            .run_unchecked(cancel, program, &args)
            .map_err(|e| PackageError::from_exec(&self.name, e))
    }

    fn mutate(
        &self,
        cancel: &CancelToken,
        operation: Operation,
        def: &CommandDefinition,
        package: &str,
    ) -> Result<CommandOutcome, PackageError> {
        let command = def.render(PACKAGE_PLACEHOLDER, package);
        let result = self.exec(cancel, &command, &operation.to_string())?;
        let outcome = classify::interpret(
            &self.name,
            operation,
            package,
            &result,
            &def.idempotent_patterns,
        )?;
        tracing::debug!(
            "{} {operation} {package}: exit {} ({})",
            self.name,
            outcome.exit_code,
            outcome.class
        );
        Ok(outcome)
    }

    fn parse_error(&self, message: impl Into<String>) -> PackageError {
        PackageError::Parse {
            manager: self.name.clone(),
            message: message.into(),
        }
    }
}

impl PackageManager for CommandManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self, cancel: &CancelToken) -> Result<bool, PackageError> {
        if self.executor.which(&self.definition.binary).is_none() {
            tracing::debug!("{}: {} not on PATH", self.name, self.definition.binary);
            return Ok(false);
        }
        let probe = limited(cancel, self.timeouts.availability);
        match self.executor.run_unchecked(
            &probe,
            &self.definition.binary,
            &self.definition.version_args(),
        ) {
            Ok(result) => Ok(result.success),
            Err(ExecError::Interrupted { reason, .. }) => Err(PackageError::Interrupted {
                manager: self.name.clone(),
                reason,
            }),
            Err(e) => {
                tracing::debug!("{}: version probe failed: {e}", self.name);
                Ok(false)
            }
        }
    }

    fn list_installed(&self, cancel: &CancelToken) -> Result<Vec<InstalledPackage>, PackageError> {
        let token = limited(cancel, self.timeouts.operation);
        let list = &self.definition.list;
        let result = self.exec(&token, &list.command, "list")?;
        if !result.success && result.stdout.trim().is_empty() {
            return Err(PackageError::Exec {
                manager: self.name.clone(),
                message: format!(
                    "list exited with {}: {}",
                    result.code.unwrap_or(-1),
                    result.stderr.trim()
                ),
            });
        }
        match list.parse {
            ListParse::Lines => Ok(parse_lines(&result.stdout)),
            ListParse::JsonMap => {
                parse_json_map(&result.stdout, &list.json_field).map_err(|m| self.parse_error(m))
            }
            ListParse::JsonArray => parse_json_array(&result.stdout, &list.json_field)
                .map_err(|m| self.parse_error(m)),
        }
    }

    fn install(&self, cancel: &CancelToken, name: &str) -> Result<CommandOutcome, PackageError> {
        self.mutate(cancel, Operation::Install, &self.definition.install, name)
    }

    fn uninstall(&self, cancel: &CancelToken, name: &str) -> Result<CommandOutcome, PackageError> {
        self.mutate(cancel, Operation::Uninstall, &self.definition.uninstall, name)
    }

    fn upgrade(&self, cancel: &CancelToken, name: &str) -> Result<CommandOutcome, PackageError> {
        self.mutate(cancel, Operation::Upgrade, &self.definition.upgrade, name)
    }

    fn search(&self, cancel: &CancelToken, query: &str) -> Result<Vec<String>, PackageError> {
        let token = limited(cancel, self.timeouts.operation);
        let command = self.definition.search.render(QUERY_PLACEHOLDER, query);
        let result = self.exec(&token, &command, "search")?;
        if !result.success {
            // Most managers exit non-zero for "no results".
            if result.stdout.trim().is_empty() {
                return Ok(Vec::new());
            }
            return Err(PackageError::Exec {
                manager: self.name.clone(),
                message: result.stderr.trim().to_string(),
            });
        }
        Ok(parse_search(&result.stdout))
    }
}

/// Strip decoration from a version token: `(1.2.3)`, `v1.2.3:`, `default: 1.2`.
fn clean_version(raw: &str) -> Option<String> {
    let v = raw
        .trim_matches(|c: char| c == '(' || c == ')' || c == ':' || c == ',')
        .trim_start_matches("default: ");
    let v = v.strip_prefix('v').filter(|r| r.starts_with(|c: char| c.is_ascii_digit())).unwrap_or(v);
    (!v.is_empty()).then(|| v.to_string())
}

/// `name [version...]` per line; indented, bulleted and header lines are
/// skipped.
fn parse_lines(stdout: &str) -> Vec<InstalledPackage> {
    let mut out = Vec::new();
    for line in stdout.lines() {
        if line.trim().is_empty() || line.starts_with(char::is_whitespace) {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else { continue };
        if name.starts_with(['-', '*', '=', '#']) || name.ends_with(':') {
            continue;
        }
        let rest: Vec<&str> = tokens.collect();
        let version = rest
            .iter()
            .map(|t| t.trim_start_matches('('))
            .find(|t| *t != "default:" && !t.is_empty())
            .and_then(clean_version);
        out.push(InstalledPackage {
            name: name.to_string(),
            version,
        });
    }
    out
}

fn parse_json(stdout: &str) -> Result<Value, String> {
    if stdout.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(stdout).map_err(|e| e.to_string())
}

/// `{ <field>: { name: { "version": ".." } } }`; an empty field means the
/// root object.
fn parse_json_map(stdout: &str, field: &str) -> Result<Vec<InstalledPackage>, String> {
    let root = parse_json(stdout)?;
    let map = if field.is_empty() { &root } else { &root[field] };
    let Some(map) = map.as_object() else {
        return match map {
            Value::Null => Ok(Vec::new()),
            _ => Err(format!("expected an object at '{field}'")),
        };
    };
    Ok(map
        .iter()
        .map(|(name, info)| InstalledPackage {
            name: name.clone(),
            version: info["version"].as_str().map(str::to_string),
        })
        .collect())
}

/// `[ { <field>: name, "version": ".." } ]`; field defaults to `name`.
fn parse_json_array(stdout: &str, field: &str) -> Result<Vec<InstalledPackage>, String> {
    let root = parse_json(stdout)?;
    let key = if field.is_empty() { "name" } else { field };
    let Some(items) = root.as_array() else {
        return match root {
            Value::Null => Ok(Vec::new()),
            _ => Err("expected a JSON array".to_string()),
        };
    };
    Ok(items
        .iter()
        .filter_map(|item| {
            let name = item[key].as_str()?;
            Some(InstalledPackage {
                name: name.to_string(),
                version: item["version"].as_str().map(str::to_string),
            })
        })
        .collect())
}

/// First token of each result line.
fn parse_search(stdout: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(['=', '#', '.', '-']) || line.starts_with("No ") {
            continue;
        }
        let Some(name) = line.split_whitespace().next() else {
            continue;
        };
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}
