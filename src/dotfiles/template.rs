//! Template rendering for `.tmpl` dotfile sources.
//!
//! Templates use a small Go-template-compatible subset: `{{ .key }}` and
//! dotted lookups such as `{{ .git.email }}`, `{{-` / `-}}` whitespace
//! trimming and `{{/* comments */}}`. Variables come from
//! `.dotkeeper/local.yaml` inside the config directory. Rendering always
//! produces an in-memory buffer; nothing is written to disk here.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use serde_yaml::{Mapping, Value};
use walkdir::WalkDir;

use crate::error::TemplateError;

/// Source file suffix marking a template.
pub const TEMPLATE_SUFFIX: &str = ".tmpl";

/// Variables file, relative to the config directory.
pub const VARS_FILE: &str = ".dotkeeper/local.yaml";

/// Template-rendering collaborator consumed by the comparator and deployer.
pub trait TemplateProcessor: Send + Sync + std::fmt::Debug {
    /// Returns `true` if `path` is a template source.
    fn is_template(&self, path: &Path) -> bool;

    /// Render the template at `path` into a byte buffer.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if the template or the variables file cannot
    /// be read, or a referenced variable is missing.
    fn render_to_bytes(&self, path: &Path) -> Result<Vec<u8>, TemplateError>;

    /// Destination name for a template source (suffix stripped).
    fn template_name(&self, name: &str) -> String;

    /// Config-relative paths of every template source. Hidden top-level
    /// entries, including the metadata directory, are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be walked.
    fn list_templates(&self) -> Result<Vec<String>>;

    /// Check that the template renders with the current variables.
    ///
    /// # Errors
    ///
    /// Same as [`render_to_bytes`](Self::render_to_bytes).
    fn validate_template(&self, path: &Path) -> Result<(), TemplateError> {
        self.render_to_bytes(path).map(drop)
    }
}

/// Extract the variable name from a missing-variable error message.
#[must_use]
pub fn missing_variable_from_message(message: &str) -> Option<String> {
    let rest = message.split("requires variable '").nth(1)?;
    let end = rest.find('\'')?;
    rest.get(..end).map(str::to_string)
}

/// Returns `true` if `name` ends with `.tmpl` (case-insensitive).
#[must_use]
pub fn has_template_suffix(name: &str) -> bool {
    name.len() > TEMPLATE_SUFFIX.len()
        && name
            .get(name.len() - TEMPLATE_SUFFIX.len()..)
            .is_some_and(|s| s.eq_ignore_ascii_case(TEMPLATE_SUFFIX))
}

/// Strip the `.tmpl` suffix if present.
#[must_use]
pub fn strip_template_suffix(name: &str) -> &str {
    if has_template_suffix(name) {
        name.get(..name.len() - TEMPLATE_SUFFIX.len()).unwrap_or(name)
    } else {
        name
    }
}

/// Template processor backed by `.dotkeeper/local.yaml`.
#[derive(Debug)]
pub struct LocalTemplates {
    config_dir: PathBuf,
    vars: OnceLock<Result<Mapping, String>>,
}

impl LocalTemplates {
    /// Processor for templates under `config_dir`. Variables are loaded on
    /// first use.
    #[must_use]
    pub fn new(config_dir: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            vars: OnceLock::new(),
        }
    }

    fn vars_path(&self) -> PathBuf {
        self.config_dir.join(VARS_FILE)
    }

    fn variables(&self) -> Result<&Mapping, TemplateError> {
        self.vars
            .get_or_init(|| load_variables(&self.vars_path()))
            .as_ref()
            .map_err(|message| TemplateError::Variables {
                path: self.vars_path(),
                message: message.clone(),
            })
    }
}

fn load_variables(path: &Path) -> Result<Mapping, String> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Mapping::new()),
        Err(e) => return Err(e.to_string()),
    };
    if text.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(&text).map_err(|e| e.to_string())? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => Err("top level must be a mapping".to_string()),
    }
}

impl TemplateProcessor for LocalTemplates {
    fn is_template(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|n| has_template_suffix(&n.to_string_lossy()))
    }

    fn render_to_bytes(&self, path: &Path) -> Result<Vec<u8>, TemplateError> {
        let text = fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let vars = self.variables()?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        render(&name, &text, vars).map(String::into_bytes)
    }

    fn template_name(&self, name: &str) -> String {
        strip_template_suffix(name).to_string()
    }

    fn list_templates(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let walker = WalkDir::new(&self.config_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() != 1 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.config_dir)?
                .to_string_lossy()
                .replace('\\', "/");
            if has_template_suffix(&rel) {
                out.push(rel);
            }
        }
        Ok(out)
    }
}

/// Render `text` with `vars`. `name` identifies the template in errors.
///
/// # Errors
///
/// Returns [`TemplateError::Parse`] for unterminated or unsupported actions,
/// [`TemplateError::MissingVariable`] for undefined keys and
/// [`TemplateError::NonScalar`] for list or map values.
pub fn render(name: &str, text: &str, vars: &Mapping) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut consumed = 0usize;
    let mut trim_next = false;

    while let Some(open) = rest.find("{{") {
        let (before, after_open) = rest.split_at(open);
        let line = line_of(text, consumed + open);
        let after_open = after_open.get(2..).unwrap_or_default();
        let Some(close) = after_open.find("}}") else {
            return Err(TemplateError::Parse {
                template: name.to_string(),
                line,
                message: "unclosed action".to_string(),
            });
        };
        let inner = after_open.get(..close).unwrap_or_default();

        let (inner, trim_left) = inner
            .strip_prefix("- ")
            .map_or((inner, false), |s| (s, true));
        let (inner, trim_right) = inner
            .strip_suffix(" -")
            .map_or((inner, false), |s| (s, true));

        let mut chunk = if trim_next { before.trim_start() } else { before };
        if trim_left {
            chunk = chunk.trim_end();
        }
        out.push_str(chunk);

        out.push_str(&evaluate(name, line, inner.trim(), vars)?);

        let advance = open + 2 + close + 2;
        consumed += advance;
        rest = rest.get(advance..).unwrap_or_default();
        trim_next = trim_right;
    }

    out.push_str(if trim_next { rest.trim_start() } else { rest });
    Ok(out)
}

fn evaluate(name: &str, line: usize, action: &str, vars: &Mapping) -> Result<String, TemplateError> {
    if action.starts_with("/*") && action.ends_with("*/") {
        return Ok(String::new());
    }
    let parse_error = |message: String| TemplateError::Parse {
        template: name.to_string(),
        line,
        message,
    };
    let Some(path) = action.strip_prefix('.') else {
        return Err(parse_error(format!("unsupported action '{action}'")));
    };
    let keys: Vec<&str> = path.split('.').collect();
    if keys
        .iter()
        .any(|k| k.is_empty() || !k.chars().all(|c| c.is_alphanumeric() || c == '_'))
    {
        return Err(parse_error(format!("unsupported action '{action}'")));
    }

    let missing = || TemplateError::MissingVariable {
        template: name.to_string(),
        variable: path.to_string(),
        vars_file: VARS_FILE.to_string(),
    };
    let mut current: Option<&Value> = None;
    for key in &keys {
        let map = match current {
            None => vars,
            Some(Value::Mapping(m)) => m,
            Some(_) => return Err(missing()),
        };
        current = Some(map.get(*key).ok_or_else(missing)?);
    }

    match current {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Null) | None => Ok(String::new()),
        Some(Value::Tagged(t)) => Ok(match &t.value {
            Value::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .unwrap_or_default()
                .trim_end()
                .to_string(),
        }),
        Some(Value::Sequence(_) | Value::Mapping(_)) => Err(TemplateError::NonScalar {
            template: name.to_string(),
            variable: path.to_string(),
        }),
    }
}

fn line_of(text: &str, offset: usize) -> usize {
    text.get(..offset)
        .map_or(1, |prefix| prefix.matches('\n').count() + 1)
}
