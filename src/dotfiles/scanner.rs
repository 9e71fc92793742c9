//! Enumerates dotfile sources in the config directory and candidate
//! dotfiles in the home directory.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use walkdir::WalkDir;

use super::filter::IgnoreFilter;
use super::paths::source_to_target;
use super::template::TemplateProcessor;

/// A file or directory found in the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeEntry {
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to home, `/`-separated (e.g. `.config/nvim/init.lua`).
    pub relative: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Map every dotfile source under `config_dir` to its `~/` destination.
///
/// Top-level hidden entries and reserved names are skipped, ignored
/// directories are pruned, and only files are emitted. Template sources map
/// to the destination `templates` names for them.
///
/// # Errors
///
/// Returns an error if the config directory cannot be walked.
pub fn config_targets(
    config_dir: &Path,
    filter: &IgnoreFilter,
    templates: &dyn TemplateProcessor,
) -> Result<BTreeMap<String, String>> {
    let mut targets = BTreeMap::new();
    if !config_dir.is_dir() {
        return Ok(targets);
    }
    let walker = WalkDir::new(config_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 1 && is_hidden(e.file_name()) {
                return false;
            }
            e.path()
                .strip_prefix(config_dir)
                .is_ok_and(|rel| !filter.is_ignored(rel, e.file_type().is_dir()))
        });
    for entry in walker {
        let entry =
            entry.with_context(|| format!("failed to scan {}", config_dir.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let source = slash_path(entry.path().strip_prefix(config_dir)?);
        let destination = source_to_target(&templates.template_name(&source));
        targets.insert(source, destination);
    }
    Ok(targets)
}

/// List candidate dotfiles in `home`.
///
/// Only top-level hidden entries are considered. Entries named in
/// `expand_dirs` are walked to individual files, additionally filtered by
/// `unmanaged`; all other entries (including directories) are returned as a
/// single entry.
///
/// # Errors
///
/// Returns an error if the home directory cannot be listed or an expanded
/// directory cannot be walked.
pub fn scan_home(
    home: &Path,
    expand_dirs: &[String],
    filter: &IgnoreFilter,
    unmanaged: &IgnoreFilter,
) -> Result<Vec<HomeEntry>> {
    let mut top: Vec<fs::DirEntry> = fs::read_dir(home)
        .with_context(|| format!("failed to list {}", home.display()))?
        .flatten()
        .filter(|e| is_hidden(&e.file_name()))
        .collect();
    top.sort_by_key(fs::DirEntry::file_name);

    let mut out = Vec::new();
    for entry in top {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        if filter.is_ignored(Path::new(&name), is_dir) || filter.is_excluded(&path) {
            continue;
        }
        if is_dir && expand_dirs.iter().any(|d| d.trim_end_matches('/') == name) {
            out.extend(walk_expanded(home, &path, filter, unmanaged)?);
        } else {
            out.push(HomeEntry {
                path,
                relative: name,
                is_dir,
            });
        }
    }
    Ok(out)
}

fn walk_expanded(
    home: &Path,
    dir: &Path,
    filter: &IgnoreFilter,
    unmanaged: &IgnoreFilter,
) -> Result<Vec<HomeEntry>> {
    let keep = |path: &Path, is_dir: bool| {
        if filter.is_excluded(path) {
            return false;
        }
        path.strip_prefix(home).is_ok_and(|rel| {
            !filter.is_ignored(rel, is_dir) && !unmanaged.is_ignored(rel, is_dir)
        })
    };
    let mut out = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| keep(e.path(), e.file_type().is_dir()));
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to scan {}", dir.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = slash_path(entry.path().strip_prefix(home)?);
        out.push(HomeEntry {
            path: entry.path().to_path_buf(),
            relative,
            is_dir: false,
        });
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dotfiles::template::LocalTemplates;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, rel).unwrap();
    }

    #[test]
    fn config_targets_maps_sources() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "zshrc");
        touch(root, "gitconfig.tmpl");
        touch(root, "config/nvim/init.lua");
        touch(root, "dotkeeper.lock");
        touch(root, "dotkeeper.toml");
        touch(root, ".dotkeeper/local.yaml");
        touch(root, ".git/HEAD");
        touch(root, "config/nvim/.DS_Store");

        let targets = config_targets(root, &IgnoreFilter::new(&[".DS_Store"]), &LocalTemplates::new(root)).unwrap();
        let pairs: Vec<(&str, &str)> = targets
            .iter()
            .map(|(s, d)| (s.as_str(), d.as_str()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("config/nvim/init.lua", "~/.config/nvim/init.lua"),
                ("gitconfig.tmpl", "~/.gitconfig"),
                ("zshrc", "~/.zshrc"),
            ]
        );
    }

    #[test]
    fn nested_hidden_files_are_sources() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "config/app/.env");
        let targets = config_targets(dir.path(), &IgnoreFilter::default(), &LocalTemplates::new(dir.path())).unwrap();
        assert_eq!(
            targets.get("config/app/.env").map(String::as_str),
            Some("~/.config/app/.env")
        );
    }

    #[test]
    fn ignored_directories_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "config/cache/big");
        touch(dir.path(), "config/keep");
        let targets = config_targets(dir.path(), &IgnoreFilter::new(&["cache"]), &LocalTemplates::new(dir.path())).unwrap();
        assert_eq!(targets.keys().collect::<Vec<_>>(), ["config/keep"]);
    }

    #[test]
    fn missing_config_dir_has_no_targets() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let targets =
            config_targets(&missing, &IgnoreFilter::default(), &LocalTemplates::new(&missing))
                .unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn scan_home_expands_only_configured_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path();
        touch(home, ".zshrc");
        touch(home, "visible.txt");
        touch(home, ".config/nvim/init.lua");
        touch(home, ".config/app/cache/blob");
        touch(home, ".vim/colors/x.vim");
        touch(home, ".cache/junk");

        let filter = IgnoreFilter::new(&[".cache"]);
        let unmanaged = IgnoreFilter::new(&["**/cache/**"]);
        let entries = scan_home(home, &[".config".to_string()], &filter, &unmanaged).unwrap();
        let rels: Vec<(&str, bool)> = entries
            .iter()
            .map(|e| (e.relative.as_str(), e.is_dir))
            .collect();
        assert_eq!(
            rels,
            [
                (".config/nvim/init.lua", false),
                (".vim", true),
                (".zshrc", false),
            ]
        );
    }

    #[test]
    fn scan_home_skips_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path();
        touch(home, ".config/dotkeeper/zshrc");
        touch(home, ".config/git/config");
        let filter = IgnoreFilter::default().excluding(&home.join(".config/dotkeeper"));
        let entries =
            scan_home(home, &[".config".to_string()], &filter, &IgnoreFilter::default()).unwrap();
        let rels: Vec<&str> = entries.iter().map(|e| e.relative.as_str()).collect();
        assert_eq!(rels, [".config/git/config"]);
    }
}
