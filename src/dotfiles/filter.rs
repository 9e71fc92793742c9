//! Ignore-pattern matching for config-directory and home scans.
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

/// Config file name inside the config directory.
pub const CONFIG_FILE: &str = "dotkeeper.toml";
/// Lock file name inside the config directory.
pub const LOCK_FILE: &str = "dotkeeper.lock";
/// Metadata directory inside the config directory.
pub const META_DIR: &str = ".dotkeeper";

/// Names inside the config directory that are never dotfile sources.
pub const RESERVED_NAMES: [&str; 3] = [CONFIG_FILE, LOCK_FILE, META_DIR];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
enum Rule {
    /// `name/`: matches any directory component.
    Directory(Matcher),
    /// `**/name/**`: matches any path component.
    AnyComponent(Matcher),
    /// Matches the basename or the whole relative path.
    Entry(Matcher),
}

#[derive(Debug, Clone)]
struct Matcher {
    raw: String,
    glob: Option<Pattern>,
}

impl Matcher {
    fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            glob: Pattern::new(raw).ok(),
        }
    }

    fn matches(&self, candidate: &str) -> bool {
        candidate == self.raw
            || self
                .glob
                .as_ref()
                .is_some_and(|g| g.matches_with(candidate, MATCH_OPTIONS))
    }
}

/// Compiled set of ignore patterns.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    rules: Vec<Rule>,
    excluded_dir: Option<PathBuf>,
}

impl IgnoreFilter {
    /// Compile `patterns`. Invalid globs still match literally.
    #[must_use]
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let rules = patterns
            .iter()
            .map(AsRef::as_ref)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                if let Some(inner) = p.strip_prefix("**/").and_then(|r| r.strip_suffix("/**")) {
                    Rule::AnyComponent(Matcher::new(inner))
                } else if let Some(dir) = p.strip_suffix('/') {
                    Rule::Directory(Matcher::new(dir))
                } else {
                    Rule::Entry(Matcher::new(p))
                }
            })
            .collect();
        Self {
            rules,
            excluded_dir: None,
        }
    }

    /// Additionally skip everything at or below `dir` (absolute).
    #[must_use]
    pub fn excluding(mut self, dir: &Path) -> Self {
        self.excluded_dir = Some(dir.to_path_buf());
        self
    }

    /// Returns `true` if the absolute `path` is the excluded directory or
    /// lies below it.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.excluded_dir
            .as_ref()
            .is_some_and(|dir| path.starts_with(dir))
    }

    /// Returns `true` if `rel` (relative to the scan root) should be skipped.
    #[must_use]
    pub fn is_ignored(&self, rel: &Path, is_dir: bool) -> bool {
        let components: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let Some((base, parents)) = components.split_last() else {
            return false;
        };
        if RESERVED_NAMES.contains(&base.as_str()) {
            return true;
        }
        let rel_str = components.join("/");
        let dir_components = if is_dir {
            components.as_slice()
        } else {
            parents
        };

        self.rules.iter().any(|rule| match rule {
            Rule::Directory(m) => dir_components.iter().any(|c| m.matches(c)),
            Rule::AnyComponent(m) => components.iter().any(|c| m.matches(c)),
            Rule::Entry(m) => m.matches(base) || m.matches(&rel_str),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> IgnoreFilter {
        IgnoreFilter::new(patterns)
    }

    #[test]
    fn reserved_names_always_ignored() {
        let f = filter(&[]);
        assert!(f.is_ignored(Path::new("dotkeeper.lock"), false));
        assert!(f.is_ignored(Path::new("dotkeeper.toml"), false));
        assert!(f.is_ignored(Path::new(".dotkeeper"), true));
        assert!(!f.is_ignored(Path::new("zshrc"), false));
    }

    #[test]
    fn exact_and_glob_basename_match() {
        let f = filter(&[".DS_Store", "*.swp", "*_history"]);
        assert!(f.is_ignored(Path::new("config/nvim/.DS_Store"), false));
        assert!(f.is_ignored(Path::new(".vimrc.swp"), false));
        assert!(f.is_ignored(Path::new(".zsh_history"), false));
        assert!(!f.is_ignored(Path::new(".zshrc"), false));
    }

    #[test]
    fn star_does_not_cross_separator() {
        let f = filter(&["config/*.lua"]);
        assert!(f.is_ignored(Path::new("config/init.lua"), false));
        assert!(!f.is_ignored(Path::new("config/nvim/init.lua"), false));
    }

    #[test]
    fn directory_pattern_matches_components() {
        let f = filter(&["node_modules/"]);
        assert!(f.is_ignored(Path::new("a/node_modules/x.js"), false));
        assert!(f.is_ignored(Path::new("a/node_modules"), true));
        assert!(!f.is_ignored(Path::new("a/node_modules"), false));
    }

    #[test]
    fn any_component_pattern() {
        let f = filter(&["**/cache*/**"]);
        assert!(f.is_ignored(Path::new(".config/app/cache-v2/data"), false));
        assert!(!f.is_ignored(Path::new(".config/app/data"), false));
    }

    #[test]
    fn excluded_dir_is_prefix_match() {
        let f = filter(&[]).excluding(Path::new("/home/u/.config/dotkeeper"));
        assert!(f.is_excluded(Path::new("/home/u/.config/dotkeeper/zshrc")));
        assert!(!f.is_excluded(Path::new("/home/u/.config/dotkeeper-2")));
    }

    #[test]
    fn invalid_glob_matches_literally() {
        let f = filter(&["[broken"]);
        assert!(f.is_ignored(Path::new("[broken"), false));
    }
}
