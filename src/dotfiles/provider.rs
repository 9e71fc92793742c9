//! Turns the config directory and the home directory into reconcilable
//! dotfile items.
use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;

use super::filter::IgnoreFilter;
use super::paths::{PathResolver, dotfile_name};
use super::scanner::{HomeEntry, config_targets, scan_home};
use super::template::TemplateProcessor;
use crate::config::DotfileSettings;
use crate::reconcile::{
    Comparator, ComparisonMode, Domain, Item, ReconcileResult, reconcile_items,
};

/// Dotfile adapter over the path resolver, scan settings and templates.
#[derive(Clone, Copy)]
pub struct DotfileProvider<'a> {
    paths: &'a PathResolver,
    settings: &'a dyn DotfileSettings,
    templates: &'a dyn TemplateProcessor,
}

impl std::fmt::Debug for DotfileProvider<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DotfileProvider")
            .field("paths", self.paths)
            .field("settings", &"<dyn DotfileSettings>")
            .field("templates", &self.templates)
            .finish()
    }
}

impl<'a> DotfileProvider<'a> {
    /// Create a provider.
    #[must_use]
    pub const fn new(
        paths: &'a PathResolver,
        settings: &'a dyn DotfileSettings,
        templates: &'a dyn TemplateProcessor,
    ) -> Self {
        Self {
            paths,
            settings,
            templates,
        }
    }

    /// One item per source file in the config directory.
    ///
    /// # Errors
    ///
    /// Returns a [`PathError`](crate::error::PathError) if a destination
    /// escapes the home directory, or the scan error.
    pub fn desired(&self) -> Result<Vec<Item>> {
        let filter = IgnoreFilter::new(self.settings.ignore_patterns());
        let mut items = Vec::new();
        for (source, destination) in config_targets(self.paths.config_dir(), &filter, self.templates)? {
            let source_path = self.paths.source_path(&source);
            let path = self
                .paths
                .destination_path(&destination)
                .map_err(anyhow::Error::new)?;
            let mut item = Item::dotfile(dotfile_name(&destination));
            item.comparison = if self.templates.is_template(&source_path) {
                ComparisonMode::TemplateHash
            } else {
                ComparisonMode::ContentHash
            };
            item.source = Some(source_path);
            item.path = Some(path);
            item.destination = destination;
            items.push(item);
        }
        Ok(items)
    }

    /// Candidate dotfiles present in the home directory.
    ///
    /// Desired destinations that exist but were not discovered (because
    /// they sit inside an unexpanded directory or match an unmanaged filter)
    /// are added, and any directory entry containing one of them is dropped
    /// so it is not reported as untracked.
    ///
    /// # Errors
    ///
    /// Returns the scan error.
    pub fn actual(&self, desired: &[Item]) -> Result<Vec<Item>> {
        let filter = IgnoreFilter::new(self.settings.ignore_patterns())
            .excluding(self.paths.config_dir());
        let unmanaged = IgnoreFilter::new(self.settings.unmanaged_filters());
        let entries = scan_home(
            self.paths.home(),
            self.settings.expand_directories(),
            &filter,
            &unmanaged,
        )?;

        let mut items: Vec<Item> = entries.iter().map(|e| self.home_item(e)).collect();
        let seen: BTreeSet<String> = items.iter().map(|i| i.name.clone()).collect();

        let mut extra: Vec<Item> = Vec::new();
        for wanted in desired {
            let Some(path) = &wanted.path else { continue };
            if seen.contains(&wanted.name) || path.symlink_metadata().is_err() {
                continue;
            }
            let mut item = Item::dotfile(&wanted.name);
            item.path = Some(path.clone());
            item.destination.clone_from(&wanted.destination);
            item.is_directory = path.is_dir();
            extra.push(item);
        }
        let nested: Vec<PathBuf> = extra.iter().filter_map(|i| i.path.clone()).collect();
        items.retain(|i| {
            !i.is_directory
                || i.path
                    .as_ref()
                    .is_none_or(|dir| !nested.iter().any(|p| p != dir && p.starts_with(dir)))
        });
        items.extend(extra);
        Ok(items)
    }

    /// Reconcile desired against actual, resolving drift with `comparator`.
    ///
    /// # Errors
    ///
    /// See [`desired`](Self::desired) and [`actual`](Self::actual).
    pub fn reconcile<C: Comparator + ?Sized>(&self, comparator: &C) -> Result<ReconcileResult> {
        let desired = self.desired()?;
        let actual = self.actual(&desired)?;
        let items = reconcile_items(desired, actual, comparator);
        Ok(ReconcileResult::from_items(Domain::Dotfile, "", items))
    }

    fn home_item(&self, entry: &HomeEntry) -> Item {
        let mut item = Item::dotfile(dotfile_name(&entry.relative));
        item.destination = self
            .paths
            .to_tilde(&entry.path)
            .unwrap_or_else(|| entry.path.display().to_string());
        item.path = Some(entry.path.clone());
        item.is_directory = entry.is_dir;
        item
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::dotfiles::compare::ContentComparator;
    use crate::dotfiles::template::LocalTemplates;
    use crate::reconcile::{DriftStatus, NoComparison};

    fn write(root: &Path, rel: &str, content: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, content).unwrap();
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    struct Fixture {
        home: tempfile::TempDir,
        config: tempfile::TempDir,
        paths: PathResolver,
    }

    fn fixture() -> Fixture {
        let home = tempfile::tempdir().unwrap();
        let config = tempfile::tempdir().unwrap();
        let paths = PathResolver::new(home.path(), config.path());
        Fixture {
            home,
            config,
            paths,
        }
    }

    #[test]
    fn desired_items_carry_paths_and_modes() {
        let f = fixture();
        write(f.config.path(), "zshrc", "z");
        write(f.config.path(), "gitconfig.tmpl", "[user]\n");
        let settings = Config::default();
        let templates = LocalTemplates::new(f.config.path());
        let provider = DotfileProvider::new(&f.paths, &settings, &templates);

        let desired = provider.desired().unwrap();
        assert_eq!(names(&desired), ["gitconfig", "zshrc"]);
        assert_eq!(desired[0].comparison, ComparisonMode::TemplateHash);
        assert_eq!(desired[0].destination, "~/.gitconfig");
        assert_eq!(desired[0].path.as_deref(), Some(f.home.path().join(".gitconfig").as_path()));
        assert_eq!(desired[1].comparison, ComparisonMode::ContentHash);
    }

    #[test]
    fn buckets_and_drift() {
        let f = fixture();
        write(f.config.path(), "zshrc", "same");
        write(f.config.path(), "vimrc", "new");
        write(f.config.path(), "bashrc", "b");
        write(f.home.path(), ".zshrc", "same");
        write(f.home.path(), ".vimrc", "old");
        write(f.home.path(), ".inputrc", "i");
        let settings = Config::default();
        let templates = Arc::new(LocalTemplates::new(f.config.path()));
        let provider = DotfileProvider::new(&f.paths, &settings, templates.as_ref());

        let result = provider
            .reconcile(&ContentComparator::new(templates.clone()))
            .unwrap();
        assert_eq!(names(&result.managed), ["vimrc", "zshrc"]);
        assert_eq!(result.managed[0].drift, Some(DriftStatus::Modified));
        assert_eq!(result.managed[1].drift, None);
        assert_eq!(names(&result.missing), ["bashrc"]);
        assert_eq!(names(&result.untracked), ["inputrc"]);
        assert_eq!(result.summary().degraded, 1);
    }

    #[test]
    fn expanded_directories_are_walked() {
        let f = fixture();
        write(f.config.path(), "config/nvim/init.lua", "x");
        write(f.home.path(), ".config/nvim/init.lua", "x");
        write(f.home.path(), ".config/fish/config.fish", "y");
        let settings = Config::default();
        let templates = LocalTemplates::new(f.config.path());
        let provider = DotfileProvider::new(&f.paths, &settings, &templates);

        let result = provider.reconcile(&NoComparison).unwrap();
        assert_eq!(names(&result.managed), ["config/nvim/init.lua"]);
        assert_eq!(names(&result.untracked), ["config/fish/config.fish"]);
        assert_eq!(result.untracked[0].destination, "~/.config/fish/config.fish");
    }

    #[test]
    fn nested_target_in_unexpanded_dir_replaces_the_dir() {
        let f = fixture();
        write(f.config.path(), "vim/vimrc", "x");
        write(f.home.path(), ".vim/vimrc", "x");
        write(f.home.path(), ".vim/colors/x.vim", "c");
        write(f.home.path(), ".tmux", "t");
        let settings = Config::default();
        let templates = LocalTemplates::new(f.config.path());
        let provider = DotfileProvider::new(&f.paths, &settings, &templates);

        let result = provider.reconcile(&NoComparison).unwrap();
        assert_eq!(names(&result.managed), ["vim/vimrc"]);
        assert_eq!(names(&result.untracked), ["tmux"]);
    }

    #[test]
    fn config_dir_inside_home_is_not_untracked() {
        let home = tempfile::tempdir().unwrap();
        let config = home.path().join(".dotkeeper-src");
        write(&config, "zshrc", "z");
        let paths = PathResolver::new(home.path(), &config);
        let settings = Config::default();
        let templates = LocalTemplates::new(&config);
        let provider = DotfileProvider::new(&paths, &settings, &templates);

        let result = provider.reconcile(&NoComparison).unwrap();
        assert!(result.untracked.is_empty());
        assert_eq!(names(&result.missing), ["zshrc"]);
    }
}
