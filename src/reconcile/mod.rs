//! Domain-agnostic reconciliation of desired against actual items.
//!
//! Both dotfiles and packages are reduced to [`Item`] records. The
//! [`reconcile_items`] function compares the two collections by name and
//! assigns each item exactly one [`ItemState`]. Content comparison is not
//! stored on the item; instead each item carries a [`ComparisonMode`] which
//! a [`Comparator`] resolves at reconciliation time.
//!
//! ```text
//! desired ──┐
//!           ├─ reconcile_items ─▶ Managed | Degraded | Missing | Untracked
//! actual  ──┘        │
//!               Comparator (drift)
//! ```
pub mod outcome;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use outcome::{
    ApplyReport, ApplyResult, ApplySummary, OperationResult, OperationStatus, StopReason,
};

/// Which kind of thing an item describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    /// A file or directory deployed into the home directory.
    #[default]
    Dotfile,
    /// A package installed through an external package manager.
    Package,
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dotfile => write!(f, "dotfile"),
            Self::Package => write!(f, "package"),
        }
    }
}

/// Lifecycle state assigned by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemState {
    /// Desired and present with matching content.
    Managed,
    /// Desired but not present.
    #[default]
    Missing,
    /// Present but not desired.
    Untracked,
    /// Desired and present, but drifted or not comparable.
    Degraded,
}

/// How a matched item's content is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonMode {
    /// Presence is enough.
    #[default]
    None,
    /// SHA-256 of the source file against the destination file.
    ContentHash,
    /// SHA-256 of the rendered template against the destination file.
    TemplateHash,
}

/// Why a matched item is [`ItemState::Degraded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftStatus {
    /// Destination content differs from the source.
    Modified,
    /// Comparison itself failed; see [`Item::error`].
    Error,
}

/// A single unit under management.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Item {
    /// Logical identifier: dotfile path without the leading dot, or package name.
    pub name: String,
    /// State assigned by reconciliation.
    pub state: ItemState,
    /// Owning domain.
    pub domain: Domain,
    /// Package manager name; empty for dotfiles.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manager: String,
    /// Absolute destination path (dotfiles only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Absolute source path inside the config directory (dotfiles only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Destination in `~/` form (dotfiles only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub destination: String,
    /// How content is compared when the item is present on both sides.
    #[serde(default)]
    pub comparison: ComparisonMode,
    /// Whether the source is a directory.
    #[serde(default)]
    pub is_directory: bool,
    /// Drift marker for degraded items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftStatus>,
    /// Comparison error text for degraded items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Installed or recorded version (packages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Pass-through data the reconciler does not interpret.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_yaml::Value>,
}

impl Item {
    /// A dotfile item with `name` and nothing else set.
    #[must_use]
    pub fn dotfile(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: Domain::Dotfile,
            ..Self::default()
        }
    }

    /// A package item for `manager`.
    #[must_use]
    pub fn package(manager: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: Domain::Package,
            manager: manager.into(),
            ..Self::default()
        }
    }

    /// Returns `true` for managed items carrying a drift marker.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self.state, ItemState::Degraded)
    }
}

/// Resolves an item's [`ComparisonMode`] into an identical/different answer.
pub trait Comparator {
    /// Returns `Ok(true)` when source and destination content are identical.
    ///
    /// # Errors
    ///
    /// Returns an error if either side exists but cannot be read or rendered.
    fn identical(&self, item: &Item) -> anyhow::Result<bool>;
}

/// Comparator for domains without content comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoComparison;

impl Comparator for NoComparison {
    fn identical(&self, _item: &Item) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Compute per-item lifecycle state from desired and actual collections.
///
/// Duplicate names are last-write-wins. Output is ordered by name, desired
/// items first, then untracked items.
pub fn reconcile_items<C: Comparator + ?Sized>(
    desired: Vec<Item>,
    actual: Vec<Item>,
    comparator: &C,
) -> Vec<Item> {
    let desired: BTreeMap<String, Item> =
        desired.into_iter().map(|i| (i.name.clone(), i)).collect();
    let mut actual: BTreeMap<String, Item> =
        actual.into_iter().map(|i| (i.name.clone(), i)).collect();

    let mut out = Vec::with_capacity(desired.len() + actual.len());
    for (name, mut item) in desired {
        match actual.remove(&name) {
            Some(found) => {
                if item.path.is_none() {
                    item.path = found.path;
                }
                if item.version.is_none() {
                    item.version = found.version;
                }
                item.state = ItemState::Managed;
                if item.comparison != ComparisonMode::None {
                    match comparator.identical(&item) {
                        Ok(true) => {}
                        Ok(false) => {
                            item.state = ItemState::Degraded;
                            item.drift = Some(DriftStatus::Modified);
                        }
                        Err(e) => {
                            item.state = ItemState::Degraded;
                            item.drift = Some(DriftStatus::Error);
                            item.error = Some(format!("{e:#}"));
                        }
                    }
                }
            }
            None => item.state = ItemState::Missing,
        }
        out.push(item);
    }

    out.extend(actual.into_values().map(|mut item| {
        item.state = ItemState::Untracked;
        item
    }));
    out
}

/// Reconciliation outcome for one domain (and optionally one manager).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReconcileResult {
    /// Domain the items belong to.
    pub domain: Domain,
    /// Manager name for per-manager package results; empty otherwise.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manager: String,
    /// Managed items, including degraded ones.
    pub managed: Vec<Item>,
    /// Desired items that are not present.
    pub missing: Vec<Item>,
    /// Present items that are not desired.
    pub untracked: Vec<Item>,
}

/// Counts for a [`ReconcileResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReconcileSummary {
    /// Managed items, including degraded ones.
    pub managed: usize,
    /// Missing items.
    pub missing: usize,
    /// Untracked items.
    pub untracked: usize,
    /// Managed items carrying drift.
    pub degraded: usize,
}

impl ReconcileResult {
    /// Partition reconciled items into buckets.
    #[must_use]
    pub fn from_items(domain: Domain, manager: &str, items: Vec<Item>) -> Self {
        let mut result = Self {
            domain,
            manager: manager.to_string(),
            ..Self::default()
        };
        for item in items {
            match item.state {
                ItemState::Managed | ItemState::Degraded => result.managed.push(item),
                ItemState::Missing => result.missing.push(item),
                ItemState::Untracked => result.untracked.push(item),
            }
        }
        result
    }

    /// Managed items carrying a drift marker.
    pub fn degraded(&self) -> impl Iterator<Item = &Item> {
        self.managed.iter().filter(|i| i.is_degraded())
    }

    /// Bucket counts.
    #[must_use]
    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary {
            managed: self.managed.len(),
            missing: self.missing.len(),
            untracked: self.untracked.len(),
            degraded: self.degraded().count(),
        }
    }

    /// Merge another result into this one, keeping name order.
    pub fn merge(&mut self, other: Self) {
        self.managed.extend(other.managed);
        self.missing.extend(other.missing);
        self.untracked.extend(other.untracked);
        for bucket in [&mut self.managed, &mut self.missing, &mut self.untracked] {
            bucket.sort_by(|a, b| (&a.manager, &a.name).cmp(&(&b.manager, &b.name)));
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};

    /// Comparator driven by a name → answer table.
    struct Table(HashMap<&'static str, Result<bool, &'static str>>);

    impl Comparator for Table {
        fn identical(&self, item: &Item) -> anyhow::Result<bool> {
            match self.0.get(item.name.as_str()) {
                Some(Ok(same)) => Ok(*same),
                Some(Err(msg)) => Err(anyhow::anyhow!(*msg)),
                None => Ok(true),
            }
        }
    }

    fn compared(name: &str) -> Item {
        Item {
            comparison: ComparisonMode::ContentHash,
            ..Item::dotfile(name)
        }
    }

    fn names(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn desired_only_is_missing() {
        let items = reconcile_items(vec![Item::dotfile("zshrc")], vec![], &NoComparison);
        let result = ReconcileResult::from_items(Domain::Dotfile, "", items);
        assert_eq!(names(&result.missing), ["zshrc"]);
        assert!(result.managed.is_empty());
    }

    #[test]
    fn identical_match_is_managed_without_drift() {
        let cmp = Table(HashMap::from([("zshrc", Ok(true))]));
        let items = reconcile_items(vec![compared("zshrc")], vec![Item::dotfile("zshrc")], &cmp);
        assert_eq!(items[0].state, ItemState::Managed);
        assert_eq!(items[0].drift, None);
    }

    #[test]
    fn different_match_is_degraded_in_managed_bucket() {
        let cmp = Table(HashMap::from([("zshrc", Ok(false))]));
        let items = reconcile_items(vec![compared("zshrc")], vec![Item::dotfile("zshrc")], &cmp);
        let result = ReconcileResult::from_items(Domain::Dotfile, "", items);
        assert_eq!(names(&result.managed), ["zshrc"]);
        assert_eq!(result.managed[0].state, ItemState::Degraded);
        assert_eq!(result.managed[0].drift, Some(DriftStatus::Modified));
        assert_eq!(result.summary().degraded, 1);
    }

    #[test]
    fn comparison_error_is_degraded_with_text() {
        let cmp = Table(HashMap::from([("vimrc", Err("permission denied"))]));
        let items = reconcile_items(vec![compared("vimrc")], vec![Item::dotfile("vimrc")], &cmp);
        assert_eq!(items[0].state, ItemState::Degraded);
        assert_eq!(items[0].drift, Some(DriftStatus::Error));
        assert_eq!(items[0].error.as_deref(), Some("permission denied"));
    }

    #[test]
    fn actual_only_is_untracked() {
        let items = reconcile_items(vec![], vec![Item::dotfile("vimrc")], &NoComparison);
        let result = ReconcileResult::from_items(Domain::Dotfile, "", items);
        assert_eq!(names(&result.untracked), ["vimrc"]);
    }

    #[test]
    fn comparator_not_called_without_mode() {
        let cmp = Table(HashMap::from([("zshrc", Ok(false))]));
        let items = reconcile_items(
            vec![Item::dotfile("zshrc")],
            vec![Item::dotfile("zshrc")],
            &cmp,
        );
        assert_eq!(items[0].state, ItemState::Managed);
    }

    #[test]
    fn actual_path_fills_empty_desired_path() {
        let actual = Item {
            path: Some(PathBuf::from("/home/u/.zshrc")),
            ..Item::dotfile("zshrc")
        };
        let items = reconcile_items(vec![Item::dotfile("zshrc")], vec![actual], &NoComparison);
        assert_eq!(items[0].path, Some(PathBuf::from("/home/u/.zshrc")));
    }

    #[test]
    fn desired_path_is_kept_when_set() {
        let desired = Item {
            path: Some(PathBuf::from("/home/u/.zshrc")),
            ..Item::dotfile("zshrc")
        };
        let actual = Item {
            path: Some(PathBuf::from("/elsewhere")),
            ..Item::dotfile("zshrc")
        };
        let items = reconcile_items(vec![desired], vec![actual], &NoComparison);
        assert_eq!(items[0].path, Some(PathBuf::from("/home/u/.zshrc")));
    }

    #[test]
    fn duplicate_names_are_last_write_wins() {
        let first = Item {
            version: Some("1".to_string()),
            ..Item::package("brew", "jq")
        };
        let second = Item {
            version: Some("2".to_string()),
            ..Item::package("brew", "jq")
        };
        let items = reconcile_items(vec![first, second], vec![], &NoComparison);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].version.as_deref(), Some("2"));
    }

    #[test]
    fn matched_item_not_counted_as_untracked() {
        let items = reconcile_items(
            vec![Item::dotfile("a"), Item::dotfile("b")],
            vec![Item::dotfile("b"), Item::dotfile("c")],
            &NoComparison,
        );
        let result = ReconcileResult::from_items(Domain::Dotfile, "", items);
        assert_eq!(names(&result.managed), ["b"]);
        assert_eq!(names(&result.missing), ["a"]);
        assert_eq!(names(&result.untracked), ["c"]);
    }

    #[test]
    fn every_name_lands_in_exactly_one_bucket() {
        type Case = (&'static str, &'static [&'static str], &'static [&'static str]);
        let cases: &[Case] = &[
            ("both empty", &[], &[]),
            ("desired only", &["a", "b"], &[]),
            ("actual only", &[], &["a", "b"]),
            ("disjoint", &["a"], &["b"]),
            ("overlap", &["a", "b", "c"], &["b", "c", "d"]),
            ("duplicates", &["a", "a", "b"], &["b", "b", "c", "c"]),
            ("degraded", &["drift", "broken", "ok"], &["drift", "broken", "ok"]),
        ];
        let cmp = Table(HashMap::from([("drift", Ok(false)), ("broken", Err("unreadable"))]));

        for (label, desired, actual) in cases {
            let items = reconcile_items(
                desired.iter().map(|n| compared(n)).collect(),
                actual.iter().map(|n| Item::dotfile(*n)).collect(),
                &cmp,
            );
            let result = ReconcileResult::from_items(Domain::Dotfile, "", items);

            let mut seen = names(&result.managed);
            seen.extend(names(&result.missing));
            seen.extend(names(&result.untracked));
            let unique: BTreeSet<&str> = seen.iter().copied().collect();
            assert_eq!(unique.len(), seen.len(), "{label}: a name repeats in {seen:?}");

            let expected: BTreeSet<&str> = desired.iter().chain(actual.iter()).copied().collect();
            assert_eq!(unique, expected, "{label}");
            assert!(
                result.degraded().all(|i| desired.contains(&i.name.as_str())),
                "{label}"
            );
        }

        let degraded = ReconcileResult::from_items(
            Domain::Dotfile,
            "",
            reconcile_items(
                vec![compared("drift"), compared("broken"), compared("ok")],
                vec![Item::dotfile("drift"), Item::dotfile("broken"), Item::dotfile("ok")],
                &cmp,
            ),
        );
        assert_eq!(names(&degraded.managed), ["broken", "drift", "ok"]);
        assert_eq!(degraded.summary().degraded, 2);
    }

    #[test]
    fn merge_keeps_manager_then_name_order() {
        let mut a = ReconcileResult::from_items(
            Domain::Package,
            "npm",
            reconcile_items(vec![Item::package("npm", "prettier")], vec![], &NoComparison),
        );
        let b = ReconcileResult::from_items(
            Domain::Package,
            "brew",
            reconcile_items(vec![Item::package("brew", "jq")], vec![], &NoComparison),
        );
        a.merge(b);
        assert_eq!(names(&a.missing), ["jq", "prettier"]);
    }

    #[test]
    fn item_serializes_without_empty_fields() {
        let item = Item {
            state: ItemState::Degraded,
            drift: Some(DriftStatus::Modified),
            ..Item::dotfile("zshrc")
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["state"], "degraded");
        assert_eq!(json["drift"], "modified");
        assert_eq!(json["domain"], "dotfile");
        assert!(json.get("manager").is_none());
    }
}
