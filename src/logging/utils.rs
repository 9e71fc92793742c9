//! Event classification, log file placement and text helpers shared by the
//! console and file outputs.
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::{Level, Metadata};

/// Target of events emitted by [`Logger::stage`](super::Logger::stage).
pub(super) const STAGE_TARGET: &str = "dotkeeper::stage";
/// Target of events emitted by [`Logger::dry_run`](super::Logger::dry_run).
pub(super) const DRY_RUN_TARGET: &str = "dotkeeper::dry_run";

/// How an event is rendered, from its level and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EventKind {
    Stage,
    DryRun,
    Error,
    Warn,
    Info,
    Debug,
}

impl EventKind {
    pub(super) fn of(metadata: &Metadata<'_>) -> Self {
        match (*metadata.level(), metadata.target()) {
            (Level::ERROR, _) => Self::Error,
            (Level::WARN, _) => Self::Warn,
            (Level::INFO, STAGE_TARGET) => Self::Stage,
            (Level::INFO, DRY_RUN_TARGET) => Self::DryRun,
            (Level::INFO, _) => Self::Info,
            _ => Self::Debug,
        }
    }

    /// Tag written after the level in the log file.
    pub(super) const fn file_tag(self) -> &'static str {
        match self {
            Self::Stage => "==> ",
            Self::DryRun => "[dry run] ",
            Self::Error | Self::Warn | Self::Info | Self::Debug => "",
        }
    }
}

/// Remove terminal escape sequences: CSI sequences (`ESC [ ... final`) and
/// two-byte escapes such as `ESC M`.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut pieces = s.split('\x1b');
    let mut out = pieces.next().unwrap_or_default().to_string();
    for piece in pieces {
        let rest = if let Some(csi) = piece.strip_prefix('[') {
            csi.find(|c| ('@'..='~').contains(&c))
                .and_then(|end| csi.get(end + 1..))
                .unwrap_or_default()
        } else {
            let mut chars = piece.chars();
            chars.next();
            chars.as_str()
        };
        out.push_str(rest);
    }
    out
}

/// `$XDG_CACHE_HOME/dotkeeper/<command>.log`, falling back to
/// `~/.cache`. Creates the directory.
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    let cache = std::env::var_os("XDG_CACHE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache")))?;
    let dir = cache.join("dotkeeper");
    fs::create_dir_all(&dir).ok()?;
    Some(dir.join(format!("{command}.log")))
}

/// Move an existing log at `path` to `<path>.1`, replacing the older one.
pub(super) fn rotate(path: &Path) {
    if path.exists() {
        let mut previous = OsString::from(path.as_os_str());
        previous.push(".1");
        fs::rename(path, previous).ok();
    }
}

/// Current UTC time in RFC 3339 with second precision.
pub(super) fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn strip_ansi_removes_sequences() {
        assert_eq!(strip_ansi("\x1b[32m✓ brew:jq\x1b[0m"), "✓ brew:jq");
        assert_eq!(strip_ansi("\x1b[1;34m==>\x1b[0m \x1b[1mPackages\x1b[0m"), "==> Packages");
        assert_eq!(strip_ansi("\x1b[2Kdone"), "done");
        assert_eq!(strip_ansi("\x1bMup"), "up");
        assert_eq!(strip_ansi("plain"), "plain");
        assert_eq!(strip_ansi("cut \x1b[31"), "cut ");
    }

    #[test]
    fn rotate_keeps_one_previous_run() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("apply.log");
        rotate(&path);
        assert!(!tmp.path().join("apply.log.1").exists());

        fs::write(&path, "first").unwrap();
        rotate(&path);
        fs::write(&path, "second").unwrap();
        rotate(&path);
        assert!(!path.exists());
        assert_eq!(fs::read_to_string(tmp.path().join("apply.log.1")).unwrap(), "second");
    }

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let ts = timestamp();
        assert_eq!(ts.len(), 20, "{ts}");
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
