//! Global `tracing` subscriber: console output and the per-command log file.
use std::fmt::Debug;
use std::fs::File;
use std::io::{IsTerminal as _, Write as _};
use std::path::Path;
use std::sync::Mutex;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use super::utils::{EventKind, log_file_path, rotate, strip_ansi, timestamp};

fn message(event: &Event<'_>) -> String {
    struct Message(String);

    impl Visit for Message {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "message" {
                value.clone_into(&mut self.0);
            }
        }

        fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    let mut visitor = Message(String::new());
    event.record(&mut visitor);
    visitor.0
}

/// Layer writing every event to a log file as
/// `<rfc3339> <LEVEL> <message>`, escape sequences removed.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<File>,
}

impl FileLayer {
    fn new(command: &str) -> Option<Self> {
        Self::at(&log_file_path(command)?, command)
    }

    /// Start a fresh log at `path` with a header line. The previous run's
    /// log is kept as `<path>.1`.
    pub(super) fn at(path: &Path, command: &str) -> Option<Self> {
        rotate(path);
        let mut file = File::create(path).ok()?;
        let version =
            option_env!("DOTKEEPER_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        writeln!(file, "# dotkeeper {version} {command} started {}", timestamp()).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: Subscriber> Layer<S> for FileLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let kind = EventKind::of(event.metadata());
        let line = format!(
            "{} {:<5} {}{}",
            timestamp(),
            event.metadata().level().to_string(),
            kind.file_tag(),
            strip_ansi(&message(event))
        );
        if let Ok(mut file) = self.file.lock() {
            writeln!(file, "{line}").ok();
        }
    }
}

/// Console format: `==>` stage headers, indented detail lines, prefixed
/// warnings and errors. Colors only when `color` is set.
struct ConsoleFormat {
    color: bool,
}

impl ConsoleFormat {
    fn paint(&self, sgr: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{sgr}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }
}

impl<S, N> FormatEvent<S, N> for ConsoleFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let raw = message(event);
        let msg = if self.color { raw } else { strip_ansi(&raw) };
        match EventKind::of(event.metadata()) {
            EventKind::Error => writeln!(writer, "{} {msg}", self.paint("31", "error:")),
            EventKind::Warn => writeln!(writer, "{} {msg}", self.paint("33", "warning:")),
            EventKind::Stage => {
                writeln!(writer, "{} {}", self.paint("1;34", "==>"), self.paint("1", &msg))
            }
            EventKind::DryRun => writeln!(writer, "  {} {msg}", self.paint("33", "[dry run]")),
            EventKind::Info => writeln!(writer, "  {msg}"),
            EventKind::Debug => writeln!(writer, "  {}", self.paint("2", &msg)),
        }
    }
}

/// Colors are used when stdout is a terminal and `NO_COLOR` is unset or
/// empty.
fn use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none_or(|v| v.is_empty()) && std::io::stdout().is_terminal()
}

/// Install the global subscriber. Call once, before any logging.
///
/// Info goes to stdout and warnings and errors to stderr; debug reaches the
/// console only with `verbose` or a `RUST_LOG` filter. The log file for
/// `command` (see [`Logger::new`](super::Logger::new)) always receives
/// debug and above.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        EnvFilter, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .and(std::io::stdout.with_min_level(tracing::Level::INFO));
    let console = fmt::layer()
        .event_format(ConsoleFormat { color: use_color() })
        .with_writer(writer)
        .with_filter(console_filter);
    let file = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .ok();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use tracing_subscriber::layer::SubscriberExt as _;

    use super::*;

    fn capture(color: bool, emit: impl FnOnce()) -> String {
        let buf = std::sync::Arc::new(Mutex::new(Vec::<u8>::new()));
        let sink = std::sync::Arc::clone(&buf);
        let layer = tracing_subscriber::fmt::layer()
            .event_format(ConsoleFormat { color })
            .with_writer(move || SinkWriter(std::sync::Arc::clone(&sink)));
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, emit);
        let bytes = buf.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    struct SinkWriter(std::sync::Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SinkWriter {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn plain_console_has_no_escapes() {
        let out = capture(false, || {
            tracing::info!(target: "dotkeeper::stage", "Packages");
            tracing::info!("\x1b[32m✓ brew:jq\x1b[0m");
            tracing::warn!("template skipped");
            tracing::info!(target: "dotkeeper::dry_run", "would add ~/.zshrc");
        });
        assert_eq!(
            out,
            "==> Packages\n  ✓ brew:jq\nwarning: template skipped\n  [dry run] would add ~/.zshrc\n"
        );
    }

    #[test]
    fn color_console_paints_prefixes() {
        let out = capture(true, || tracing::error!("lock file is corrupt"));
        assert_eq!(out, "\x1b[31merror:\x1b[0m lock file is corrupt\n");
    }

    #[test]
    fn file_layer_writes_header_and_rotates() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("apply.log");
        fs::write(&path, "old run\n").unwrap();

        let layer = FileLayer::at(&path, "apply").unwrap();
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || tracing::debug!("scanning"));

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("# dotkeeper "));
        assert!(lines.next().unwrap().ends_with("DEBUG scanning"));
        assert_eq!(fs::read_to_string(tmp.path().join("apply.log.1")).unwrap(), "old run\n");
    }
}
