use std::fmt::{self, Write as _};
use std::sync::{Arc, Once};

use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// Verbosity, from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl From<&Level> for LogLevel {
    fn from(level: &Level) -> Self {
        if *level == Level::ERROR {
            Self::Error
        } else if *level == Level::WARN {
            Self::Warn
        } else if *level == Level::INFO {
            Self::Info
        } else if *level == Level::DEBUG {
            Self::Debug
        } else {
            Self::Trace
        }
    }
}

/// Application-supplied log destination.
///
/// Receives every record at `level()` or less verbose, already formatted
/// as `target: message key=value ...`. Called on whichever thread logged.
pub trait LogSink: Send + Sync {
    fn level(&self) -> LogLevel;
    fn log(&self, level: LogLevel, message: &str);

    fn is_enabled(&self, level: LogLevel) -> bool {
        level <= self.level()
    }
}

/// `tracing` layer forwarding records to a [`LogSink`].
pub struct SinkLayer {
    sink: Arc<dyn LogSink>,
}

impl SinkLayer {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = LogLevel::from(metadata.level());
        if !self.sink.is_enabled(level) {
            return;
        }
        let mut line = LineVisitor::default();
        event.record(&mut line);
        self.sink
            .log(level, &format!("{}: {}{}", metadata.target(), line.message, line.fields));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(level: LogLevel) -> String {
    let level = level.as_str();
    format!("huddle_core={level},huddle_media={level}")
}

/// Install the fmt subscriber. Only the first call in a process has an
/// effect; a subscriber installed by the host application is left alone.
pub fn init_logging(level: LogLevel) {
    install(level, None);
}

/// Like [`init_logging`], and also hand every record to `sink`.
pub fn init_logging_with_sink(level: LogLevel, sink: Arc<dyn LogSink>) {
    install(level, Some(sink));
}

fn install(level: LogLevel, sink: Option<Arc<dyn LogSink>>) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive(level)));
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_ansi(false))
            .with(sink.map(SinkLayer::new))
            .try_init();
        if installed.is_err() {
            tracing::debug!("global subscriber already set");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Captured {
        level: LogLevel,
        lines: Mutex<Vec<(LogLevel, String)>>,
    }

    impl LogSink for Captured {
        fn level(&self) -> LogLevel {
            self.level
        }

        fn log(&self, level: LogLevel, message: &str) {
            self.lines.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn directive_covers_both_crates() {
        assert_eq!(
            default_directive(LogLevel::Debug),
            "huddle_core=debug,huddle_media=debug"
        );
    }

    #[test]
    fn level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        let level: LogLevel = serde_json::from_str("\"trace\"").unwrap();
        assert_eq!(level, LogLevel::Trace);
    }

    #[test]
    fn sink_receives_records_up_to_its_level() {
        let sink = Arc::new(Captured {
            level: LogLevel::Info,
            lines: Mutex::new(Vec::new()),
        });
        let subscriber = tracing_subscriber::registry().with(SinkLayer::new(sink.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "huddle_core::devices", device = "Mic", "device lost");
            tracing::debug!("too verbose");
            tracing::info!(conference_id = %"c1", "joined");
        });

        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, LogLevel::Warn);
        assert_eq!(lines[0].1, "huddle_core::devices: device lost device=Mic");
        assert_eq!(lines[1].0, LogLevel::Info);
        assert!(lines[1].1.ends_with("joined conference_id=c1"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logging(LogLevel::Info);
        init_logging(LogLevel::Trace);
    }
}
