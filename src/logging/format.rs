//! Log output: tracing events as JSON lines (ndjson) or plain text, plus a raw ndjson writer.

use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber and writes standalone JSON lines.
pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber on stderr; RUST_LOG overrides `default_level`.
    /// Stdout stays free for Windowed Count lines.
    pub fn init(json: bool, default_level: &str) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let registry = tracing_subscriber::registry().with(filter);
        let result = if json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_span_events(FmtSpan::NONE)
                        .with_writer(std::io::stderr),
                )
                .try_init()
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()
        };
        if result.is_err() {
            tracing::debug!("global subscriber already installed");
        }
    }

    /// Write one value as a single JSON line, bypassing tracing.
    pub fn emit_json(value: &impl Serialize, w: &mut impl Write) -> std::io::Result<()> {
        let line = serde_json::to_string(value)?;
        writeln!(w, "{}", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Line<'a> {
        message: &'a str,
        n: u32,
    }

    #[test]
    fn emit_json_writes_single_line() {
        let mut out = Vec::new();
        StructuredLogger::emit_json(&Line { message: "a\nb", n: 1 }, &mut out).unwrap();
        assert_eq!(out, b"{\"message\":\"a\\nb\",\"n\":1}\n");
    }

    #[test]
    fn init_twice_does_not_panic() {
        StructuredLogger::init(true, "warn");
        StructuredLogger::init(false, "warn");
    }
}
