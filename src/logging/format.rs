//! Subscriber setup and NDJSON output of result rows.

use crate::config::LogConfig;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

pub struct StructuredLogger;

impl StructuredLogger {
    /// Install the global subscriber. Level comes from `RUST_LOG`, else the config.
    /// Logs go to stderr so stdout stays clean for result rows.
    pub fn init(config: &LogConfig) {
        if let Err(e) = Self::try_init(config) {
            eprintln!("logging already initialised: {}", e);
        }
    }

    pub fn try_init(config: &LogConfig) -> Result<(), TryInitError> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
        if config.json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry().with(filter).with(fmt).try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init()
        }
    }

    /// Write each row as one JSON object per line. Returns the number of rows written.
    pub fn emit_json<T: Serialize>(rows: &[T], w: &mut impl Write) -> std::io::Result<usize> {
        for row in rows {
            let line = serde_json::to_string(row)?;
            writeln!(w, "{}", line)?;
        }
        w.flush()?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[derive(Serialize)]
    struct Row {
        user_id: i64,
        anomaly: i8,
    }

    #[test]
    fn one_object_per_line() {
        let rows = [Row { user_id: 1, anomaly: 1 }, Row { user_id: 2, anomaly: -1 }];
        let mut buf = Vec::new();
        assert_eq!(StructuredLogger::emit_json(&rows, &mut buf).unwrap(), 2);
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["anomaly"], -1);
    }
}
