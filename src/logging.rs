//! Application log.
//!
//! Every record is written as `[YYYY-MM-DD HH:MM:SS] message` (local time) to
//! an append-only file. `env_logger` serialises writers, so concurrent tasks
//! never interleave within a line. The level defaults to `info` and follows
//! `RUST_LOG` when set.

use chrono::{Local, NaiveDateTime};
use env_logger::{Builder, Env, Target};
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render one application log line (without newline).
pub fn format_entry(timestamp: NaiveDateTime, message: &str) -> String {
    format!("[{}] {}", timestamp.format(TIMESTAMP_FORMAT), message)
}

/// Install the global logger writing to `app_log`.
///
/// Falls back to stderr if the file cannot be opened. Returns `true` when
/// logging goes to the file. Calling this twice keeps the first logger.
pub fn init(app_log: &Path) -> bool {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{}",
            format_entry(Local::now().naive_local(), &record.args().to_string())
        )
    });

    let open_error = match open_append(app_log) {
        Ok(file) => {
            builder.target(Target::Pipe(Box::new(file)));
            None
        }
        Err(e) => Some(e),
    };

    if builder.try_init().is_err() {
        return false;
    }

    match open_error {
        Some(e) => {
            warn!("Cannot open {}: {}, logging to stderr", app_log.display(), e);
            false
        }
        None => true,
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::error;
    use std::fs;

    #[test]
    fn test_format_entry() {
        let ts = NaiveDateTime::parse_from_str("2025-06-24 16:33:46", TIMESTAMP_FORMAT).unwrap();
        assert_eq!(
            format_entry(ts, "Connected: IP = 10.0.0.2"),
            "[2025-06-24 16:33:46] Connected: IP = 10.0.0.2"
        );
    }

    #[test]
    fn test_init_writes_to_file() {
        let path = std::env::temp_dir().join(format!("app-log-test-{}.txt", std::process::id()));
        let _ = fs::remove_file(&path);

        assert!(init(&path));
        error!("recorder thread panicked");
        log::logger().flush();

        let content = fs::read_to_string(&path).unwrap();
        // Other tests may log concurrently once the logger is installed.
        assert!(content
            .lines()
            .any(|line| line.starts_with('[') && line.ends_with("] recorder thread panicked")));

        let _ = fs::remove_file(&path);
    }
}
