//! Minimal stderr logger.
//!
//! libgou only talks to the `log` facade. Applications that already install a
//! logger keep theirs; the rest can call [`init`] to get `[LEVEL] target: msg`
//! lines on stderr.

use std::io::{self, Write};

use conquer_once::spin::OnceCell;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

static LOGGER: OnceCell<StderrLogger> = OnceCell::uninit();

pub struct StderrLogger {
    level: LevelFilter,
}

impl StderrLogger {
    const fn new(level: LevelFilter) -> Self {
        Self { level }
    }
}

/// One log line, without the trailing newline.
pub fn format_record(record: &Record) -> String {
    format!(
        "[{:>5}] {}: {}",
        record.level(),
        record.target(),
        record.args()
    )
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // A single write per record so lines from the presentation thread and
        // producers do not interleave.
        let line = format_record(record) + "\n";
        let _ = io::stderr().lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// Install the stderr logger at `level`.
///
/// Only the first call installs anything; later calls, and calls after some
/// other logger was installed, return the `log` crate's error.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.get_or_init(|| StderrLogger::new(level));
    log::set_logger(logger)?;
    log::set_max_level(logger.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn test_record_format() {
        let line = format_record(
            &Record::builder()
                .level(Level::Info)
                .target("gou::display")
                .args(format_args!("{} slots", 3))
                .build(),
        );
        assert_eq!(line, "[ INFO] gou::display: 3 slots");
    }

    #[test]
    fn test_level_filter() {
        let logger = StderrLogger::new(LevelFilter::Info);
        let debug = Metadata::builder().level(Level::Debug).build();
        let warn = Metadata::builder().level(Level::Warn).build();
        assert!(!logger.enabled(&debug));
        assert!(logger.enabled(&warn));
    }
}
