//! Logger implementation for the `log` crate facade

use std::io::Write;

use log::{Level, LevelFilter, Metadata, Record};

/// Simple logger that writes to the host console (stderr)
struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            // Format: [LEVEL] message
            let level_str = match record.level() {
                Level::Error => "ERROR",
                Level::Warn => "WARN ",
                Level::Info => "INFO ",
                Level::Debug => "DEBUG",
                Level::Trace => "TRACE",
            };

            let stderr = std::io::stderr();
            let mut out = stderr.lock();
            let _ = writeln!(out, "[{}] {}", level_str, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Global logger instance
static LOGGER: SimpleLogger = SimpleLogger;

/// Initialize the logger at INFO level
pub fn init() {
    init_with_level(LevelFilter::Info);
}

/// Initialize with specific log level.
///
/// The first call installs the logger; later calls only adjust the level.
pub fn init_with_level(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_with_level(LevelFilter::Debug);
        init();
        assert_eq!(log::max_level(), LevelFilter::Info);
        log::info!("logger test line");
    }
}
