/*
 * Kernel Logger
 *
 * Backend for the `log` facade. Records are formatted as
 * "<LEVEL> - <message>" and forwarded line by line to the console sink
 * the embedding kernel registers at boot.
 */

use core::fmt::{self, Write};

use log::{LevelFilter, Metadata, Record, SetLoggerError};
use spin::Once;

/// Output device for log lines (UART, framebuffer console, ...)
pub trait LogSink: Sync {
    fn write_str(&self, s: &str);
}

struct SinkWriter(&'static dyn LogSink);

impl Write for SinkWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

struct SimpleLogger;

static SINK: Once<&'static dyn LogSink> = Once::new();

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = SINK.get() {
            let _ = writeln!(SinkWriter(*sink), "{} - {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SimpleLogger = SimpleLogger;

/// Install the kernel logger
///
/// # Arguments
/// - `sink`: console receiving the formatted lines
/// - `level`: most verbose level that is emitted
///
/// # Returns
/// An error if a logger was already installed
pub fn init(sink: &'static dyn LogSink, level: LevelFilter) -> Result<(), SetLoggerError> {
    SINK.call_once(|| sink);
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}
