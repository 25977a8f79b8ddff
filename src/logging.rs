use std::sync::OnceLock;

use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

static LOGGER: OnceLock<HostLogger> = OnceLock::new();

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

/// Logger that hands records to the embedding host as [`LogMessage`]s, or
/// prints them to stderr when the host did not ask for them.
pub struct HostLogger {
    sink: Option<UnboundedSender<LogMessage>>,
    level: Level,
}

impl HostLogger {
    pub fn new(sink: Option<UnboundedSender<LogMessage>>, level: Level) -> Self {
        Self { sink, level }
    }

    /// Installs the logger process-wide. Fails if any logger is already set.
    pub fn init(sink: Option<UnboundedSender<LogMessage>>, level: Level) -> Result<(), SetLoggerError> {
        let logger = LOGGER.get_or_init(|| HostLogger::new(sink, level));
        log::set_logger(logger).map(|()| log::set_max_level(logger.level.to_level_filter()))
    }

    fn emit_log(&self, sink: &UnboundedSender<LogMessage>, record: &Record) {
        let log_message = LogMessage {
            level: record.level().to_string(),
            message: record.args().to_string(),
            timestamp: Local::now().to_rfc3339(),
        };

        if sink.send(log_message).is_err() {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }
}

impl log::Log for HostLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match &self.sink {
            Some(sink) => self.emit_log(sink, record),
            None => eprintln!("[{}] {}", record.level(), record.args()),
        }
    }

    fn flush(&self) {}
}

/// Installs [`HostLogger`], falling back to `env_logger` if another logger got there first.
pub fn init_logging(level: LevelFilter, sink: Option<UnboundedSender<LogMessage>>) {
    let Some(host_level) = level.to_level() else {
        log::set_max_level(LevelFilter::Off);
        return;
    };
    if HostLogger::init(sink, host_level).is_err() {
        let _ = env_logger::builder().filter_level(level).try_init();
    }
}
