use crate::config::{LogLevel, LoggingConfig};

use chrono::Local;
use colored::Colorize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A single log entry as captured by the in-memory sink.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub component: String,
    pub message: String,
}

enum Sink {
    Console,
    File(Mutex<File>),
    Memory(Mutex<Vec<LogRecord>>),
}

struct Sinks {
    level: LogLevel,
    sinks: Vec<Sink>,
}

/// Logging handle owned by each component.
///
/// A handle is created once at process start (`Logger::new`) and handed to
/// every component that needs to report; `named` derives a handle tagged with
/// the component's name that writes to the same sinks. There is no global
/// logger state.
#[derive(Clone)]
pub struct Logger {
    component: String,
    shared: Arc<Sinks>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("component", &self.component)
            .field("level", &self.shared.level)
            .field("sinks", &self.shared.sinks.len())
            .finish()
    }
}

impl Logger {
    /// Builds a logger from the logging section of the config.
    ///
    /// # Arguments
    ///
    /// * `config` - level, console switch and optional log file
    ///
    /// # Returns
    ///
    /// * `io::Result<Logger>` - fails only if the log file cannot be opened
    pub fn new(config: &LoggingConfig) -> io::Result<Self> {
        let mut sinks = Vec::new();
        if config.console {
            sinks.push(Sink::Console);
        }
        if let Some(filename) = &config.file {
            // Create directory if it doesn't exist
            let log_dir = Path::new(&config.directory);
            if !log_dir.exists() {
                std::fs::create_dir_all(log_dir)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join(filename))?;
            sinks.push(Sink::File(Mutex::new(file)));
        }

        Ok(Self::from_sinks(config.level, sinks))
    }

    /// A logger that drops every record.
    pub fn disabled() -> Self {
        Self::from_sinks(LogLevel::Error, Vec::new())
    }

    /// A logger that keeps every record in memory, see `records`.
    pub fn memory(level: LogLevel) -> Self {
        Self::from_sinks(level, vec![Sink::Memory(Mutex::new(Vec::new()))])
    }

    fn from_sinks(level: LogLevel, sinks: Vec<Sink>) -> Self {
        Self {
            component: "neurostream".to_string(),
            shared: Arc::new(Sinks { level, sinks }),
        }
    }

    /// Derives a handle for `component` sharing this logger's sinks.
    pub fn named(&self, component: &str) -> Self {
        Self {
            component: component.to_string(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.shared.level && !self.shared.sinks.is_empty()
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message.as_ref());
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if !self.enabled(level) {
            return;
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        for sink in &self.shared.sinks {
            // A failing sink never fails the caller.
            match sink {
                Sink::Console => {
                    let tag = match level {
                        LogLevel::Debug => "DEBUG".dimmed(),
                        LogLevel::Info => "INFO".green(),
                        LogLevel::Warning => "WARNING".yellow(),
                        LogLevel::Error => "ERROR".red().bold(),
                    };
                    eprintln!("{} | {:<7} | {} | {}", timestamp, tag, self.component, message);
                }
                Sink::File(file) => {
                    if let Ok(mut file) = file.lock() {
                        let _ = writeln!(
                            file,
                            "{} | {:<7} | {} | {}",
                            timestamp,
                            level.as_str(),
                            self.component,
                            message
                        );
                    }
                }
                Sink::Memory(records) => {
                    if let Ok(mut records) = records.lock() {
                        records.push(LogRecord {
                            level,
                            component: self.component.clone(),
                            message: message.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Records captured by a `Logger::memory` sink, oldest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.shared
            .sinks
            .iter()
            .filter_map(|sink| match sink {
                Sink::Memory(records) => records.lock().ok().map(|r| r.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Number of captured records at exactly `level`.
    pub fn count(&self, level: LogLevel) -> usize {
        self.records().iter().filter(|r| r.level == level).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_logger_filters_by_level() {
        let logger = Logger::memory(LogLevel::Info);
        let child = logger.named("ring_buffer");

        child.debug("dropped");
        child.info("kept");
        child.warning("kept too");

        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].component, "ring_buffer");
        assert_eq!(records[1].level, LogLevel::Warning);
        assert_eq!(logger.count(LogLevel::Warning), 1);
    }

    #[test]
    fn disabled_logger_records_nothing() {
        let logger = Logger::disabled();
        logger.error("nothing to see");
        assert!(logger.records().is_empty());
        assert!(!logger.enabled(LogLevel::Error));
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: LogLevel::Debug,
            console: false,
            file: Some("test.log".to_string()),
            directory: dir.path().to_string_lossy().into_owned(),
        };

        let logger = Logger::new(&config).unwrap().named("filter_bank");
        logger.info("first");
        logger.warning("second");

        let content = std::fs::read_to_string(dir.path().join("test.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].ends_with("filter_bank | first"));
        assert!(lines[1].contains("WARNING"));
    }
}
