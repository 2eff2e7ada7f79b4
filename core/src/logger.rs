//! Logging facade: a multi-sink `log::Log` implementation.
//!
//! All emulation code logs through the `log` crate macros; this module
//! supplies the process-wide backend the frontend installs once at startup.
//! Sinks are configured from the `LogOutput` setting: `stdout`, `stderr`,
//! `syslog` (routed to stderr on platforms without one), or any number of
//! file paths. Level filtering is global, with `error`/`info`/`debug`/`all`
//! matching the configuration vocabulary.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log level '{0}' (expected debug, info, error, or all)")]
    BadLevel(String),
    #[error("cannot open log file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        source: io::Error,
    },
    #[error("logger already installed")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

/// One configured log destination.
#[derive(Clone, Debug, PartialEq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    Syslog,
    File(PathBuf),
}

impl LogOutput {
    /// Parse one element of a comma-separated `LogOutput` value. Anything
    /// that is not a known destination name is a file path.
    pub fn parse(s: &str) -> LogOutput {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => LogOutput::Stdout,
            "stderr" => LogOutput::Stderr,
            "syslog" => LogOutput::Syslog,
            _ => LogOutput::File(PathBuf::from(s.trim())),
        }
    }
}

/// Parse a configured log level name.
pub fn parse_level(s: &str) -> Result<LevelFilter, LoggerError> {
    match s.to_ascii_lowercase().as_str() {
        "error" => Ok(LevelFilter::Error),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "all" => Ok(LevelFilter::Trace),
        other => Err(LoggerError::BadLevel(other.into())),
    }
}

enum Sink {
    Stdout,
    Stderr,
    File(Mutex<BufWriter<File>>),
}

pub struct MultiLogger {
    level: LevelFilter,
    sinks: Vec<Sink>,
}

impl MultiLogger {
    pub fn new(level: LevelFilter, outputs: &[LogOutput]) -> Result<Self, LoggerError> {
        let mut sinks = Vec::new();
        // Errors always reach the console even when no outputs are
        // configured, so startup failures are never silent.
        if outputs.is_empty() {
            sinks.push(Sink::Stderr);
        }
        for output in outputs {
            match output {
                LogOutput::Stdout => sinks.push(Sink::Stdout),
                LogOutput::Stderr | LogOutput::Syslog => sinks.push(Sink::Stderr),
                LogOutput::File(path) => {
                    let file = File::create(path).map_err(|source| LoggerError::OpenFile {
                        path: path.clone(),
                        source,
                    })?;
                    sinks.push(Sink::File(Mutex::new(BufWriter::new(file))));
                }
            }
        }
        Ok(MultiLogger { level, sinks })
    }

    /// Install as the process-wide `log` backend.
    pub fn install(self) -> Result<(), LoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }

    fn write_line(&self, sink: &Sink, line: &str) {
        match sink {
            Sink::Stdout => {
                let _ = writeln!(io::stdout().lock(), "{line}");
            }
            Sink::Stderr => {
                let _ = writeln!(io::stderr().lock(), "{line}");
            }
            Sink::File(file) => {
                if let Ok(mut w) = file.lock() {
                    let _ = writeln!(w, "{line}");
                }
            }
        }
    }
}

impl Log for MultiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let prefix = match record.level() {
            Level::Error => "error: ",
            Level::Warn => "warning: ",
            _ => "",
        };
        let line = format!("{prefix}{}", record.args());
        for sink in &self.sinks {
            self.write_line(sink, &line);
        }
    }

    fn flush(&self) {
        for sink in &self.sinks {
            if let Sink::File(file) = sink {
                if let Ok(mut w) = file.lock() {
                    let _ = w.flush();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("INFO").unwrap(), LevelFilter::Info);
        assert_eq!(parse_level("all").unwrap(), LevelFilter::Trace);
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    fn output_names() {
        assert_eq!(LogOutput::parse("stderr"), LogOutput::Stderr);
        assert_eq!(
            LogOutput::parse("emu.log"),
            LogOutput::File(PathBuf::from("emu.log"))
        );
    }
}
