//! Per-run logger with file and sink output.
//!
//! One run spans many short stage invocations, so the log file is opened in
//! append mode and named after the run id. Every line is also emitted as a
//! `tracing` event carrying the run id.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use uuid::Uuid;

use super::types::{LogConfig, LogLevel, LogSink, MessagePrefix};

pub struct RunLogger {
    run_id: Uuid,
    log_path: Option<PathBuf>,
    file_writer: Mutex<Option<BufWriter<File>>>,
    sink: Option<LogSink>,
    config: LogConfig,
    tail_buffer: Mutex<VecDeque<String>>,
}

impl RunLogger {
    pub fn builder(run_id: Uuid) -> RunLoggerBuilder {
        RunLoggerBuilder::new(run_id)
    }

    /// Logger that only mirrors into `tracing` and keeps a tail.
    pub fn detached(run_id: Uuid, config: LogConfig) -> Self {
        Self {
            run_id,
            log_path: None,
            file_writer: Mutex::new(None),
            sink: None,
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }

        self.mirror(level, message);
        self.remember(message);
        self.output(&self.format_message(message));
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// `=== name ===` marker at the start of a stage invocation.
    pub fn stage(&self, name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Stage.format(name));
    }

    pub fn section(&self, name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Section.format(name));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Raw engine or store detail. In compact mode it only reaches the tail
    /// buffer.
    pub fn detail(&self, line: &str) {
        self.remember(line);
        if self.config.compact {
            return;
        }
        tracing::trace!(run_id = %self.run_id, "{}", line);
        self.output(&self.format_message(line));
    }

    /// Replay the tail buffer under a header, typically after a failure.
    pub fn show_tail(&self, header: &str) {
        let lines: Vec<String> = self.tail_buffer.lock().iter().cloned().collect();
        if lines.is_empty() {
            return;
        }

        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in &lines {
            self.output(&self.format_message(line));
        }
    }

    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(writer) = self.file_writer.lock().as_mut() {
            let _ = writer.flush();
        }
    }

    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn remember(&self, line: &str) {
        if self.config.error_tail == 0 {
            return;
        }
        let mut buffer = self.tail_buffer.lock();
        if buffer.len() >= self.config.error_tail {
            buffer.pop_front();
        }
        buffer.push_back(line.to_string());
    }

    fn mirror(&self, level: LogLevel, message: &str) {
        let run_id = self.run_id;
        match level {
            LogLevel::Trace => tracing::trace!(run_id = %run_id, "{}", message),
            LogLevel::Debug => tracing::debug!(run_id = %run_id, "{}", message),
            LogLevel::Info => tracing::info!(run_id = %run_id, "{}", message),
            LogLevel::Warn => tracing::warn!(run_id = %run_id, "{}", message),
            LogLevel::Error => tracing::error!(run_id = %run_id, "{}", message),
        }
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(writer) = self.file_writer.lock().as_mut() {
            let _ = writeln!(writer, "{}", formatted);
        }
        if let Some(sink) = &self.sink {
            sink(formatted);
        }
    }
}

impl Drop for RunLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fluent construction of a [`RunLogger`].
pub struct RunLoggerBuilder {
    run_id: Uuid,
    log_dir: Option<PathBuf>,
    config: LogConfig,
    sink: Option<LogSink>,
}

impl RunLoggerBuilder {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            log_dir: None,
            config: LogConfig::default(),
            sink: None,
        }
    }

    /// Write `run-{run_id}.log` inside this directory.
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn sink(mut self, sink: LogSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> std::io::Result<RunLogger> {
        let mut logger = RunLogger::detached(self.run_id, self.config);
        logger.sink = self.sink;

        if let Some(dir) = self.log_dir {
            fs::create_dir_all(&dir)?;
            let path = dir.join(format!("run-{}.log", self.run_id));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            logger.file_writer = Mutex::new(Some(BufWriter::new(file)));
            logger.log_path = Some(path);
        }

        Ok(logger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn quiet() -> LogConfig {
        LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        }
    }

    #[test]
    fn appends_across_invocations() {
        let dir = tempdir().unwrap();
        let run_id = Uuid::new_v4();

        let first = RunLogger::builder(run_id).log_dir(dir.path()).config(quiet()).build().unwrap();
        first.stage("Transcription");
        drop(first);

        let second = RunLogger::builder(run_id).log_dir(dir.path()).config(quiet()).build().unwrap();
        second.success("done");
        let path = second.log_path().unwrap().to_path_buf();
        drop(second);

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content, "=== Transcription ===\n[SUCCESS] done\n");
    }

    #[test]
    fn sink_receives_lines_above_level() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let logger = RunLogger::builder(Uuid::new_v4())
            .config(quiet())
            .sink(Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .build()
            .unwrap();

        logger.debug("hidden");
        logger.info("one");
        logger.warn("two");

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compact_details_only_reach_tail() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let logger = RunLogger::builder(Uuid::new_v4())
            .config(LogConfig {
                error_tail: 3,
                ..quiet()
            })
            .sink(Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .build()
            .unwrap();

        for i in 0..5 {
            logger.detail(&format!("line {}", i));
        }

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(logger.get_tail(), vec!["line 2", "line 3", "line 4"]);
    }
}
