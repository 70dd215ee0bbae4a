use crate::shared::time::now_secs;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const LOG_FILE_REL_PATH: &str = "logs/sitelift.log";

pub fn run_log_path(state_root: &Path) -> PathBuf {
    state_root.join(LOG_FILE_REL_PATH)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Appends one JSON object per line. Failures to write are swallowed.
#[derive(Debug, Clone)]
pub struct RunLogger {
    path: PathBuf,
}

impl RunLogger {
    pub fn new(state_root: &Path) -> Self {
        Self {
            path: run_log_path(state_root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, level: LogLevel, event: &str, run_id: Option<&str>, message: &str) {
        let payload = serde_json::json!({
            "timestamp": now_secs(),
            "level": level.as_str(),
            "event": event,
            "run_id": run_id,
            "message": message,
        });

        let Ok(line) = serde_json::to_string(&payload) else {
            return;
        };

        if let Some(parent) = self.path.parent() {
            if fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let Ok(mut file) = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        else {
            return;
        };
        let _ = writeln!(file, "{line}");
    }

    pub fn info(&self, event: &str, run_id: Option<&str>, message: &str) {
        self.log(LogLevel::Info, event, run_id, message);
    }

    pub fn warn(&self, event: &str, run_id: Option<&str>, message: &str) {
        self.log(LogLevel::Warn, event, run_id, message);
    }

    pub fn error(&self, event: &str, run_id: Option<&str>, message: &str) {
        self.log(LogLevel::Error, event, run_id, message);
    }
}
