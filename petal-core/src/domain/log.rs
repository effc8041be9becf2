//! Log domain types

use serde::{Deserialize, Serialize};

/// A line of output captured while a run executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: LogSource,
    pub message: String,
}

/// Where a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    /// Standard output of the app process
    Stdout,
    /// Standard error of the app process
    Stderr,
    /// Lifecycle messages written by the runner itself
    System,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Stdout => "Stdout",
            LogSource::Stderr => "Stderr",
            LogSource::System => "System",
        }
    }
}

impl std::str::FromStr for LogSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Stdout" => Ok(LogSource::Stdout),
            "Stderr" => Ok(LogSource::Stderr),
            "System" => Ok(LogSource::System),
            other => Err(format!("unknown log source: {}", other)),
        }
    }
}

impl LogEntry {
    pub fn new(source: LogSource, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            source,
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(LogSource::System, message)
    }

    /// Text form of the entry as delivered in a log chunk
    pub fn render(&self) -> String {
        let mut line = self.message.clone();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        line
    }
}
