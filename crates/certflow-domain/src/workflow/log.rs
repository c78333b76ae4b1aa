use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity ordinal, comparable by value
///
/// Uses the same spacing as the structured logger the records are
/// exchanged with, so intermediate custom levels still order correctly.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct LogLevel(pub i32);

impl LogLevel {
    pub const DEBUG: LogLevel = LogLevel(-4);
    pub const INFO: LogLevel = LogLevel(0);
    pub const WARN: LogLevel = LogLevel(4);
    pub const ERROR: LogLevel = LogLevel(8);
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            l if l >= Self::ERROR => write!(f, "ERROR"),
            l if l >= Self::WARN => write!(f, "WARN"),
            l if l >= Self::INFO => write!(f, "INFO"),
            _ => write!(f, "DEBUG"),
        }
    }
}

/// One log line emitted while a run was executing a node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowLog {
    pub workflow_id: String,
    pub run_id: String,
    pub node_id: String,
    #[serde(default)]
    pub node_name: String,
    /// Millisecond epoch
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// The logs of one run, in insertion order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct WorkflowLogs(pub Vec<WorkflowLog>);

impl WorkflowLogs {
    /// Order by timestamp, keeping insertion order among ties
    pub fn sort_by_timestamp(&mut self) {
        self.0.sort_by_key(|log| log.timestamp);
    }

    /// Every error-or-worse message, newline-joined, whitespace-trimmed
    ///
    /// This is the user-facing failure summary of a run.
    pub fn error_string(&self) -> String {
        let mut out = String::new();
        for log in self.0.iter().filter(|l| l.level >= LogLevel::ERROR) {
            out.push_str(&log.message);
            out.push('\n');
        }
        out.trim().to_string()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkflowLog> {
        self.0.iter()
    }
}

impl From<Vec<WorkflowLog>> for WorkflowLogs {
    fn from(logs: Vec<WorkflowLog>) -> Self {
        Self(logs)
    }
}
