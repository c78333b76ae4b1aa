//! Run-scoped node logging
//!
//! Every line goes to `tracing` and into a buffer of [`WorkflowLog`] records
//! that the engine flushes to the log repository once the node finishes.

use std::sync::Mutex;

use certflow_domain::{now_millis, LogLevel, WorkflowLog, WorkflowNode};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

pub struct NodeLogger {
    workflow_id: String,
    run_id: String,
    node_id: String,
    node_name: String,
    records: Mutex<Vec<WorkflowLog>>,
}

impl NodeLogger {
    pub fn new(workflow_id: &str, run_id: &str, node: &WorkflowNode) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            node_id: node.id.clone(),
            node_name: node.display_name().to_string(),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::DEBUG, message.into(), Map::new());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::INFO, message.into(), Map::new());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::WARN, message.into(), Map::new());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::ERROR, message.into(), Map::new());
    }

    /// Info line carrying structured attributes
    pub fn info_with(&self, message: impl Into<String>, data: Value) {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.log(LogLevel::INFO, message.into(), data);
    }

    pub fn log(&self, level: LogLevel, message: String, data: Map<String, Value>) {
        let run_id = self.run_id.as_str();
        let node_id = self.node_id.as_str();
        if level >= LogLevel::ERROR {
            error!(run_id, node_id, "{}", message);
        } else if level >= LogLevel::WARN {
            warn!(run_id, node_id, "{}", message);
        } else if level >= LogLevel::INFO {
            info!(run_id, node_id, "{}", message);
        } else {
            debug!(run_id, node_id, "{}", message);
        }

        let record = WorkflowLog {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
            node_id: self.node_id.clone(),
            node_name: self.node_name.clone(),
            timestamp: now_millis(),
            level,
            message,
            data,
        };
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    /// Drain buffered records in emission order
    pub fn take(&self) -> Vec<WorkflowLog> {
        match self.records.lock() {
            Ok(mut records) => std::mem::take(&mut *records),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}
