use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::{WorkflowNode, WorkflowNodeIo};

/// Output name carrying a node's skip marker
pub const OUTPUT_NAME_SKIPPED: &str = "node.skipped";

/// The durable result of one node in one run; written once, never mutated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutput {
    pub workflow_id: String,
    pub run_id: String,
    pub node_id: String,
    /// Snapshot of the node as executed, without its successors
    pub node: WorkflowNode,
    #[serde(default)]
    pub outputs: Vec<WorkflowNodeIo>,
    pub succeeded: bool,
    pub created_at: DateTime<Utc>,
}

impl WorkflowOutput {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.value.as_str())
    }

    /// The skip marker, if this node publishes one
    pub fn skipped(&self) -> Option<bool> {
        self.get(OUTPUT_NAME_SKIPPED).map(|v| v == "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowNodeType;

    #[test]
    fn test_skip_marker_lookup() {
        let mut output = WorkflowOutput {
            workflow_id: "wf".into(),
            run_id: "run".into(),
            node_id: "n".into(),
            node: WorkflowNode::new("n", WorkflowNodeType::Notify),
            outputs: vec![],
            succeeded: true,
            created_at: Utc::now(),
        };
        assert_eq!(output.skipped(), None);

        output
            .outputs
            .push(WorkflowNodeIo::new(OUTPUT_NAME_SKIPPED, "boolean", "true"));
        assert_eq!(output.skipped(), Some(true));
        assert_eq!(output.get("missing"), None);
    }
}
