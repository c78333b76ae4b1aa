use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;

/// Node kinds understood by the run engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNodeType {
    Start,
    End,
    Apply,
    Upload,
    Deploy,
    Notify,
    Branch,
    Condition,
    ExecuteResultBranch,
    ExecuteSuccess,
    ExecuteFailure,
}

impl WorkflowNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Apply => "apply",
            Self::Upload => "upload",
            Self::Deploy => "deploy",
            Self::Notify => "notify",
            Self::Branch => "branch",
            Self::Condition => "condition",
            Self::ExecuteResultBranch => "execute_result_branch",
            Self::ExecuteSuccess => "execute_success",
            Self::ExecuteFailure => "execute_failure",
        }
    }

    /// Nodes that perform an external side effect and publish a skip marker
    pub fn is_action(&self) -> bool {
        matches!(
            self,
            Self::Apply | Self::Upload | Self::Deploy | Self::Notify
        )
    }
}

impl std::fmt::Display for WorkflowNodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named value produced by a node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowNodeIo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub value_type: String,
    #[serde(default)]
    pub value: String,
}

impl WorkflowNodeIo {
    pub fn new(name: impl Into<String>, value_type: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: value_type.to_string(),
            value: value.into(),
        }
    }
}

/// One typed unit of a workflow
///
/// Nodes own their successor and their branch sub-chains, so a definition is
/// always a tree: nothing can be reached from two parents and cycles cannot
/// be expressed. Reusing a chain means cloning it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: WorkflowNodeType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<WorkflowNode>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<WorkflowNode>,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, node_type: WorkflowNodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            name: String::new(),
            config: Map::new(),
            next: None,
            branches: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        if let Value::Object(map) = config {
            self.config = map;
        }
        self
    }

    pub fn with_next(mut self, next: WorkflowNode) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    pub fn with_branches(mut self, branches: Vec<WorkflowNode>) -> Self {
        self.branches = branches;
        self
    }

    /// Name for logs, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Decode the node's config map into its typed form
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T, DomainError> {
        serde_json::from_value(Value::Object(self.config.clone())).map_err(|e| {
            DomainError::InvalidNodeConfig {
                node_id: self.id.clone(),
                field: "config".into(),
                reason: e.to_string(),
            }
        })
    }

    /// Pre-order walk: a node, then its branches in order, then `next`
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter { stack: vec![self] }
    }

    pub fn find(&self, id: &str) -> Option<&WorkflowNode> {
        self.iter().find(|n| n.id == id)
    }

    pub(crate) fn validate_shape(&self) -> Result<(), DomainError> {
        let allowed: &[WorkflowNodeType] = match self.node_type {
            WorkflowNodeType::Branch => &[WorkflowNodeType::Condition],
            WorkflowNodeType::ExecuteResultBranch => &[
                WorkflowNodeType::ExecuteSuccess,
                WorkflowNodeType::ExecuteFailure,
            ],
            _ => &[],
        };

        if allowed.is_empty() && !self.branches.is_empty() {
            return Err(DomainError::InvalidWorkflow(format!(
                "{} node {} cannot hold branches",
                self.node_type, self.id
            )));
        }
        if let Some(bad) = self
            .branches
            .iter()
            .find(|b| !allowed.contains(&b.node_type))
        {
            return Err(DomainError::InvalidWorkflow(format!(
                "{} node {} cannot hold a {} branch",
                self.node_type, self.id, bad.node_type
            )));
        }
        Ok(())
    }
}

pub struct NodeIter<'a> {
    stack: Vec<&'a WorkflowNode>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a WorkflowNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Some(next) = node.next.as_deref() {
            self.stack.push(next);
        }
        self.stack.extend(node.branches.iter().rev());
        Some(node)
    }
}
