use async_trait::async_trait;
use certflow_domain::workflow::config::ConditionNodeConfig;
use certflow_domain::WorkflowNodeType;

use super::{NodeOutcome, NodeProcessor};
use crate::context::NodeContext;
use crate::error::NodeResult;

/// Picks the first condition branch whose expression holds
pub struct BranchProcessor;

#[async_trait]
impl NodeProcessor for BranchProcessor {
    async fn process(&self, ctx: &NodeContext<'_>) -> NodeResult<NodeOutcome> {
        let resolve = |node_id: &str, name: &str| ctx.outputs.value(node_id, name).map(str::to_string);

        for (index, condition) in ctx.node.branches.iter().enumerate() {
            let config: ConditionNodeConfig = condition.config_as()?;
            let passed = match &config.expression {
                Some(expr) => expr.eval_bool(&resolve)?,
                None => true,
            };
            if passed {
                ctx.logger
                    .info(format!("Condition {} matched", condition.display_name()));
                return Ok(NodeOutcome::done().with_branch(Some(index)));
            }
        }

        ctx.logger.info("No condition matched");
        Ok(NodeOutcome::done())
    }
}

/// Routes to the success or failure branch by the predecessor's outcome
pub struct ExecuteResultBranchProcessor;

#[async_trait]
impl NodeProcessor for ExecuteResultBranchProcessor {
    async fn process(&self, ctx: &NodeContext<'_>) -> NodeResult<NodeOutcome> {
        let wanted = if ctx.previous_failed {
            WorkflowNodeType::ExecuteFailure
        } else {
            WorkflowNodeType::ExecuteSuccess
        };
        let branch = ctx
            .node
            .branches
            .iter()
            .position(|b| b.node_type == wanted);
        ctx.logger.debug(format!(
            "Previous node {}, following {} branch",
            if ctx.previous_failed { "failed" } else { "succeeded" },
            wanted
        ));
        Ok(NodeOutcome::done().with_branch(branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NodeLogger;
    use crate::processor::test_support::Harness;
    use crate::providers::ProviderRegistry;
    use certflow_domain::{WorkflowNode, WorkflowNodeIo, WorkflowOutput};
    use chrono::Utc;
    use serde_json::json;

    fn condition(id: &str, min_days: Option<u32>) -> WorkflowNode {
        let node = WorkflowNode::new(id, WorkflowNodeType::Condition);
        match min_days {
            Some(days) => node.with_config(json!({
                "expression": {
                    "type": "comparison",
                    "left": {
                        "type": "var",
                        "selector": { "id": "apply", "name": "certificate.daysLeft", "type": "number" }
                    },
                    "operator": "gt",
                    "right": { "type": "const", "value": days.to_string(), "valueType": "number" }
                }
            })),
            None => node,
        }
    }

    fn harness(days_left: &str) -> Harness {
        Harness::new(ProviderRegistry::new()).with_outputs(vec![WorkflowOutput {
            workflow_id: "wf".into(),
            run_id: "run".into(),
            node_id: "apply".into(),
            node: WorkflowNode::new("apply", WorkflowNodeType::Apply),
            outputs: vec![WorkflowNodeIo::new("certificate.daysLeft", "number", days_left)],
            succeeded: true,
            created_at: Utc::now(),
        }])
    }

    #[tokio::test]
    async fn test_first_passing_condition_wins() {
        let node = WorkflowNode::new("branch", WorkflowNodeType::Branch).with_branches(vec![
            condition("long", Some(60)),
            condition("short", Some(10)),
            condition("fallback", None),
        ]);
        let logger = NodeLogger::new("wf", "run", &node);

        let outcome = BranchProcessor
            .process(&harness("30").context(&node, &logger))
            .await
            .unwrap();
        assert_eq!(outcome.branch, Some(1));

        let outcome = BranchProcessor
            .process(&harness("5").context(&node, &logger))
            .await
            .unwrap();
        assert_eq!(outcome.branch, Some(2));
    }

    #[tokio::test]
    async fn test_result_branch_follows_predecessor() {
        let node = WorkflowNode::new("result", WorkflowNodeType::ExecuteResultBranch).with_branches(vec![
            WorkflowNode::new("ok", WorkflowNodeType::ExecuteSuccess),
            WorkflowNode::new("ko", WorkflowNodeType::ExecuteFailure),
        ]);
        let logger = NodeLogger::new("wf", "run", &node);
        let harness = Harness::new(ProviderRegistry::new());

        let mut ctx = harness.context(&node, &logger);
        let outcome = ExecuteResultBranchProcessor.process(&ctx).await.unwrap();
        assert_eq!(outcome.branch, Some(0));

        ctx.previous_failed = true;
        let outcome = ExecuteResultBranchProcessor.process(&ctx).await.unwrap();
        assert_eq!(outcome.branch, Some(1));
    }
}
