use async_trait::async_trait;
use certflow_domain::workflow::config::NotifyNodeConfig;
use serde_json::{Map, Value};

use super::{NodeOutcome, NodeProcessor};
use crate::context::NodeContext;
use crate::error::{NodeError, NodeResult};
use crate::providers::merge_config;

/// Sends a message through a notifier provider
pub struct NotifyProcessor;

#[async_trait]
impl NodeProcessor for NotifyProcessor {
    async fn process(&self, ctx: &NodeContext<'_>) -> NodeResult<NodeOutcome> {
        let node = ctx.node;
        let config: NotifyNodeConfig = node.config_as()?;
        config.validate(&node.id)?;

        if config.skip_on_all_prev_skipped && ctx.outputs.all_skipped() {
            ctx.logger
                .info("Skipping notification: every previous action was skipped");
            return Ok(NodeOutcome::skipped());
        }

        let access_config = if config.provider_access_id.is_empty() {
            Map::new()
        } else {
            ctx.services
                .accesses
                .get_by_id(&config.provider_access_id)
                .await?
                .config
        };
        let notifier = ctx.services.providers.notifier(
            &config.provider,
            &merge_config(&access_config, &config.provider_config),
        )?;

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(NodeError::Cancelled),
            result = notifier.notify(&config.subject, &config.message) => result?,
        };
        ctx.logger
            .info_with("Notification sent", Value::Object(result));
        Ok(NodeOutcome::done())
    }
}
