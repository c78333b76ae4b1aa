use async_trait::async_trait;
use certflow_domain::workflow::config::DeployNodeConfig;
use certflow_domain::WorkflowNodeIo;
use serde_json::{Map, Value};

use super::{NodeOutcome, NodeProcessor, OUTPUT_NAME_CERTIFICATE};
use crate::context::NodeContext;
use crate::error::{NodeError, NodeResult, ProviderError};
use crate::providers::{merge_config, ProviderOutput};

/// Hands a certificate produced earlier in the run to a deploy target
pub struct DeployProcessor;

#[async_trait]
impl NodeProcessor for DeployProcessor {
    async fn process(&self, ctx: &NodeContext<'_>) -> NodeResult<NodeOutcome> {
        let node = ctx.node;
        let config: DeployNodeConfig = node.config_as()?;
        config.validate(&node.id)?;

        let source = config.source_node_id();
        let certificate_id = ctx
            .outputs
            .value(source, OUTPUT_NAME_CERTIFICATE)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                NodeError::config(
                    &node.id,
                    "certificate",
                    format!("node {source} has not published a certificate in this run"),
                )
            })?;
        let outputs = vec![WorkflowNodeIo::new(
            OUTPUT_NAME_CERTIFICATE,
            "string",
            certificate_id,
        )];

        if config.skip_on_last_succeeded {
            let last = ctx.last_output().await?;
            if last.is_some_and(|o| o.succeeded && o.get(OUTPUT_NAME_CERTIFICATE) == Some(certificate_id)) {
                ctx.logger.info(format!(
                    "Skipping deployment: certificate {certificate_id} was already deployed successfully"
                ));
                return Ok(NodeOutcome::skipped().with_outputs(outputs));
            }
        }

        let certificate = ctx.services.certificates.get_by_id(certificate_id).await?;

        let access_config = if config.provider_access_id.is_empty() {
            Map::new()
        } else {
            ctx.services
                .accesses
                .get_by_id(&config.provider_access_id)
                .await?
                .config
        };
        let provider_config = merge_config(&access_config, &config.provider_config);

        ctx.logger.info(format!(
            "Deploying certificate {} via {}",
            certificate.id, config.provider
        ));
        let registry = &ctx.services.providers;
        let call = async {
            let output = match registry.uploader(&config.provider, &provider_config) {
                Some(uploader) => {
                    uploader?
                        .upload(&certificate.certificate, &certificate.private_key)
                        .await?
                }
                None => {
                    registry
                        .deployer(&config.provider, &provider_config)?
                        .deploy(&certificate.certificate, &certificate.private_key)
                        .await?
                }
            };
            Ok::<_, ProviderError>(output)
        };
        let result: ProviderOutput = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(NodeError::Cancelled),
            result = call => result?,
        };

        ctx.logger
            .info_with("Certificate deployed", Value::Object(result));
        Ok(NodeOutcome::done().with_outputs(outputs))
    }
}
