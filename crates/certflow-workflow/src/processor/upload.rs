use async_trait::async_trait;
use certflow_acme::x509::{parse_certificate_pem, split_chain, validate_private_key_pem};
use certflow_domain::workflow::config::UploadNodeConfig;
use certflow_domain::{join_domains, Certificate, CertificateSource};
use chrono::Utc;
use serde_json::json;

use super::{certificate_outputs, NodeOutcome, NodeProcessor};
use crate::context::{optional, NodeContext};
use crate::error::{NodeError, NodeResult};

/// Stores a user-supplied certificate and key pair
pub struct UploadProcessor;

#[async_trait]
impl NodeProcessor for UploadProcessor {
    async fn process(&self, ctx: &NodeContext<'_>) -> NodeResult<NodeOutcome> {
        let node = ctx.node;
        let config: UploadNodeConfig = node.config_as()?;
        config.validate(&node.id)?;

        let certificate_pem = config.certificate.trim();
        let private_key_pem = config.private_key.trim();
        let info = parse_certificate_pem(certificate_pem)
            .map_err(|e| NodeError::config(&node.id, "certificate", e.to_string()))?;
        let now = Utc::now();
        if info.not_after <= now {
            return Err(NodeError::config(
                &node.id,
                "certificate",
                format!("certificate expired at {}", info.not_after.to_rfc3339()),
            ));
        }
        validate_private_key_pem(private_key_pem)
            .map_err(|e| NodeError::config(&node.id, "privateKey", e.to_string()))?;

        let last = optional(
            ctx.services
                .certificates
                .get_by_workflow_node_id(&node.id)
                .await,
        )?;
        if let Some(last) = last.filter(|c| {
            c.certificate.trim() == certificate_pem && c.private_key.trim() == private_key_pem
        }) {
            ctx.logger
                .info(format!("Certificate already uploaded as {}, reusing it", last.id));
            return Ok(NodeOutcome::skipped().with_outputs(certificate_outputs(&last, now)));
        }

        let (_, issuer_certificate) = split_chain(certificate_pem);
        let certificate = ctx
            .services
            .certificates
            .save(Certificate {
                source: CertificateSource::Upload,
                subject_alt_names: join_domains(&info.subject_alt_names),
                serial_number: info.serial_number,
                certificate: certificate_pem.to_string(),
                private_key: private_key_pem.to_string(),
                issuer_org: info.issuer_org,
                issuer_certificate,
                validity_not_before: Some(info.not_before),
                validity_not_after: Some(info.not_after),
                workflow_id: ctx.workflow_id.to_string(),
                workflow_run_id: ctx.run_id.to_string(),
                workflow_node_id: node.id.clone(),
                ..Default::default()
            })
            .await?;

        ctx.logger.info_with(
            "Certificate uploaded",
            json!({
                "certificateId": certificate.id,
                "subjectAltNames": certificate.subject_alt_names,
            }),
        );
        Ok(NodeOutcome::done().with_outputs(certificate_outputs(&certificate, now)))
    }
}
