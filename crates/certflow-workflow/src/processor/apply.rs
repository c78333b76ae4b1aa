use std::time::Duration;

use async_trait::async_trait;
use certflow_acme::x509::parse_certificate_pem;
use certflow_acme::{detect_replacement, ApplyError, ApplyRequest, KeyAlgorithm};
use certflow_domain::workflow::config::ApplyNodeConfig;
use certflow_domain::{join_domains, Certificate, CertificateSource, WorkflowOutput};
use chrono::Utc;
use serde_json::{json, Map};

use super::{certificate_outputs, NodeOutcome, NodeProcessor};
use crate::context::{optional, NodeContext};
use crate::error::{NodeError, NodeResult};
use crate::providers::merge_config;

/// Obtains a certificate over DNS-01 and stores it
pub struct ApplyProcessor;

#[async_trait]
impl NodeProcessor for ApplyProcessor {
    async fn process(&self, ctx: &NodeContext<'_>) -> NodeResult<NodeOutcome> {
        let node = ctx.node;
        let config: ApplyNodeConfig = node.config_as()?;
        config.validate(&node.id)?;

        let domains = config.domain_list();
        let key_algorithm = KeyAlgorithm::from_name(&config.key_algorithm);
        let last_certificate = optional(
            ctx.services
                .certificates
                .get_by_workflow_node_id(&node.id)
                .await,
        )?;

        if let Some(certificate) = &last_certificate {
            let last_output = ctx.last_output().await?;
            if let Some(reason) = skip_reason(
                &config,
                &domains,
                key_algorithm,
                certificate,
                last_output.as_ref(),
            ) {
                ctx.logger.info(format!("Skipping certificate application: {reason}"));
                return Ok(NodeOutcome::skipped()
                    .with_outputs(certificate_outputs(certificate, Utc::now())));
            }
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
        let provider_config = merge_config(&access_config, &config.provider_config);
        let challenge_provider = ctx
            .services
            .providers
            .dns(&config.provider, &provider_config)?;

        let replacement = detect_replacement(last_certificate.as_ref(), &domains);
        if let Some(hint) = &replacement {
            ctx.logger
                .debug(format!("Order may replace certificate {}", hint.cert_id));
        }

        let mut request =
            ApplyRequest::new(domains.clone(), config.contact_email.clone(), challenge_provider);
        request.key_algorithm = key_algorithm;
        request.nameservers = config.nameserver_list();
        request.dns_propagation_timeout = config.dns_propagation_timeout.map(Duration::from_secs);
        request.dns_ttl = config.dns_ttl;
        request.disable_follow_cname = config.disable_follow_cname;
        request.replacement = replacement;

        ctx.logger.info_with(
            "Applying for certificate",
            json!({
                "domains": domains,
                "provider": config.provider,
                "keyAlgorithm": key_algorithm.as_str(),
            }),
        );
        let result = ctx.services.issuer.apply(request, ctx.cancel).await?;
        if let Some(replaced) = &result.replaced_cert_id {
            ctx.logger
                .info(format!("Certificate issued as replacement of {replaced}"));
        }

        let info = parse_certificate_pem(&result.certificate_full_chain)
            .map_err(|e| NodeError::from(ApplyError::Certificate(e.to_string())))?;
        let subject_alt_names = if info.subject_alt_names.is_empty() {
            join_domains(&domains)
        } else {
            join_domains(&info.subject_alt_names)
        };

        let certificate = ctx
            .services
            .certificates
            .save(Certificate {
                source: CertificateSource::Request,
                subject_alt_names,
                serial_number: info.serial_number,
                certificate: result.certificate_full_chain,
                private_key: result.private_key,
                issuer_org: info.issuer_org,
                issuer_certificate: result.issuer_certificate,
                key_algorithm: key_algorithm.as_str().to_string(),
                validity_not_before: Some(info.not_before),
                validity_not_after: Some(info.not_after),
                acme_account_url: result.acme_account_url,
                acme_cert_url: result.acme_cert_url,
                acme_cert_stable_url: result.acme_cert_stable_url,
                csr: result.csr,
                workflow_id: ctx.workflow_id.to_string(),
                workflow_run_id: ctx.run_id.to_string(),
                workflow_node_id: node.id.clone(),
                ..Default::default()
            })
            .await?;

        ctx.logger.info_with(
            "Certificate issued",
            json!({
                "certificateId": certificate.id,
                "serialNumber": certificate.serial_number,
                "notAfter": info.not_after.to_rfc3339(),
            }),
        );
        Ok(NodeOutcome::done().with_outputs(certificate_outputs(&certificate, Utc::now())))
    }
}

/// Why the last certificate can be kept, if it can
fn skip_reason(
    config: &ApplyNodeConfig,
    domains: &[String],
    key_algorithm: KeyAlgorithm,
    last_certificate: &Certificate,
    last_output: Option<&WorkflowOutput>,
) -> Option<String> {
    if config.skip_before_expiry_days == 0 {
        return None;
    }
    if !last_output.is_some_and(|o| o.succeeded) {
        return None;
    }

    let mut wanted = domains.to_vec();
    let mut held = last_certificate.domains();
    wanted.sort();
    held.sort();
    if wanted != held || last_certificate.key_algorithm != key_algorithm.as_str() {
        return None;
    }

    let not_after = last_certificate.validity_not_after?;
    let threshold = Utc::now() + chrono::Duration::days(i64::from(config.skip_before_expiry_days));
    if not_after <= threshold {
        return None;
    }
    Some(format!(
        "certificate {} is valid until {}, more than {} days away",
        last_certificate.id,
        not_after.to_rfc3339(),
        config.skip_before_expiry_days
    ))
}
