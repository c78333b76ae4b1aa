//! DNS propagation checking for DNS-01 challenges
//!
//! Queries recursive resolvers until the challenge TXT record shows the
//! expected value. Custom nameservers replace the public defaults; the
//! authoritative servers of the zone are never consulted directly.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::provider::{DnsProviderError, DnsResult};

const MAX_CNAME_HOPS: usize = 50;

/// Per-apply DNS-01 options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsChallengeOptions {
    /// Recursive nameservers, `ip` or `ip:port`
    pub nameservers: Vec<String>,
    pub propagation_timeout: Option<Duration>,
    pub ttl: Option<u32>,
    /// Write the record where `_acme-challenge.<domain>` CNAMEs point
    pub follow_cname: bool,
}

impl Default for DnsChallengeOptions {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            propagation_timeout: None,
            ttl: None,
            follow_cname: true,
        }
    }
}

impl DnsChallengeOptions {
    /// Checker settings, failing on nameservers that are not valid addresses
    pub fn propagation_config(&self) -> DnsResult<PropagationConfig> {
        let mut config = PropagationConfig::default();
        if let Some(timeout) = self.propagation_timeout {
            config.timeout = timeout;
        }
        if !self.nameservers.is_empty() {
            config.nameservers = self
                .nameservers
                .iter()
                .map(|ns| parse_nameserver(ns))
                .collect::<DnsResult<_>>()?;
        }
        Ok(config)
    }
}

fn parse_nameserver(raw: &str) -> DnsResult<SocketAddr> {
    let raw = raw.trim();
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    raw.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| DnsProviderError::Configuration(format!("invalid nameserver '{raw}'")))
}

#[derive(Debug, Clone)]
pub struct PropagationConfig {
    /// Delay before the first check
    pub initial_delay: Duration,
    pub check_interval: Duration,
    pub timeout: Duration,
    pub nameservers: Vec<SocketAddr>,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            check_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
            nameservers: vec![
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 53),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)), 53),
            ],
        }
    }
}

#[derive(Debug)]
pub struct PropagationChecker {
    config: PropagationConfig,
    resolver: TokioResolver,
}

impl PropagationChecker {
    /// Create a checker
    pub fn with_config(config: PropagationConfig) -> Self {
        let mut resolver_config = ResolverConfig::new();
        for addr in &config.nameservers {
            resolver_config.add_name_server(NameServerConfig::new(*addr, Protocol::Udp));
        }

        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(5);
        opts.attempts = 3;
        // every check must see fresh data
        opts.cache_size = 0;

        let resolver =
            Resolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();
        Self { config, resolver }
    }

    /// Follow the CNAME chain starting at `fqdn` to the name that holds records
    pub async fn resolve_cname(&self, fqdn: &str) -> String {
        let mut current = fqdn.trim_end_matches('.').to_string();
        for _ in 0..MAX_CNAME_HOPS {
            let target = match self.resolver.lookup(current.as_str(), RecordType::CNAME).await {
                Ok(lookup) => lookup.iter().find_map(|rdata| match rdata {
                    RData::CNAME(cname) => Some(cname.0.to_utf8()),
                    _ => None,
                }),
                Err(_) => None,
            };
            match target {
                Some(next) => {
                    let next = next.trim_end_matches('.').to_string();
                    debug!(from = %current, to = %next, "Following challenge CNAME");
                    current = next;
                }
                None => break,
            }
        }
        current
    }

    /// Wait until `record_name` serves `expected_value`
    pub async fn wait_for_propagation(
        &self,
        record_name: &str,
        expected_value: &str,
        cancel: &CancellationToken,
    ) -> DnsResult<()> {
        let start = Instant::now();
        let deadline = start + self.config.timeout;

        debug!(
            record = %record_name,
            timeout_secs = self.config.timeout.as_secs(),
            "Waiting for DNS propagation"
        );
        self.pause(self.config.initial_delay, cancel).await?;

        loop {
            match self.check_record(record_name, expected_value).await {
                Ok(true) => {
                    debug!(
                        record = %record_name,
                        elapsed_secs = start.elapsed().as_secs(),
                        "DNS propagation confirmed"
                    );
                    return Ok(());
                }
                Ok(false) => trace!(record = %record_name, "Record not yet propagated"),
                Err(e) => warn!(record = %record_name, error = %e, "DNS lookup error"),
            }

            if Instant::now() > deadline {
                return Err(DnsProviderError::Timeout {
                    record_name: record_name.to_string(),
                    elapsed_secs: self.config.timeout.as_secs(),
                });
            }
            self.pause(self.config.check_interval, cancel).await?;
        }
    }

    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> DnsResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(DnsProviderError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn check_record(&self, record_name: &str, expected_value: &str) -> DnsResult<bool> {
        match self.resolver.txt_lookup(record_name).await {
            Ok(records) => Ok(records.iter().any(|record| {
                let value: String = record
                    .txt_data()
                    .iter()
                    .map(|data| String::from_utf8_lossy(data))
                    .collect();
                value == expected_value
            })),
            Err(e) => {
                // missing records and SERVFAIL are normal while a record propagates
                let message = e.to_string().to_lowercase();
                if message.contains("no records found")
                    || message.contains("nxdomain")
                    || message.contains("record not found")
                {
                    Ok(false)
                } else {
                    Err(DnsProviderError::ApiRequest(format!(
                        "DNS lookup failed for '{record_name}': {e}"
                    )))
                }
            }
        }
    }
}
