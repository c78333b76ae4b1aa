//! Shared fixtures: an rcgen-backed CA behind a fake ACME protocol, plus
//! recording DNS and notify providers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use certflow_acme::dns::{ChallengeProvider, Dns01Challenge, DnsResult};
use certflow_acme::{
    AcmeError, AcmeProtocol, AcmeUser, Applicant, IssuedOrder, OrderRequest, Registration,
};
use certflow_domain::{MemoryStore, Workflow, WorkflowNode, WorkflowNodeType, WorkflowTrigger};
use certflow_workflow::providers::ProviderOutput;
use certflow_workflow::{Notifier, ProviderError, ProviderRegistry, Services, WorkflowEngine};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, SerialNumber,
};
use serde_json::json;

pub const ACCOUNT_URL: &str = "https://ca.test/acct/1";

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

pub struct TestCa {
    cert: Certificate,
    key: KeyPair,
}

impl TestCa {
    pub fn new() -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::OrganizationName, "Certflow Test CA");
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    /// Leaf followed by the CA certificate
    pub fn issue_chain(&self, domains: &[String]) -> String {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(domains.to_vec()).unwrap();
        params.use_authority_key_identifier_extension = true;
        let mut serial = vec![0x2b];
        serial.extend_from_slice(&NEXT_SERIAL.fetch_add(1, Ordering::SeqCst).to_be_bytes());
        params.serial_number = Some(SerialNumber::from(serial));
        let leaf = params.signed_by(&key, &self.cert, &self.key).unwrap();
        format!("{}{}", leaf.pem(), self.cert.pem())
    }
}

/// ACME protocol stand-in that presents challenges and signs with [`TestCa`]
pub struct FakeProtocol {
    ca: TestCa,
    pub fail_obtain: bool,
    pub replaces: Mutex<Vec<Option<String>>>,
}

impl FakeProtocol {
    pub fn new() -> Self {
        Self {
            ca: TestCa::new(),
            fail_obtain: false,
            replaces: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_obtain: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl AcmeProtocol for FakeProtocol {
    async fn register(&self, _user: &AcmeUser) -> Result<Registration, AcmeError> {
        Ok(Registration {
            account_url: ACCOUNT_URL.into(),
            credentials: "{}".into(),
        })
    }

    async fn obtain(
        &self,
        _user: &AcmeUser,
        request: OrderRequest<'_>,
    ) -> Result<IssuedOrder, AcmeError> {
        let challenges: Vec<_> = request
            .domains
            .iter()
            .map(|d| Dns01Challenge::new(d, "token", "token.thumbprint"))
            .collect();
        for challenge in &challenges {
            request.challenge_provider.present(challenge).await?;
        }
        for challenge in &challenges {
            request.challenge_provider.cleanup(challenge).await?;
        }

        self.replaces
            .lock()
            .unwrap()
            .push(request.replaces.map(str::to_string));
        if self.fail_obtain {
            return Err(AcmeError::ChallengeValidation {
                domain: request.domains[0].clone(),
                message: "incorrect TXT record".into(),
            });
        }
        Ok(IssuedOrder {
            certificate_chain: self.ca.issue_chain(request.domains),
            cert_url: "https://ca.test/cert/1".into(),
            cert_stable_url: "https://ca.test/cert/1".into(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MockDnsProvider {
    pub presented: Mutex<Vec<String>>,
}

#[async_trait]
impl ChallengeProvider for MockDnsProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn present(&self, challenge: &Dns01Challenge) -> DnsResult<()> {
        self.presented.lock().unwrap().push(challenge.fqdn.clone());
        Ok(())
    }

    async fn cleanup(&self, _challenge: &Dns01Challenge) -> DnsResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, subject: &str, _message: &str) -> Result<ProviderOutput, ProviderError> {
        self.sent.lock().unwrap().push(subject.to_string());
        Ok(ProviderOutput::new())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub protocol: Arc<FakeProtocol>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: WorkflowEngine,
}

impl Harness {
    pub fn new(protocol: FakeProtocol) -> Self {
        let store = Arc::new(MemoryStore::new());
        let protocol = Arc::new(protocol);
        let notifier = Arc::new(RecordingNotifier::default());

        let mut registry = ProviderRegistry::with_builtins();
        registry.register_dns("mock", |_| {
            let provider: Arc<dyn ChallengeProvider> = Arc::new(MockDnsProvider::default());
            Ok(provider)
        });
        let recorder = notifier.clone();
        registry.register_notifier("recorder", move |_| {
            let notifier: Arc<dyn Notifier> = recorder.clone();
            Ok(notifier)
        });

        let applicant =
            Applicant::new(store.clone(), protocol.clone()).with_account_store(store.clone());
        let services = Services::with_store(store.clone(), Arc::new(applicant), registry);
        Self {
            store,
            protocol,
            notifier,
            engine: WorkflowEngine::new(services),
        }
    }
}

pub fn apply_node(id: &str, domains: &str, skip_before_expiry_days: u32) -> WorkflowNode {
    WorkflowNode::new(id, WorkflowNodeType::Apply).with_config(json!({
        "domains": domains,
        "contactEmail": "ops@example.com",
        "provider": "mock",
        "keyAlgorithm": "EC256",
        "skipBeforeExpiryDays": skip_before_expiry_days,
    }))
}

pub fn notify_node(id: &str) -> WorkflowNode {
    WorkflowNode::new(id, WorkflowNodeType::Notify).with_config(json!({
        "provider": "recorder",
        "subject": "Certificates updated",
        "skipOnAllPrevSkipped": true,
    }))
}

/// `start -> nodes... -> end`
pub fn workflow(nodes: Vec<WorkflowNode>) -> Workflow {
    let mut chain = WorkflowNode::new("end", WorkflowNodeType::End);
    for node in nodes.into_iter().rev() {
        chain = node.with_next(chain);
    }
    Workflow {
        id: "wf-1".into(),
        name: "renew".into(),
        description: String::new(),
        trigger: WorkflowTrigger::Manual,
        interval_hours: None,
        enabled: true,
        content: WorkflowNode::new("start", WorkflowNodeType::Start).with_next(chain),
    }
}
