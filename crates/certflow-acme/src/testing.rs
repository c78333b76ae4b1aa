//! Test certificate authority backed by rcgen

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, SerialNumber,
};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Issued {
    pub leaf: String,
    pub chain: String,
    pub key_pem: String,
}

pub(crate) struct TestCa {
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
        params
            .distinguished_name
            .push(DnType::CommonName, "Certflow Test Root");
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn issue(&self, domains: &[&str]) -> Issued {
        let key = KeyPair::generate().unwrap();
        let mut params =
            CertificateParams::new(domains.iter().map(|d| d.to_string()).collect::<Vec<_>>())
                .unwrap();
        params.use_authority_key_identifier_extension = true;
        let mut serial = vec![0x1a];
        serial.extend_from_slice(&NEXT_SERIAL.fetch_add(1, Ordering::SeqCst).to_be_bytes());
        params.serial_number = Some(SerialNumber::from(serial));
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();

        let leaf = cert.pem();
        Issued {
            chain: format!("{}{}", leaf, self.pem()),
            leaf,
            key_pem: key.serialize_pem(),
        }
    }
}
