//! Validation gates for provisioning artifacts.
//!
//! The gate turns raw artifact state into a pass/fail verdict with a reason.
//! Certificate checks are the fully realized specialization: content
//! correctness ([`ValidationGate::validate`]) and chain correctness
//! ([`ValidationGate::verify_chain`]) compose into the readiness decision a
//! step makes before skipping or keeping freshly produced output. Mere file
//! presence is never treated as "done".
//!
//! All checks are deterministic functions of the artifact bytes plus the
//! constraints; no network calls.

use chrono::{DateTime, TimeZone, Utc};
use ring::signature::KeyPair as _;
use std::path::Path;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::pem::Pem;

/// Verdict of a validation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Whether the artifact passed.
    pub valid: bool,
    /// First failing check, human-readable.
    pub reason: Option<String>,
    /// Certificate expiry when it could be determined.
    pub expiry: Option<DateTime<Utc>>,
}

impl ValidationResult {
    /// A passing verdict.
    pub fn ok(expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            valid: true,
            reason: None,
            expiry,
        }
    }

    /// A failing verdict with a reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            expiry: None,
        }
    }

    fn invalid_at(reason: impl Into<String>, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            expiry,
        }
    }
}

/// Constraints for certificate content validation.
#[derive(Debug, Clone)]
pub struct CertificateConstraints {
    /// At least one of these must appear in the subject alternative names.
    pub domains: Vec<String>,
    /// Minimum remaining lifetime, in days.
    pub min_days_valid: i64,
}

/// Pure predicate checks over certificate artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationGate;

impl ValidationGate {
    pub fn new() -> Self {
        Self
    }

    /// Validate certificate content against `constraints`.
    ///
    /// Checks run in order and short-circuit on the first failure:
    /// parseability, expiry margin, domain match, and pairing with the
    /// adjacent `privkey.pem`.
    pub fn validate(&self, cert_path: &Path, constraints: &CertificateConstraints) -> ValidationResult {
        let bytes = match std::fs::read(cert_path) {
            Ok(bytes) => bytes,
            Err(e) => return ValidationResult::invalid(format!("Certificate validation failed: {e}")),
        };

        let pems = match certificate_pems(&bytes) {
            Ok(pems) => pems,
            Err(reason) => return ValidationResult::invalid(reason),
        };
        let Some(leaf_pem) = pems.first() else {
            return ValidationResult::invalid("No certificates found in artifact");
        };
        let leaf = match leaf_pem.parse_x509() {
            Ok(cert) => cert,
            Err(e) => return ValidationResult::invalid(format!("Certificate validation failed: {e}")),
        };

        let expiry_ts = leaf.validity().not_after.timestamp();
        let expiry = Utc.timestamp_opt(expiry_ts, 0).single();
        let days_left = (expiry_ts - Utc::now().timestamp()) / 86_400;
        if days_left <= constraints.min_days_valid {
            return ValidationResult::invalid_at(
                format!(
                    "Certificate expires in less than {} days",
                    constraints.min_days_valid
                ),
                expiry,
            );
        }

        let cert_domains = subject_alt_names(&leaf);
        if !constraints
            .domains
            .iter()
            .any(|d| cert_domains.iter().any(|c| c == d))
        {
            return ValidationResult::invalid_at("Certificate domains don't match configuration", expiry);
        }

        let key_path = cert_path.with_file_name("privkey.pem");
        let spki_bits = leaf.public_key().subject_public_key.data.as_ref().to_vec();
        match private_key_matches(&key_path, &spki_bits) {
            Ok(true) => ValidationResult::ok(expiry),
            Ok(false) => ValidationResult::invalid_at(
                "Private key validation failed: key does not match certificate",
                expiry,
            ),
            Err(reason) => {
                ValidationResult::invalid_at(format!("Private key validation failed: {reason}"), expiry)
            }
        }
    }

    /// Verify the certificate chain in a bundle file.
    ///
    /// The first certificate is the leaf; every other certificate forms the
    /// trust store. The leaf must be signed by some certificate in the store.
    pub fn verify_chain(&self, cert_path: &Path) -> ValidationResult {
        let bytes = match std::fs::read(cert_path) {
            Ok(bytes) => bytes,
            Err(e) => return ValidationResult::invalid(format!("Chain verification failed: {e}")),
        };

        let pems = match certificate_pems(&bytes) {
            Ok(pems) => pems,
            Err(reason) => return ValidationResult::invalid(reason),
        };
        if pems.is_empty() {
            return ValidationResult::invalid("No certificates found in chain");
        }

        let certs: Vec<X509Certificate> = match pems.iter().map(|p| p.parse_x509()).collect() {
            Ok(certs) => certs,
            Err(e) => return ValidationResult::invalid(format!("Chain verification failed: {e}")),
        };

        let leaf = &certs[0];
        let issuer_raw = leaf.issuer().as_raw();
        let Some(issuer) = certs[1..]
            .iter()
            .find(|candidate| candidate.subject().as_raw() == issuer_raw)
        else {
            return ValidationResult::invalid(
                "Certificate chain verification failed: no issuer certificate found in chain",
            );
        };

        match leaf.verify_signature(Some(issuer.public_key())) {
            Ok(()) => ValidationResult::ok(None),
            Err(e) => {
                ValidationResult::invalid(format!("Certificate chain verification failed: {e}"))
            }
        }
    }
}

fn certificate_pems(bytes: &[u8]) -> Result<Vec<Pem>, String> {
    let mut pems = Vec::new();
    for pem in Pem::iter_from_buffer(bytes) {
        let pem = pem.map_err(|e| format!("Certificate validation failed: {e}"))?;
        if pem.label == "CERTIFICATE" {
            pems.push(pem);
        }
    }
    Ok(pems)
}

fn subject_alt_names(cert: &X509Certificate) -> Vec<String> {
    let Ok(Some(san)) = cert.subject_alternative_name() else {
        return Vec::new();
    };
    san.value
        .general_names
        .iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            _ => None,
        })
        .collect()
}

/// Check whether the private key at `key_path` pairs with the given
/// certificate public key (the raw SPKI bit string contents).
///
/// The comparison derives the public key from the private key and compares
/// bytes, which covers RSA, ECDSA P-256/P-384, and Ed25519 keys.
fn private_key_matches(key_path: &Path, cert_public_key: &[u8]) -> Result<bool, String> {
    let bytes = std::fs::read(key_path).map_err(|e| e.to_string())?;

    let mut key_der: Option<(String, Vec<u8>)> = None;
    for pem in Pem::iter_from_buffer(&bytes) {
        let pem = pem.map_err(|e| e.to_string())?;
        if pem.label.ends_with("PRIVATE KEY") {
            key_der = Some((pem.label.clone(), pem.contents.clone()));
            break;
        }
    }
    let Some((label, der)) = key_der else {
        return Err("no private key found".to_string());
    };

    let public = derive_public_key(&label, &der).ok_or_else(|| {
        "unsupported or unparseable private key".to_string()
    })?;

    Ok(public == cert_public_key)
}

fn derive_public_key(label: &str, der: &[u8]) -> Option<Vec<u8>> {
    use ring::signature;

    if label == "RSA PRIVATE KEY" {
        return signature::RsaKeyPair::from_der(der)
            .ok()
            .map(|kp| kp.public_key().as_ref().to_vec());
    }

    let rng = ring::rand::SystemRandom::new();
    if let Ok(kp) = signature::RsaKeyPair::from_pkcs8(der) {
        return Some(kp.public_key().as_ref().to_vec());
    }
    if let Ok(kp) =
        signature::EcdsaKeyPair::from_pkcs8(&signature::ECDSA_P256_SHA256_ASN1_SIGNING, der, &rng)
    {
        return Some(kp.public_key().as_ref().to_vec());
    }
    if let Ok(kp) =
        signature::EcdsaKeyPair::from_pkcs8(&signature::ECDSA_P384_SHA384_ASN1_SIGNING, der, &rng)
    {
        return Some(kp.public_key().as_ref().to_vec());
    }
    if let Ok(kp) = signature::Ed25519KeyPair::from_pkcs8_maybe_unchecked(der) {
        return Some(kp.public_key().as_ref().to_vec());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn constraints(domains: &[&str]) -> CertificateConstraints {
        CertificateConstraints {
            domains: domains.iter().map(|d| d.to_string()).collect(),
            min_days_valid: 30,
        }
    }

    fn write_self_signed(dir: &Path, domain: &str) -> PathBuf {
        let issued = rcgen::generate_simple_self_signed(vec![domain.to_string()]).unwrap();
        let cert_path = dir.join("fullchain.pem");
        std::fs::write(&cert_path, issued.cert.pem()).unwrap();
        std::fs::write(dir.join("privkey.pem"), issued.key_pair.serialize_pem()).unwrap();
        cert_path
    }

    #[test]
    fn valid_certificate_passes() {
        let temp = TempDir::new().unwrap();
        let cert_path = write_self_signed(temp.path(), "id.example.com");

        let result = ValidationGate::new().validate(&cert_path, &constraints(&["id.example.com"]));
        assert!(result.valid, "reason: {:?}", result.reason);
        assert!(result.expiry.is_some());
    }

    #[test]
    fn validate_is_idempotent_on_unmodified_artifact() {
        let temp = TempDir::new().unwrap();
        let cert_path = write_self_signed(temp.path(), "id.example.com");
        let gate = ValidationGate::new();
        let constraints = constraints(&["id.example.com"]);

        let first = gate.validate(&cert_path, &constraints);
        let second = gate.validate(&cert_path, &constraints);
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_when_no_constraint_domain_in_san() {
        let temp = TempDir::new().unwrap();
        let cert_path = write_self_signed(temp.path(), "other.example.com");

        let result = ValidationGate::new().validate(&cert_path, &constraints(&["id.example.com"]));
        assert!(!result.valid);
        assert!(result.reason.as_deref().unwrap().contains("domains don't match"));
    }

    #[test]
    fn rejects_certificate_expiring_within_margin() {
        let temp = TempDir::new().unwrap();
        let mut params = CertificateParams::new(vec!["id.example.com".to_string()]).unwrap();
        params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(5);
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();

        let cert_path = temp.path().join("fullchain.pem");
        std::fs::write(&cert_path, cert.pem()).unwrap();
        std::fs::write(temp.path().join("privkey.pem"), key.serialize_pem()).unwrap();

        let result = ValidationGate::new().validate(&cert_path, &constraints(&["id.example.com"]));
        assert!(!result.valid);
        assert!(result.reason.as_deref().unwrap().contains("expires"));
        assert!(result.expiry.is_some());
    }

    #[test]
    fn rejects_mismatched_private_key() {
        let temp = TempDir::new().unwrap();
        let cert_path = write_self_signed(temp.path(), "id.example.com");

        // Overwrite the key with one from a different pair.
        let stranger = KeyPair::generate().unwrap();
        std::fs::write(temp.path().join("privkey.pem"), stranger.serialize_pem()).unwrap();

        let result = ValidationGate::new().validate(&cert_path, &constraints(&["id.example.com"]));
        assert!(!result.valid);
        assert!(result.reason.as_deref().unwrap().contains("Private key"));
    }

    #[test]
    fn rejects_unparseable_artifact() {
        let temp = TempDir::new().unwrap();
        let cert_path = temp.path().join("fullchain.pem");
        std::fs::write(&cert_path, "not a certificate").unwrap();

        let result = ValidationGate::new().validate(&cert_path, &constraints(&["id.example.com"]));
        assert!(!result.valid);
        assert!(result.reason.is_some());
    }

    #[test]
    fn chain_with_issuer_verifies() {
        let temp = TempDir::new().unwrap();

        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_key = KeyPair::generate().unwrap();
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let leaf_params = CertificateParams::new(vec!["id.example.com".to_string()]).unwrap();
        let leaf_key = KeyPair::generate().unwrap();
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

        let bundle = format!("{}{}", leaf_cert.pem(), ca_cert.pem());
        let cert_path = temp.path().join("fullchain.pem");
        std::fs::write(&cert_path, bundle).unwrap();

        let result = ValidationGate::new().verify_chain(&cert_path);
        assert!(result.valid, "reason: {:?}", result.reason);
    }

    #[test]
    fn chain_without_issuer_fails_with_reason() {
        let temp = TempDir::new().unwrap();
        let cert_path = write_self_signed(temp.path(), "id.example.com");

        let result = ValidationGate::new().verify_chain(&cert_path);
        assert!(!result.valid);
        assert!(result
            .reason
            .as_deref()
            .unwrap()
            .contains("chain verification failed"));
    }

    #[test]
    fn empty_bundle_fails_chain_verification() {
        let temp = TempDir::new().unwrap();
        let cert_path = temp.path().join("fullchain.pem");
        std::fs::write(&cert_path, "").unwrap();

        let result = ValidationGate::new().verify_chain(&cert_path);
        assert!(!result.valid);
        assert_eq!(
            result.reason.as_deref(),
            Some("No certificates found in chain")
        );
    }
}
