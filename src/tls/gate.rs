use super::verifier::LenientClientVerifier;
use crate::{FixtureError, Result};
use http::StatusCode;
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::ClientCertVerifier;
use std::sync::Arc;
use tracing::debug;

// Rendered in place of a common name the certificate does not carry or that
// does not parse.
const UNKNOWN_CN: &str = "unknown";

/// Outcome of evaluating one request's client certificate
///
/// Presence and validity are independent axes, so this is an explicit
/// three-way branch rather than a boolean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertDecision {
    /// The presented chain validates against the trusted set
    Allowed { subject_cn: String },
    /// A certificate was presented but did not validate
    DeniedUntrusted { subject_cn: String, issuer_cn: String },
    /// No certificate was presented
    DeniedMissing,
}

/// Request-layer certificate gate
///
/// Holds the strict verifier for the trusted issuer set and produces a fresh
/// [`CertDecision`] per request; decisions are never cached.
pub struct CertGate {
    strict: Arc<dyn ClientCertVerifier>,
}

impl CertGate {
    /// Builds a gate trusting client chains issued by the given roots
    pub fn new(trusted_roots: &[CertificateDer<'static>]) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        for root in trusted_roots {
            roots
                .add(root.clone())
                .map_err(|e| FixtureError::Config(format!("Invalid trusted root certificate: {e}")))?;
        }
        let strict = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| FixtureError::Config(format!("Failed to build client verifier: {e}")))?;
        Ok(Self { strict })
    }

    /// Handshake verifier that requests certificates without rejecting any
    pub fn handshake_verifier(&self) -> Arc<dyn ClientCertVerifier> {
        Arc::new(LenientClientVerifier::new(self.strict.clone()))
    }

    /// Evaluates the peer's presented chain
    pub fn evaluate(&self, peer_certs: Option<&[CertificateDer<'static>]>) -> CertDecision {
        let Some((end_entity, intermediates)) = peer_certs.and_then(|certs| certs.split_first())
        else {
            return CertDecision::DeniedMissing;
        };

        match self.strict.verify_client_cert(end_entity, intermediates, UnixTime::now()) {
            Ok(_) => {
                let (subject_cn, _) = common_names(end_entity);
                CertDecision::Allowed { subject_cn }
            }
            Err(e) => {
                debug!(error = %e, "Client certificate rejected");
                let (subject_cn, issuer_cn) = common_names(end_entity);
                CertDecision::DeniedUntrusted { subject_cn, issuer_cn }
            }
        }
    }
}

/// Renders a decision to its response status and body
pub fn render_response(decision: &CertDecision) -> (StatusCode, String) {
    match decision {
        CertDecision::Allowed { subject_cn } => (StatusCode::OK, format!("Olá {subject_cn}!")),
        CertDecision::DeniedUntrusted { subject_cn, issuer_cn } => (
            StatusCode::FORBIDDEN,
            format!("Sorry {subject_cn}, certificates from {issuer_cn} are not welcome here."),
        ),
        CertDecision::DeniedMissing => (
            StatusCode::UNAUTHORIZED,
            "Sorry, but you need to provide a client certificate to continue.".to_string(),
        ),
    }
}

/// Extracts `(subject CN, issuer CN)` from a certificate, tolerating junk
fn common_names(cert: &CertificateDer<'_>) -> (String, String) {
    match x509_parser::parse_x509_certificate(cert.as_ref()) {
        Ok((_, parsed)) => {
            let subject = parsed
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .unwrap_or(UNKNOWN_CN)
                .to_string();
            let issuer = parsed
                .issuer()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .unwrap_or(UNKNOWN_CN)
                .to_string();
            (subject, issuer)
        }
        Err(_) => (UNKNOWN_CN.to_string(), UNKNOWN_CN.to_string()),
    }
}
