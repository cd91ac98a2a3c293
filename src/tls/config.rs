use crate::{FixtureError, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;

/// Configuration for the mutual-auth gate fixture server
///
/// Carries the server identity presented to clients and the set of
/// certificates a client chain must validate against to count as authorized.
/// Key material is supplied as DER; [`TlsConfig::from_pem_files`] loads the
/// usual PEM layout from disk.
#[derive(Debug)]
pub struct TlsConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Server certificate chain presented to clients
    pub cert_chain: Vec<CertificateDer<'static>>,
    /// Server private key
    pub key: PrivateKeyDer<'static>,
    /// Trusted issuers for client certificates
    pub trusted_roots: Vec<CertificateDer<'static>>,
}

impl TlsConfig {
    pub fn new(
        bind_addr: SocketAddr,
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        trusted_roots: Vec<CertificateDer<'static>>,
    ) -> Self {
        Self {
            bind_addr,
            max_connections: 100,
            cert_chain,
            key,
            trusted_roots,
        }
    }

    /// Loads the server identity and trusted client issuers from PEM files
    pub fn from_pem_files(
        bind_addr: SocketAddr,
        cert_path: &Path,
        key_path: &Path,
        ca_path: &Path,
    ) -> Result<Self> {
        let cert_chain = load_certs(cert_path)?;
        let key = load_key(key_path)?;
        let trusted_roots = load_certs(ca_path)?;
        Ok(Self::new(bind_addr, cert_chain, key, trusted_roots))
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path)
        .map_err(|e| FixtureError::Config(format!("Failed to open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| FixtureError::Config(format!("Failed to read certificates from {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(FixtureError::Config(format!("No certificates found in {}", path.display())));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)
        .map_err(|e| FixtureError::Config(format!("Failed to open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| FixtureError::Config(format!("Failed to read private key from {}: {e}", path.display())))?
        .ok_or_else(|| FixtureError::Config(format!("No private key found in {}", path.display())))
}
