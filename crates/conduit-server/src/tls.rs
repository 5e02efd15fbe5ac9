//! TLS termination for the HTTP listener.
//!
//! When [`ServerConfig::tls`](crate::ServerConfig::tls) is set, every
//! accepted connection completes a rustls handshake before it is handed to
//! Hyper. Certificates and keys are read from PEM files once, when the
//! server starts serving.

use rustls::crypto::CryptoProvider;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// Certificate chain and private key for serving HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM file holding the certificate chain, leaf first.
    pub cert_path: PathBuf,
    /// PEM file holding the private key.
    pub key_path: PathBuf,
}

impl TlsConfig {
    /// Creates a configuration from the certificate and key paths.
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

/// Errors raised while loading TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The certificate file could not be read or parsed.
    #[error("failed to load certificates from {}: {source}", path.display())]
    Certificates {
        /// The certificate file.
        path: PathBuf,
        /// The PEM failure.
        #[source]
        source: rustls_pki_types::pem::Error,
    },

    /// The certificate file holds no certificate.
    #[error("no certificate found in {}", path.display())]
    NoCertificates {
        /// The certificate file.
        path: PathBuf,
    },

    /// The key file could not be read or parsed.
    #[error("failed to load private key from {}: {source}", path.display())]
    PrivateKey {
        /// The key file.
        path: PathBuf,
        /// The PEM failure.
        #[source]
        source: rustls_pki_types::pem::Error,
    },

    /// rustls refused the certificate and key.
    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Returns the process-wide crypto provider, or aws-lc-rs when none is
/// installed.
fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|source| TlsError::Certificates {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    PrivateKeyDer::from_pem_file(path).map_err(|source| TlsError::PrivateKey {
        path: path.to_path_buf(),
        source,
    })
}

/// Builds the acceptor serving `config`'s certificate over HTTP/1.1.
///
/// # Errors
///
/// Returns [`TlsError`] if the files cannot be read or rustls rejects
/// their contents.
pub fn acceptor(config: &TlsConfig) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(&config.cert_path)?;
    let key = load_key(&config.key_path)?;

    let mut server_config = rustls::ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    tracing::debug!(cert = %config.cert_path.display(), "loaded TLS certificate");
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
