//! TLS Secret validation
//!
//! A Secret may back a secure virtual host only when it is a
//! `kubernetes.io/tls` Secret whose `tls.crt` holds at least one PEM
//! certificate and whose `tls.key` holds a PEM private key.

use crate::error::SecretError;
use k8s_openapi::api::core::v1::Secret;
use rustls_pemfile::{certs, private_key};
use std::io::BufReader;

/// Secret type required for TLS material
pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";

/// Secret data key holding the certificate chain
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret data key holding the private key
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

/// Validates a Secret and extracts its TLS material
pub type SecretValidator = fn(&Secret) -> Result<TlsCertificate, SecretError>;

/// TLS certificate loaded from a Kubernetes Secret
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsCertificate {
    /// Certificate chain (PEM format)
    pub cert_chain: Vec<u8>,
    /// Private key (PEM format)
    pub private_key: Vec<u8>,
}

impl TlsCertificate {
    /// Load certificate and private key from PEM bytes
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, SecretError> {
        let mut cert_reader = BufReader::new(cert_pem);
        let chain = certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SecretError::InvalidPem {
                key: TLS_CERT_KEY,
                reason: e.to_string(),
            })?;
        if chain.is_empty() {
            return Err(SecretError::InvalidPem {
                key: TLS_CERT_KEY,
                reason: "no certificate found".to_string(),
            });
        }

        let mut key_reader = BufReader::new(key_pem);
        private_key(&mut key_reader)
            .map_err(|e| SecretError::InvalidPem {
                key: TLS_PRIVATE_KEY_KEY,
                reason: e.to_string(),
            })?
            .ok_or_else(|| SecretError::InvalidPem {
                key: TLS_PRIVATE_KEY_KEY,
                reason: "no private key found".to_string(),
            })?;

        Ok(Self {
            cert_chain: cert_pem.to_vec(),
            private_key: key_pem.to_vec(),
        })
    }
}

/// Validator used for Ingress TLS blocks
pub fn validate_tls_secret(secret: &Secret) -> Result<TlsCertificate, SecretError> {
    if secret.type_.as_deref() != Some(SECRET_TYPE_TLS) {
        return Err(SecretError::NotTls(secret.type_.clone()));
    }

    let data = secret.data.as_ref();
    let cert = data
        .and_then(|d| d.get(TLS_CERT_KEY))
        .filter(|v| !v.0.is_empty())
        .ok_or(SecretError::MissingKey(TLS_CERT_KEY))?;
    let key = data
        .and_then(|d| d.get(TLS_PRIVATE_KEY_KEY))
        .filter(|v| !v.0.is_empty())
        .ok_or(SecretError::MissingKey(TLS_PRIVATE_KEY_KEY))?;

    TlsCertificate::from_pem(&cert.0, &key.0)
}
