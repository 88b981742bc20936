use common::NamespacedName;
use thiserror::Error;

/// SILTA Control Plane Errors
#[derive(Error, Debug)]
pub enum SiltaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to resolve a reference against the resource snapshot
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("secret {0} not found")]
    SecretNotFound(NamespacedName),

    #[error("secret {name} is invalid: {source}")]
    InvalidSecret {
        name: NamespacedName,
        #[source]
        source: SecretError,
    },

    #[error("service {0} not found")]
    ServiceNotFound(NamespacedName),

    #[error("service {name} has no port {port}")]
    PortNotFound { name: NamespacedName, port: String },
}

/// TLS Secret validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SecretError {
    #[error("secret type is {0:?}, not kubernetes.io/tls")]
    NotTls(Option<String>),

    #[error("secret is missing {0}")]
    MissingKey(&'static str),

    #[error("invalid PEM in {key}: {reason}")]
    InvalidPem { key: &'static str, reason: String },
}
