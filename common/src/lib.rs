//! SILTA Common Types
//!
//! Upstream service model shared by the control plane and anything that
//! consumes the routing DAG, plus the naming scheme used for every generated
//! proxy-side resource (see [`naming`]).

use std::fmt;

pub mod naming;

pub use naming::{
    bounded_name, cluster_identity_key, cluster_name, format_duration_secs, CLUSTER_NAME_MAX_LEN,
    SHORT_HASH_LEN,
};

/// Kubernetes namespace used when an object carries none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace-qualified object name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    #[inline]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a `namespace/name` reference, falling back to `default_namespace`
    /// when the reference is a bare name.
    ///
    /// ```
    /// use common::NamespacedName;
    ///
    /// let n = NamespacedName::parse("tls-cert", "web");
    /// assert_eq!(n, NamespacedName::new("web", "tls-cert"));
    ///
    /// let n = NamespacedName::parse("certs/tls-cert", "web");
    /// assert_eq!(n, NamespacedName::new("certs", "tls-cert"));
    /// ```
    pub fn parse(reference: &str, default_namespace: &str) -> Self {
        match reference.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() => Self::new(namespace, name),
            Some((_, name)) => Self::new(default_namespace, name),
            None => Self::new(default_namespace, reference),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Transport protocol spoken to an upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Protocol {
    /// Plain HTTP/1.1
    #[default]
    Http,
    /// HTTP/2 over TLS
    H2,
    /// HTTP/2 cleartext
    H2c,
    /// HTTP/1.1 over TLS
    Tls,
}

impl Protocol {
    /// Annotation suffix naming this protocol (`upstream-protocol.<suffix>`)
    pub const fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "",
            Protocol::H2 => "h2",
            Protocol::H2c => "h2c",
            Protocol::Tls => "tls",
        }
    }
}

/// Active health check configuration for an upstream
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthCheckPolicy {
    /// HTTP path probed on the upstream
    pub path: String,
    /// Probe timeout (0 = proxy default)
    pub timeout_seconds: u64,
    /// Probe interval (0 = proxy default)
    pub interval_seconds: u64,
    /// Consecutive failures before the endpoint is ejected (0 = proxy default)
    pub unhealthy_threshold_count: u32,
    /// Consecutive successes before the endpoint is restored (0 = proxy default)
    pub healthy_threshold_count: u32,
}

/// One port of a Kubernetes Service, resolved as an upstream target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Service {
    /// Namespace and name of the Kubernetes Service
    pub name: NamespacedName,

    /// Service port number
    pub port: u16,

    /// Service port name (may be empty)
    pub port_name: String,

    /// Protocol used to reach this port
    pub protocol: Protocol,

    /// Load balancer strategy name (empty = proxy default)
    pub load_balancer_strategy: String,

    /// Optional active health check
    pub health_check: Option<HealthCheckPolicy>,
}

impl Service {
    /// Plain HTTP service with no load balancer or health check overrides
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, port: u16) -> Self {
        Self {
            name: NamespacedName::new(namespace, name),
            port,
            port_name: String::new(),
            protocol: Protocol::Http,
            load_balancer_strategy: String::new(),
            health_check: None,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.name.namespace
    }

    pub fn service_name(&self) -> &str {
        &self.name.name
    }
}
