//! Routing DAG
//!
//! The graph of virtual hosts → routes → clusters built from one resource
//! snapshot. A new `Dag` is produced by every [`Builder`] run and is never
//! mutated after the run returns.
//!
//! ```text
//! Dag
//!  ├── virtual_hosts        "*", "example.com", ...    (port 80)
//!  │     └── routes         "prefix: /api" → Route
//!  └── secure_virtual_hosts "example.com", ...         (port 443, TLS)
//!        └── routes         same Arc<Route> values
//!
//! Route ── clusters ── Service (namespace/name:port)
//! ```

pub mod builder;
pub mod ingress_processor;

pub use builder::{BuildContext, BuildOutcome, Builder, Diagnostic, DiagnosticKind, Processor};
pub use ingress_processor::IngressProcessor;

use crate::tls::TlsCertificate;
use common::{bounded_name, cluster_name, NamespacedName, Protocol, Service, CLUSTER_NAME_MAX_LEN};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Reserved name of the default (catch-all) virtual host
pub const DEFAULT_HOST: &str = "*";

/// Characters that mark a path as a regular expression
const REGEX_METACHARACTERS: &[char] = &['^', '+', '*', '[', ']', '%'];

/// Complete routing graph for one build
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dag {
    /// Plaintext virtual hosts keyed by hostname
    pub virtual_hosts: BTreeMap<String, VirtualHost>,
    /// TLS virtual hosts keyed by hostname
    pub secure_virtual_hosts: BTreeMap<String, SecureVirtualHost>,
}

impl Dag {
    pub fn virtual_host(&self, host: &str) -> Option<&VirtualHost> {
        self.virtual_hosts.get(host)
    }

    pub fn secure_virtual_host(&self, host: &str) -> Option<&SecureVirtualHost> {
        self.secure_virtual_hosts.get(host)
    }

    /// Every distinct upstream cluster referenced by any route, keyed by its
    /// generated cluster name
    pub fn clusters(&self) -> BTreeMap<String, &Cluster> {
        let plain = self.virtual_hosts.values();
        let secure = self.secure_virtual_hosts.values().map(|s| &s.virtual_host);

        plain
            .chain(secure)
            .flat_map(|vh| vh.routes.values())
            .flat_map(|route| route.clusters.iter())
            .map(|cluster| (cluster.name(), cluster))
            .collect()
    }
}

/// Hostname-scoped routing table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualHost {
    pub name: String,
    routes: BTreeMap<String, Arc<Route>>,
}

impl VirtualHost {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: BTreeMap::new(),
        }
    }

    /// Add a route, replacing any route with the same match condition
    pub fn add_route(&mut self, route: Arc<Route>) {
        self.routes.insert(route.path_match.to_string(), route);
    }

    /// Route with exactly this match condition
    pub fn route(&self, condition: &PathMatchCondition) -> Option<&Arc<Route>> {
        self.routes.get(&condition.to_string())
    }

    /// Routes ordered by match condition
    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.values()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Virtual host served over TLS
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecureVirtualHost {
    pub virtual_host: VirtualHost,
    /// Certificate and key served for this host
    pub secret: Option<Secret>,
    pub min_tls_version: MinTlsVersion,
}

impl SecureVirtualHost {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            virtual_host: VirtualHost::new(name),
            secret: None,
            min_tls_version: MinTlsVersion::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.virtual_host.name
    }

    /// Name of the route configuration generated for this host
    pub fn route_config_name(&self) -> String {
        bounded_name(CLUSTER_NAME_MAX_LEN, &["https", self.name()])
    }
}

/// Minimum TLS protocol version accepted by a secure virtual host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum MinTlsVersion {
    #[default]
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "1.3")]
    V1_3,
}

/// Validated TLS Secret
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Secret {
    pub name: NamespacedName,
    #[serde(skip)]
    pub certificate: TlsCertificate,
}

/// Path match for a route: exactly one variant per route
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMatchCondition {
    Prefix(String),
    Regex(String),
}

impl PathMatchCondition {
    /// Classify `path`: anything containing one of `^+*[]%` is a regex,
    /// everything else is a prefix.
    pub fn from_path(path: &str) -> Self {
        if path.contains(REGEX_METACHARACTERS) {
            PathMatchCondition::Regex(path.to_string())
        } else {
            PathMatchCondition::Prefix(path.to_string())
        }
    }
}

impl fmt::Display for PathMatchCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathMatchCondition::Prefix(prefix) => write!(f, "prefix: {}", prefix),
            PathMatchCondition::Regex(regex) => write!(f, "regex: {}", regex),
        }
    }
}

/// A path match plus the policies and upstreams it routes to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub path_match: PathMatchCondition,
    /// Redirect plaintext requests to HTTPS
    pub https_upgrade: bool,
    /// Allow websocket upgrades on this route
    pub websocket: bool,
    pub timeout_policy: Option<TimeoutPolicy>,
    pub retry_policy: Option<RetryPolicy>,
    pub clusters: Vec<Cluster>,
}

/// Upstream target of a route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub upstream: Service,
    pub protocol: Protocol,
    /// Relative weight among the route's clusters (0 = split evenly)
    pub weight: u32,
}

impl Cluster {
    pub fn new(upstream: Service) -> Self {
        Self {
            protocol: upstream.protocol,
            upstream,
            weight: 0,
        }
    }

    /// Generated name of this cluster
    pub fn name(&self) -> String {
        cluster_name(&self.upstream)
    }
}

/// Response timeout for a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeoutPolicy {
    pub response_timeout: Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeout {
    /// Never time out
    Infinite,
    Duration(Duration),
}

/// Retry behaviour for a route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    /// Conditions that trigger a retry (`5xx`, `gateway-error`, ...)
    pub retry_on: String,
    /// Maximum retries (0 = proxy default)
    pub num_retries: u32,
    pub per_try_timeout: Option<Duration>,
}
