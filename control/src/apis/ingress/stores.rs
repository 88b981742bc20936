//! Watch caches for the resources the DAG is built from

use crate::apis::delegation::TLSCertificateDelegation;
use crate::source::KubernetesCache;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::reflector::Store;
use serde::Serialize;
use std::fmt;

/// Kind of resource a watch event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResourceKind {
    Ingress,
    Secret,
    Service,
    TLSCertificateDelegation,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Ingress,
        ResourceKind::Secret,
        ResourceKind::Service,
        ResourceKind::TLSCertificateDelegation,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ResourceKind::Ingress => "Ingress",
            ResourceKind::Secret => "Secret",
            ResourceKind::Service => "Service",
            ResourceKind::TLSCertificateDelegation => "TLSCertificateDelegation",
        };
        f.write_str(kind)
    }
}

/// Reflector stores, one per watched kind
#[derive(Clone)]
pub struct ResourceStores {
    pub ingresses: Store<Ingress>,
    pub secrets: Store<Secret>,
    pub services: Store<Service>,
    pub delegations: Store<TLSCertificateDelegation>,
}

impl ResourceStores {
    /// Copy the current store contents into a build snapshot
    pub fn snapshot(&self, ingress_class: Option<String>) -> KubernetesCache {
        let mut cache = KubernetesCache::new(ingress_class);

        for ingress in self.ingresses.state() {
            cache.insert_ingress(ingress);
        }
        for secret in self.secrets.state() {
            cache.insert_secret(secret);
        }
        for service in self.services.state() {
            cache.insert_service(service);
        }
        for delegation in self.delegations.state() {
            cache.insert_delegation(delegation);
        }

        cache
    }
}
