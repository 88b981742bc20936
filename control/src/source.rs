//! Resource source
//!
//! The builder reads cluster state only through [`ResourceSource`]. Every
//! lookup is an in-memory map access; nothing here touches the network.
//! [`KubernetesCache`] is the snapshot implementation: it is filled once from
//! the watch caches, then handed to a single build and dropped.

use crate::annotation;
use crate::apis::delegation::TLSCertificateDelegation;
use crate::dag::Secret;
use crate::error::LookupError;
use crate::tls::SecretValidator;
use common::{NamespacedName, Protocol, Service, DEFAULT_NAMESPACE};
use k8s_openapi::api::core::v1::{Secret as KubeSecret, Service as KubeService};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Read-only view of the cluster resources used for one build
pub trait ResourceSource {
    /// Every accepted Ingress, ordered by namespace and name
    fn ingresses(&self) -> Vec<Arc<Ingress>>;

    /// Resolve a Secret and run `validate` over it
    fn lookup_secret(
        &self,
        name: &NamespacedName,
        validate: SecretValidator,
    ) -> Result<Secret, LookupError>;

    /// Resolve one port of a Service, by port number or port name
    fn lookup_service(
        &self,
        name: &NamespacedName,
        port: &IntOrString,
    ) -> Result<Service, LookupError>;

    /// Whether `target_namespace` may use `secret`
    fn delegation_permitted(&self, secret: &NamespacedName, target_namespace: &str) -> bool;
}

/// Namespaced name of any Kubernetes object
pub fn object_key<K: ResourceExt>(obj: &K) -> NamespacedName {
    NamespacedName::new(
        obj.namespace()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        obj.name_any(),
    )
}

/// In-memory snapshot of the resources relevant to routing
#[derive(Debug, Clone, Default)]
pub struct KubernetesCache {
    ingress_class: Option<String>,
    ingresses: BTreeMap<NamespacedName, Arc<Ingress>>,
    secrets: BTreeMap<NamespacedName, Arc<KubeSecret>>,
    services: BTreeMap<NamespacedName, Arc<KubeService>>,
    delegations: BTreeMap<NamespacedName, Arc<TLSCertificateDelegation>>,
}

impl KubernetesCache {
    /// Empty cache accepting Ingresses of `ingress_class` (and unclassed ones)
    pub fn new(ingress_class: Option<String>) -> Self {
        Self {
            ingress_class,
            ..Default::default()
        }
    }

    /// Insert an Ingress; returns false when it belongs to another class
    pub fn insert_ingress(&mut self, ingress: impl Into<Arc<Ingress>>) -> bool {
        let ingress = ingress.into();
        if !annotation::matches_ingress_class(&ingress, self.ingress_class.as_deref()) {
            debug!(
                name = %ingress.name_any(),
                class = %annotation::ingress_class(&ingress),
                "ignoring ingress of another class"
            );
            return false;
        }
        self.ingresses.insert(object_key(&*ingress), ingress);
        true
    }

    pub fn insert_secret(&mut self, secret: impl Into<Arc<KubeSecret>>) {
        let secret = secret.into();
        self.secrets.insert(object_key(&*secret), secret);
    }

    pub fn insert_service(&mut self, service: impl Into<Arc<KubeService>>) {
        let service = service.into();
        self.services.insert(object_key(&*service), service);
    }

    pub fn insert_delegation(&mut self, delegation: impl Into<Arc<TLSCertificateDelegation>>) {
        let delegation = delegation.into();
        self.delegations.insert(object_key(&*delegation), delegation);
    }

    pub fn len(&self) -> usize {
        self.ingresses.len() + self.secrets.len() + self.services.len() + self.delegations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceSource for KubernetesCache {
    fn ingresses(&self) -> Vec<Arc<Ingress>> {
        self.ingresses.values().cloned().collect()
    }

    fn lookup_secret(
        &self,
        name: &NamespacedName,
        validate: SecretValidator,
    ) -> Result<Secret, LookupError> {
        let secret = self
            .secrets
            .get(name)
            .ok_or_else(|| LookupError::SecretNotFound(name.clone()))?;

        let certificate = validate(secret).map_err(|source| LookupError::InvalidSecret {
            name: name.clone(),
            source,
        })?;

        Ok(Secret {
            name: name.clone(),
            certificate,
        })
    }

    fn lookup_service(
        &self,
        name: &NamespacedName,
        port: &IntOrString,
    ) -> Result<Service, LookupError> {
        let svc = self
            .services
            .get(name)
            .ok_or_else(|| LookupError::ServiceNotFound(name.clone()))?;

        let port_not_found = || LookupError::PortNotFound {
            name: name.clone(),
            port: match port {
                IntOrString::Int(n) => n.to_string(),
                IntOrString::String(s) => s.clone(),
            },
        };

        let service_port = svc
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .into_iter()
            .flatten()
            .find(|p| match port {
                IntOrString::Int(n) => p.port == *n,
                IntOrString::String(s) => p.name.as_deref() == Some(s.as_str()),
            })
            .ok_or_else(port_not_found)?;

        let number = u16::try_from(service_port.port).map_err(|_| port_not_found())?;
        let protocol: Protocol = annotation::upstream_protocol(&**svc, service_port);

        Ok(Service {
            name: name.clone(),
            port: number,
            port_name: service_port.name.clone().unwrap_or_default(),
            protocol,
            load_balancer_strategy: String::new(),
            health_check: None,
        })
    }

    fn delegation_permitted(&self, secret: &NamespacedName, target_namespace: &str) -> bool {
        if secret.namespace == target_namespace {
            return true;
        }

        self.delegations
            .iter()
            .filter(|(key, _)| key.namespace == secret.namespace)
            .flat_map(|(_, d)| d.spec.delegations.iter())
            .filter(|cd| cd.secret_name == secret.name)
            .any(|cd| cd.permits(target_namespace))
    }
}
