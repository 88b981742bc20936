//! TLSCertificateDelegation custom resource
//!
//! Lets the owner of a TLS Secret allow Ingresses in other namespaces to
//! reference it:
//!
//! ```yaml
//! apiVersion: projectcontour.io/v1
//! kind: TLSCertificateDelegation
//! metadata:
//!   name: wildcard-cert
//!   namespace: certs
//! spec:
//!   delegations:
//!     - secretName: wildcard-tls
//!       targetNamespaces: ["web", "api"]   # or ["*"]
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Target namespace entry that permits every namespace
pub const ALL_NAMESPACES: &str = "*";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "projectcontour.io",
    version = "v1",
    kind = "TLSCertificateDelegation",
    plural = "tlscertificatedelegations",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TLSCertificateDelegationSpec {
    pub delegations: Vec<CertificateDelegation>,
}

/// One delegated Secret and the namespaces allowed to use it
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDelegation {
    /// Name of a Secret in the delegation's own namespace
    pub secret_name: String,
    /// Namespaces allowed to reference the Secret; a single `"*"` allows all
    pub target_namespaces: Vec<String>,
}

impl CertificateDelegation {
    /// Whether this delegation lets `namespace` use the Secret
    pub fn permits(&self, namespace: &str) -> bool {
        if let [only] = self.target_namespaces.as_slice() {
            if only == ALL_NAMESPACES {
                return true;
            }
        }
        self.target_namespaces.iter().any(|ns| ns == namespace)
    }
}
