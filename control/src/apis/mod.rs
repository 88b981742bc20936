//! Kubernetes API integrations
//!
//! Watchers for the resources the DAG is built from, the
//! TLSCertificateDelegation custom resource, and controller metrics.

pub mod delegation;
pub mod ingress;
pub mod metrics;
