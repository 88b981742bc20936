//! Ingress watching
//!
//! Keeps watch caches of every resource the DAG depends on and republishes
//! the DAG when they change.

pub mod reconciler;
pub mod stores;

pub use reconciler::IngressReconciler;
pub use stores::{ResourceKind, ResourceStores};
