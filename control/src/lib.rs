//! SILTA Control Plane Library
//!
//! Turns Kubernetes Ingress resources into a routing DAG of virtual hosts,
//! routes and upstream clusters.

pub mod annotation;
pub mod apis;
pub mod config;
pub mod dag;
pub mod error;
pub mod server;
pub mod source;
pub mod tls;
