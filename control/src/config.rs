//! Configuration for SILTA controller
//!
//! Everything can be set from `SILTA_*` environment variables; unset values
//! fall back to the defaults below.

use crate::error::SiltaError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Controller name (used in logs)
    #[serde(default = "default_controller_name")]
    pub controller_name: String,

    /// Ingress class to accept. Ingresses without a class are always
    /// accepted; `None` accepts every class.
    #[serde(default = "default_ingress_class_name")]
    pub ingress_class_name: Option<String>,

    /// Bind address of the debug/metrics HTTP server
    #[serde(default = "default_debug_bind_addr")]
    pub debug_bind_addr: String,

    /// DAG rebuild configuration
    #[serde(default)]
    pub rebuild: RebuildConfig,
}

/// DAG rebuild tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RebuildConfig {
    /// Quiet period after a cluster change before the DAG is rebuilt, in
    /// milliseconds (default: 100ms). Bursts of events within this window
    /// produce a single rebuild.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Longest a pending change may wait for a quiet period, in milliseconds
    /// (default: 1000ms)
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl RebuildConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

fn default_controller_name() -> String {
    "silta.io/ingress-controller".to_string()
}

fn default_ingress_class_name() -> Option<String> {
    Some("silta".to_string())
}

fn default_debug_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_max_wait_ms() -> u64 {
    1000
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_name: default_controller_name(),
            ingress_class_name: default_ingress_class_name(),
            debug_bind_addr: default_debug_bind_addr(),
            rebuild: RebuildConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, SiltaError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_vars<F>(lookup: F) -> Result<Self, SiltaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("SILTA_CONTROLLER_NAME") {
            config.controller_name = val;
        }

        // An empty class means "accept every ingress class"
        if let Some(val) = lookup("SILTA_INGRESS_CLASS") {
            config.ingress_class_name = if val.is_empty() { None } else { Some(val) };
        }

        if let Some(val) = lookup("SILTA_DEBUG_ADDR") {
            config.debug_bind_addr = val;
        }

        if let Some(val) = lookup("SILTA_REBUILD_DEBOUNCE_MS") {
            config.rebuild.debounce_ms = parse_millis("SILTA_REBUILD_DEBOUNCE_MS", &val)?;
        }

        if let Some(val) = lookup("SILTA_REBUILD_MAX_WAIT_MS") {
            config.rebuild.max_wait_ms = parse_millis("SILTA_REBUILD_MAX_WAIT_MS", &val)?;
        }

        Ok(config)
    }
}

fn parse_millis(key: &str, val: &str) -> Result<u64, SiltaError> {
    val.parse()
        .map_err(|e| SiltaError::Config(format!("{}={:?} is not a number: {}", key, val, e)))
}
