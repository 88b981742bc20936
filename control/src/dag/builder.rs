//! DAG Builder
//!
//! A [`Builder`] owns an ordered list of [`Processor`]s. Each run creates a
//! fresh [`BuildContext`] over one resource snapshot, hands it to every
//! processor in turn, and returns the finished graph along with any
//! diagnostics the processors recorded.

use super::{Dag, IngressProcessor, SecureVirtualHost, VirtualHost};
use crate::source::ResourceSource;
use common::NamespacedName;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// One stage of a DAG build
pub trait Processor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Add this processor's contribution to the DAG under construction
    fn run(&self, ctx: &mut BuildContext<'_>);
}

/// Kind of problem found while building
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// TLS Secret missing or not usable
    UnresolvedSecret,
    /// Secret lives in another namespace with no delegation to this one
    DelegationNotPermitted,
    /// Backend Service or port missing
    UnresolvedService,
}

impl DiagnosticKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::UnresolvedSecret => "unresolved_secret",
            DiagnosticKind::DelegationNotPermitted => "delegation_not_permitted",
            DiagnosticKind::UnresolvedService => "unresolved_service",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A skipped reference, attributed to the resource that made it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Resource carrying the bad reference
    pub resource: NamespacedName,
    /// The reference as written (`ns/secret`, `svc:port`)
    pub reference: String,
    pub message: String,
}

/// Result of one build
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildOutcome {
    pub dag: Dag,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildOutcome {
    /// True when every reference resolved
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Mutable state shared by the processors of a single build
pub struct BuildContext<'a> {
    source: &'a dyn ResourceSource,
    dag: Dag,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> BuildContext<'a> {
    pub fn new(source: &'a dyn ResourceSource) -> Self {
        Self {
            source,
            dag: Dag::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn source(&self) -> &'a dyn ResourceSource {
        self.source
    }

    /// Plaintext virtual host for `host`, created on first use
    pub fn lookup_virtual_host(&mut self, host: &str) -> &mut VirtualHost {
        self.dag
            .virtual_hosts
            .entry(host.to_string())
            .or_insert_with(|| VirtualHost::new(host))
    }

    /// Secure virtual host for `host`, created on first use
    pub fn lookup_secure_virtual_host(&mut self, host: &str) -> &mut SecureVirtualHost {
        self.dag
            .secure_virtual_hosts
            .entry(host.to_string())
            .or_insert_with(|| SecureVirtualHost::new(host))
    }

    /// Secure virtual hosts created so far
    pub fn secure_virtual_hosts(&self) -> &BTreeMap<String, SecureVirtualHost> {
        &self.dag.secure_virtual_hosts
    }

    /// Existing secure virtual host for `host`; never creates one
    pub fn secure_virtual_host_mut(&mut self, host: &str) -> Option<&mut SecureVirtualHost> {
        self.dag.secure_virtual_hosts.get_mut(host)
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn finish(self) -> BuildOutcome {
        BuildOutcome {
            dag: self.dag,
            diagnostics: self.diagnostics,
        }
    }
}

/// Runs processors in order over a resource snapshot
pub struct Builder {
    processors: Vec<Box<dyn Processor>>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::with_processors(vec![Box::new(IngressProcessor)])
    }
}

impl Builder {
    pub fn with_processors(processors: Vec<Box<dyn Processor>>) -> Self {
        Self { processors }
    }

    /// Processor names in run order
    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Build a new DAG from `source`
    pub fn run(&self, source: &dyn ResourceSource) -> BuildOutcome {
        let mut ctx = BuildContext::new(source);

        for processor in &self.processors {
            processor.run(&mut ctx);
            debug!(
                processor = processor.name(),
                virtual_hosts = ctx.dag.virtual_hosts.len(),
                secure_virtual_hosts = ctx.dag.secure_virtual_hosts.len(),
                "processor finished"
            );
        }

        ctx.finish()
    }
}
