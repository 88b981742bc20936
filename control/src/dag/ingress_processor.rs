//! Ingress → DAG translation
//!
//! Runs in two phases. Secure virtual hosts are computed for every Ingress
//! first, so the set of TLS-enabled hosts is fixed before any route is
//! attached; routes are computed second and attach to a secure host only
//! when that host already exists.

use super::{
    BuildContext, Cluster, Diagnostic, DiagnosticKind, PathMatchCondition, Processor, Route,
    DEFAULT_HOST,
};
use crate::annotation;
use crate::source::object_key;
use crate::tls::validate_tls_secret;
use common::{NamespacedName, Service};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::sync::Arc;
use tracing::{debug, error};

/// Translates Ingresses into virtual hosts and routes
#[derive(Debug, Clone, Copy, Default)]
pub struct IngressProcessor;

impl Processor for IngressProcessor {
    fn name(&self) -> &'static str {
        "ingress"
    }

    fn run(&self, ctx: &mut BuildContext<'_>) {
        let ingresses = ctx.source().ingresses();

        compute_secure_virtual_hosts(ctx, &ingresses);
        compute_ingresses(ctx, &ingresses);
    }
}

fn compute_secure_virtual_hosts(ctx: &mut BuildContext<'_>, ingresses: &[Arc<Ingress>]) {
    for ing in ingresses {
        let resource = object_key(&**ing);
        let tls_blocks = ing
            .spec
            .as_ref()
            .and_then(|spec| spec.tls.as_ref())
            .into_iter()
            .flatten();

        for tls in tls_blocks {
            let secret_name = NamespacedName::parse(
                tls.secret_name.as_deref().unwrap_or_default(),
                &resource.namespace,
            );

            let secret = match ctx.source().lookup_secret(&secret_name, validate_tls_secret) {
                Ok(secret) => secret,
                Err(e) => {
                    error!(
                        name = %resource.name,
                        namespace = %resource.namespace,
                        secret = %secret_name,
                        error = %e,
                        "unresolved secret reference"
                    );
                    ctx.record(Diagnostic {
                        kind: DiagnosticKind::UnresolvedSecret,
                        resource: resource.clone(),
                        reference: secret_name.to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if !ctx
                .source()
                .delegation_permitted(&secret_name, &resource.namespace)
            {
                error!(
                    name = %resource.name,
                    namespace = %resource.namespace,
                    secret = %secret_name,
                    "certificate delegation not permitted"
                );
                ctx.record(Diagnostic {
                    kind: DiagnosticKind::DelegationNotPermitted,
                    resource: resource.clone(),
                    reference: secret_name.to_string(),
                    message: format!(
                        "secret {} is not delegated to namespace {}",
                        secret_name, resource.namespace
                    ),
                });
                continue;
            }

            let min_tls_version = annotation::min_tls_version(annotation::compat_annotation(
                &**ing,
                "tls-minimum-protocol-version",
            ));

            for host in tls.hosts.iter().flatten() {
                if host.is_empty() || host.contains('*') {
                    continue;
                }
                let svh = ctx.lookup_secure_virtual_host(host);
                svh.secret = Some(secret.clone());
                svh.min_tls_version = min_tls_version;
            }
        }
    }
}

fn compute_ingresses(ctx: &mut BuildContext<'_>, ingresses: &[Arc<Ingress>]) {
    for ing in ingresses {
        for rule in rules_from_spec(ing) {
            compute_ingress_rule(ctx, ing, &rule);
        }
    }
}

fn compute_ingress_rule(ctx: &mut BuildContext<'_>, ing: &Ingress, rule: &IngressRule) {
    let host = rule.host.as_deref().unwrap_or_default();
    if host.contains('*') {
        return;
    }
    let host = if host.is_empty() { DEFAULT_HOST } else { host };

    let resource = object_key(ing);

    for httppath in httppaths(rule) {
        let path = match httppath.path.as_deref() {
            None | Some("") => "/",
            Some(path) => path,
        };

        let service = match lookup_backend(ctx, &resource, &httppath.backend) {
            Some(service) => service,
            None => continue,
        };

        let r = Arc::new(route(ing, path, service));

        if annotation::tls_required(ing) || annotation::http_allowed(ing) {
            ctx.lookup_virtual_host(host).add_route(r.clone());
        }

        if host != DEFAULT_HOST {
            if let Some(svh) = ctx.secure_virtual_host_mut(host) {
                svh.virtual_host.add_route(r);
            }
        }
    }
}

/// Resolve a backend reference, recording a diagnostic when it cannot be
fn lookup_backend(
    ctx: &mut BuildContext<'_>,
    resource: &NamespacedName,
    backend: &IngressBackend,
) -> Option<Service> {
    let Some(svc) = backend.service.as_ref() else {
        debug!(
            name = %resource.name,
            namespace = %resource.namespace,
            "backend has no service reference"
        );
        ctx.record(Diagnostic {
            kind: DiagnosticKind::UnresolvedService,
            resource: resource.clone(),
            reference: String::new(),
            message: "backend has no service reference".to_string(),
        });
        return None;
    };

    let port = svc.port.as_ref().and_then(|p| match (&p.name, p.number) {
        (Some(name), _) if !name.is_empty() => Some(IntOrString::String(name.clone())),
        (_, Some(number)) => Some(IntOrString::Int(number)),
        _ => None,
    });
    let reference = match &port {
        Some(IntOrString::Int(n)) => format!("{}:{}", svc.name, n),
        Some(IntOrString::String(s)) => format!("{}:{}", svc.name, s),
        None => svc.name.clone(),
    };

    let name = NamespacedName::new(resource.namespace.clone(), svc.name.clone());
    let result = match &port {
        Some(port) => ctx
            .source()
            .lookup_service(&name, port)
            .map_err(|e| e.to_string()),
        None => Err(format!("service {} has no port in backend", name)),
    };

    match result {
        Ok(service) => Some(service),
        Err(message) => {
            debug!(
                name = %resource.name,
                namespace = %resource.namespace,
                service = %reference,
                error = %message,
                "unresolved service reference"
            );
            ctx.record(Diagnostic {
                kind: DiagnosticKind::UnresolvedService,
                resource: resource.clone(),
                reference,
                message,
            });
            None
        }
    }
}

/// Build the route for one path of `ingress`
fn route(ingress: &Ingress, path: &str, service: Service) -> Route {
    Route {
        path_match: PathMatchCondition::from_path(path),
        https_upgrade: annotation::tls_required(ingress),
        websocket: annotation::websocket_routes(ingress).contains(path),
        timeout_policy: annotation::timeout_policy(ingress),
        retry_policy: annotation::retry_policy(ingress),
        clusters: vec![Cluster::new(service)],
    }
}

/// Explicit rules followed by a synthetic rule for the default backend
fn rules_from_spec(ingress: &Ingress) -> Vec<IngressRule> {
    let Some(spec) = ingress.spec.as_ref() else {
        return Vec::new();
    };

    let mut rules = spec.rules.clone().unwrap_or_default();
    if let Some(backend) = spec.default_backend.as_ref() {
        rules.push(default_backend_rule(backend));
    }
    rules
}

fn default_backend_rule(backend: &IngressBackend) -> IngressRule {
    IngressRule {
        host: None,
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                backend: backend.clone(),
                path: None,
                path_type: "ImplementationSpecific".to_string(),
            }],
        }),
    }
}

fn httppaths(rule: &IngressRule) -> &[HTTPIngressPath] {
    rule.http
        .as_ref()
        .map(|http| http.paths.as_slice())
        .unwrap_or_default()
}
