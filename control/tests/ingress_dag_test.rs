//! Ingress → DAG scenarios
//!
//! Run with: cargo test --test ingress_dag_test

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod fixtures;

use common::{NamespacedName, Protocol};
use control::dag::{
    BuildOutcome, Builder, DiagnosticKind, MinTlsVersion, PathMatchCondition, Route, Timeout,
};
use control::source::KubernetesCache;
use fixtures::*;
use std::sync::Arc;
use std::time::Duration;

fn build(cache: &KubernetesCache) -> BuildOutcome {
    Builder::default().run(cache)
}

fn prefix(path: &str) -> PathMatchCondition {
    PathMatchCondition::Prefix(path.to_string())
}

fn plain_route<'a>(outcome: &'a BuildOutcome, host: &str, path: &str) -> &'a Arc<Route> {
    outcome
        .dag
        .virtual_host(host)
        .unwrap_or_else(|| panic!("virtual host {} should exist", host))
        .route(&prefix(path))
        .unwrap_or_else(|| panic!("route {} on {} should exist", path, host))
}

fn secure_route<'a>(outcome: &'a BuildOutcome, host: &str, path: &str) -> &'a Arc<Route> {
    outcome
        .dag
        .secure_virtual_host(host)
        .unwrap_or_else(|| panic!("secure virtual host {} should exist", host))
        .virtual_host
        .route(&prefix(path))
        .unwrap_or_else(|| panic!("secure route {} on {} should exist", path, host))
}

#[test]
fn default_backend_routes_everything_on_default_host() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "simple")
            .default_backend("echo", 80)
            .build(),
    );
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);

    assert!(outcome.is_clean());
    assert_eq!(outcome.dag.virtual_hosts.len(), 1);
    assert!(outcome.dag.secure_virtual_hosts.is_empty());

    let route = plain_route(&outcome, "*", "/");
    assert_eq!(route.clusters.len(), 1);
    assert_eq!(
        route.clusters[0].upstream.name,
        NamespacedName::new("default", "echo")
    );
    assert_eq!(route.clusters[0].upstream.port, 80);
    assert!(!route.https_upgrade);
}

#[test]
fn empty_host_and_empty_path_are_normalized() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .rule("", &[("", "echo", 80)])
            .build(),
    );
    cache.insert_service(service("default", "echo", &[("", 80)]));

    let outcome = build(&cache);
    plain_route(&outcome, "*", "/");
}

#[test]
fn tls_host_gets_secure_virtual_host_sharing_the_route() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .tls("example-tls", &["example.com"])
            .rule("example.com", &[("/", "echo", 80)])
            .build(),
    );
    cache.insert_secret(tls_secret("default", "example-tls"));
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);
    assert!(outcome.is_clean());

    let svh = outcome
        .dag
        .secure_virtual_host("example.com")
        .expect("secure host should exist");
    assert_eq!(
        svh.secret.as_ref().map(|s| &s.name),
        Some(&NamespacedName::new("default", "example-tls"))
    );
    assert_eq!(svh.min_tls_version, MinTlsVersion::V1_1);

    let plain = plain_route(&outcome, "example.com", "/");
    let secure = secure_route(&outcome, "example.com", "/");
    assert!(Arc::ptr_eq(plain, secure));
}

#[test]
fn secure_host_without_matching_rule_has_no_routes() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .tls("example-tls", &["secure.example.com"])
            .rule("other.example.com", &[("/", "echo", 80)])
            .build(),
    );
    cache.insert_secret(tls_secret("default", "example-tls"));
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);

    let svh = outcome.dag.secure_virtual_host("secure.example.com").unwrap();
    assert!(svh.virtual_host.is_empty());
    assert!(outcome.dag.secure_virtual_host("other.example.com").is_none());
    plain_route(&outcome, "other.example.com", "/");
}

#[test]
fn secure_hosts_from_other_ingresses_are_visible_to_routes() {
    // TLS declared by one Ingress, routes by another: every TLS block is
    // processed before any route is attached.
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "a-routes")
            .rule("example.com", &[("/", "echo", 80)])
            .build(),
    );
    cache.insert_ingress(
        IngressBuilder::new("default", "z-tls")
            .tls("example-tls", &["example.com"])
            .build(),
    );
    cache.insert_secret(tls_secret("default", "example-tls"));
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);
    secure_route(&outcome, "example.com", "/");
}

#[test]
fn default_host_never_gets_secure_routes() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .tls("example-tls", &["example.com"])
            .default_backend("echo", 80)
            .build(),
    );
    cache.insert_secret(tls_secret("default", "example-tls"));
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);

    plain_route(&outcome, "*", "/");
    assert!(outcome.dag.secure_virtual_host("*").is_none());
    assert!(outcome
        .dag
        .secure_virtual_host("example.com")
        .unwrap()
        .virtual_host
        .is_empty());
}

#[test]
fn wildcard_hosts_are_dropped_silently() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .tls("example-tls", &["*.example.com"])
            .rule("*.example.com", &[("/", "echo", 80)])
            .rule("www.example.com", &[("/", "echo", 80)])
            .build(),
    );
    cache.insert_secret(tls_secret("default", "example-tls"));
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);

    assert!(outcome.is_clean());
    assert!(outcome.dag.secure_virtual_hosts.is_empty());
    let hosts: Vec<&String> = outcome.dag.virtual_hosts.keys().collect();
    assert_eq!(hosts, vec!["www.example.com"]);
}

#[test]
fn empty_tls_host_is_ignored() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .tls("example-tls", &["", "example.com"])
            .rule("example.com", &[("/", "echo", 80)])
            .build(),
    );
    cache.insert_secret(tls_secret("default", "example-tls"));
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);

    assert!(outcome.is_clean());
    let hosts: Vec<&String> = outcome.dag.secure_virtual_hosts.keys().collect();
    assert_eq!(hosts, vec!["example.com"]);
    secure_route(&outcome, "example.com", "/");
}

#[test]
fn bad_tls_block_does_not_affect_the_next_one() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .tls("missing-tls", &["a.example.com"])
            .tls("opaque", &["b.example.com"])
            .tls("good-tls", &["c.example.com"])
            .build(),
    );
    cache.insert_secret(opaque_secret("default", "opaque"));
    cache.insert_secret(tls_secret("default", "good-tls"));

    let outcome = build(&cache);

    let hosts: Vec<&String> = outcome.dag.secure_virtual_hosts.keys().collect();
    assert_eq!(hosts, vec!["c.example.com"]);

    assert_eq!(outcome.diagnostics.len(), 2);
    for diagnostic in &outcome.diagnostics {
        assert_eq!(diagnostic.kind, DiagnosticKind::UnresolvedSecret);
        assert_eq!(diagnostic.resource, NamespacedName::new("default", "web"));
    }
    assert_eq!(outcome.diagnostics[0].reference, "default/missing-tls");
    assert_eq!(outcome.diagnostics[1].reference, "default/opaque");
}

#[test]
fn cross_namespace_secret_requires_delegation() {
    let ingress = IngressBuilder::new("web", "site")
        .tls("certs/wildcard", &["example.com"])
        .rule("example.com", &[("/", "echo", 80)])
        .build();

    let mut cache = KubernetesCache::default();
    cache.insert_ingress(ingress.clone());
    cache.insert_secret(tls_secret("certs", "wildcard"));
    cache.insert_service(service("web", "echo", &[("http", 80)]));

    let outcome = build(&cache);

    assert!(outcome.dag.secure_virtual_host("example.com").is_none());
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(
        outcome.diagnostics[0].kind,
        DiagnosticKind::DelegationNotPermitted
    );
    assert_eq!(outcome.diagnostics[0].reference, "certs/wildcard");
    // The plaintext route is unaffected
    plain_route(&outcome, "example.com", "/");

    cache.insert_delegation(delegation("certs", "wildcard", &["web"]));
    let outcome = build(&cache);

    assert!(outcome.is_clean());
    let svh = outcome.dag.secure_virtual_host("example.com").unwrap();
    assert_eq!(
        svh.secret.as_ref().unwrap().name,
        NamespacedName::new("certs", "wildcard")
    );
    secure_route(&outcome, "example.com", "/");
}

#[test]
fn delegation_to_all_namespaces() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("api", "site")
            .tls("certs/wildcard", &["api.example.com"])
            .build(),
    );
    cache.insert_secret(tls_secret("certs", "wildcard"));
    cache.insert_delegation(delegation("certs", "wildcard", &["*"]));

    let outcome = build(&cache);
    assert!(outcome.dag.secure_virtual_host("api.example.com").is_some());
}

#[test]
fn plaintext_disabled_keeps_only_secure_route() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .annotation("kubernetes.io/ingress.allow-http", "false")
            .tls("example-tls", &["example.com"])
            .rule("example.com", &[("/", "echo", 80)])
            .build(),
    );
    cache.insert_secret(tls_secret("default", "example-tls"));
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);

    assert!(outcome.dag.virtual_host("example.com").is_none());
    let route = secure_route(&outcome, "example.com", "/");
    assert!(!route.https_upgrade);
}

#[test]
fn force_ssl_redirect_upgrades_plaintext() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .annotation("kubernetes.io/ingress.allow-http", "false")
            .annotation("ingress.kubernetes.io/force-ssl-redirect", "true")
            .tls("example-tls", &["example.com"])
            .rule("example.com", &[("/", "echo", 80)])
            .build(),
    );
    cache.insert_secret(tls_secret("default", "example-tls"));
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);

    let route = plain_route(&outcome, "example.com", "/");
    assert!(route.https_upgrade);
    assert!(Arc::ptr_eq(route, secure_route(&outcome, "example.com", "/")));
}

#[test]
fn route_policies_from_annotations() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .annotation("projectcontour.io/websocket-routes", "/ws")
            .annotation("contour.heptio.com/request-timeout", "30s")
            .annotation("projectcontour.io/retry-on", "gateway-error")
            .annotation("projectcontour.io/num-retries", "3")
            .annotation("projectcontour.io/per-try-timeout", "500ms")
            .rule("example.com", &[("/ws", "echo", 80), ("/api", "echo", 80)])
            .build(),
    );
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);

    let ws = plain_route(&outcome, "example.com", "/ws");
    assert!(ws.websocket);
    let api = plain_route(&outcome, "example.com", "/api");
    assert!(!api.websocket);

    let timeout = api.timeout_policy.as_ref().expect("timeout policy");
    assert_eq!(
        timeout.response_timeout,
        Timeout::Duration(Duration::from_secs(30))
    );
    let retry = api.retry_policy.as_ref().expect("retry policy");
    assert_eq!(retry.retry_on, "gateway-error");
    assert_eq!(retry.num_retries, 3);
    assert_eq!(retry.per_try_timeout, Some(Duration::from_millis(500)));
}

#[test]
fn minimum_tls_version_from_annotation() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .annotation("projectcontour.io/tls-minimum-protocol-version", "1.3")
            .tls("example-tls", &["example.com"])
            .build(),
    );
    cache.insert_secret(tls_secret("default", "example-tls"));

    let outcome = build(&cache);
    assert_eq!(
        outcome.dag.secure_virtual_host("example.com").unwrap().min_tls_version,
        MinTlsVersion::V1_3
    );
}

#[test]
fn unresolved_service_skips_only_that_path() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .rule(
                "example.com",
                &[("/a", "echo", 80), ("/b", "missing", 80), ("/c", "echo", 9999)],
            )
            .rule("other.example.com", &[("/", "echo", 80)])
            .build(),
    );
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);

    let vh = outcome.dag.virtual_host("example.com").unwrap();
    assert_eq!(vh.routes().count(), 1);
    plain_route(&outcome, "example.com", "/a");
    plain_route(&outcome, "other.example.com", "/");

    let kinds: Vec<DiagnosticKind> = outcome.diagnostics.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![DiagnosticKind::UnresolvedService, DiagnosticKind::UnresolvedService]
    );
    assert_eq!(outcome.diagnostics[0].reference, "missing:80");
    assert_eq!(outcome.diagnostics[1].reference, "echo:9999");
}

#[test]
fn named_port_backend() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .rule_with_backends("example.com", vec![("/", backend("grpc", Port::Name("grpc")))])
            .build(),
    );
    let mut svc = service("default", "grpc", &[("http", 80), ("grpc", 9000)]);
    svc.metadata.annotations = Some(
        [(
            "projectcontour.io/upstream-protocol.h2c".to_string(),
            "grpc".to_string(),
        )]
        .into_iter()
        .collect(),
    );
    cache.insert_service(svc);

    let outcome = build(&cache);

    let route = plain_route(&outcome, "example.com", "/");
    assert_eq!(route.clusters[0].upstream.port, 9000);
    assert_eq!(route.clusters[0].protocol, Protocol::H2c);
}

#[test]
fn rule_without_http_contributes_no_routes() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .rule_without_http("example.com")
            .build(),
    );

    let outcome = build(&cache);
    assert_eq!(outcome, BuildOutcome::default());
}

#[test]
fn regex_paths_are_classified() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .rule("example.com", &[("/static/.*", "echo", 80)])
            .build(),
    );
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);
    let vh = outcome.dag.virtual_host("example.com").unwrap();
    let route = vh
        .route(&PathMatchCondition::Regex("/static/.*".to_string()))
        .expect("regex route");
    assert_eq!(route.path_match.to_string(), "regex: /static/.*");
}

#[test]
fn later_ingress_replaces_route_with_same_match() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "b-web")
            .rule("example.com", &[("/", "v2", 80)])
            .build(),
    );
    cache.insert_ingress(
        IngressBuilder::new("default", "a-web")
            .rule("example.com", &[("/", "v1", 80)])
            .build(),
    );
    cache.insert_service(service("default", "v1", &[("http", 80)]));
    cache.insert_service(service("default", "v2", &[("http", 80)]));

    let outcome = build(&cache);
    let route = plain_route(&outcome, "example.com", "/");
    assert_eq!(route.clusters[0].upstream.service_name(), "v2");
}

#[test]
fn ingress_class_filter_applies_before_build() {
    let mut cache = KubernetesCache::new(Some("silta".to_string()));
    cache.insert_ingress(
        IngressBuilder::new("default", "ours")
            .class("silta")
            .rule("ours.example.com", &[("/", "echo", 80)])
            .build(),
    );
    cache.insert_ingress(
        IngressBuilder::new("default", "theirs")
            .annotation("kubernetes.io/ingress.class", "nginx")
            .rule("theirs.example.com", &[("/", "echo", 80)])
            .build(),
    );
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let outcome = build(&cache);
    let hosts: Vec<&String> = outcome.dag.virtual_hosts.keys().collect();
    assert_eq!(hosts, vec!["ours.example.com"]);
}

#[test]
fn clusters_are_named_and_deduplicated() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .rule("a.example.com", &[("/", "echo", 80)])
            .rule("b.example.com", &[("/", "echo", 80), ("/admin", "admin", 8080)])
            .build(),
    );
    cache.insert_service(service("default", "echo", &[("http", 80)]));
    cache.insert_service(service("default", "admin", &[("http", 8080)]));

    let outcome = build(&cache);
    let names: Vec<String> = outcome.dag.clusters().into_keys().collect();
    assert_eq!(
        names,
        vec!["default/admin/8080/da39a3ee5e", "default/echo/80/da39a3ee5e"]
    );
}

#[test]
fn rebuilding_the_same_snapshot_is_deterministic() {
    let mut cache = KubernetesCache::default();
    cache.insert_ingress(
        IngressBuilder::new("default", "web")
            .tls("example-tls", &["example.com"])
            .tls("missing", &["missing.example.com"])
            .rule("example.com", &[("/", "echo", 80), ("/api", "api", 8080)])
            .default_backend("echo", 80)
            .build(),
    );
    cache.insert_secret(tls_secret("default", "example-tls"));
    cache.insert_service(service("default", "echo", &[("http", 80)]));

    let builder = Builder::default();
    let first = builder.run(&cache);
    let second = builder.run(&cache);

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
