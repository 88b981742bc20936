//! Annotation resolution
//!
//! Ingress and Service behaviour that the Kubernetes types cannot express is
//! configured through annotations. Keys under `projectcontour.io/` take
//! precedence over their legacy `contour.heptio.com/` spelling.

use crate::dag::{MinTlsVersion, RetryPolicy, Timeout, TimeoutPolicy};
use common::Protocol;
use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use std::collections::BTreeSet;
use std::time::Duration;

/// Legacy ingress class annotation
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// Redirect plaintext requests to HTTPS when `"true"`
pub const FORCE_SSL_REDIRECT_ANNOTATION: &str = "ingress.kubernetes.io/force-ssl-redirect";

/// Disables the plaintext listener for an ingress when `"false"`
pub const ALLOW_HTTP_ANNOTATION: &str = "kubernetes.io/ingress.allow-http";

const ANNOTATION_PREFIX: &str = "projectcontour.io/";
const LEGACY_ANNOTATION_PREFIX: &str = "contour.heptio.com/";

/// Value of `projectcontour.io/<key>`, falling back to
/// `contour.heptio.com/<key>`; empty when neither is set.
pub fn compat_annotation<'a, K: ResourceExt>(obj: &'a K, key: &str) -> &'a str {
    let annotations = obj.annotations();
    annotations
        .get(&format!("{}{}", ANNOTATION_PREFIX, key))
        .or_else(|| annotations.get(&format!("{}{}", LEGACY_ANNOTATION_PREFIX, key)))
        .map(String::as_str)
        .unwrap_or_default()
}

/// Ingress class of `ingress`: the legacy annotation wins over
/// `spec.ingressClassName`; empty when unset.
pub fn ingress_class(ingress: &Ingress) -> &str {
    if let Some(class) = ingress.annotations().get(INGRESS_CLASS_ANNOTATION) {
        return class;
    }
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.as_deref())
        .unwrap_or_default()
}

/// Whether `ingress` belongs to the controller configured with `class`.
///
/// Ingresses without a class are always accepted; a controller configured
/// without a class accepts everything.
pub fn matches_ingress_class(ingress: &Ingress, class: Option<&str>) -> bool {
    let ingress_class = ingress_class(ingress);
    match class {
        None => true,
        Some(class) => ingress_class.is_empty() || ingress_class == class,
    }
}

/// Whether the ingress requires TLS (plaintext requests are upgraded)
pub fn tls_required(ingress: &Ingress) -> bool {
    ingress
        .annotations()
        .get(FORCE_SSL_REDIRECT_ANNOTATION)
        .is_some_and(|v| v == "true")
}

/// Whether the ingress may be served over plaintext HTTP
pub fn http_allowed(ingress: &Ingress) -> bool {
    ingress
        .annotations()
        .get(ALLOW_HTTP_ANNOTATION)
        .map_or(true, |v| v != "false")
}

/// Paths listed in the `websocket-routes` annotation
pub fn websocket_routes(ingress: &Ingress) -> BTreeSet<String> {
    compat_annotation(ingress, "websocket-routes")
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Minimum TLS version from a raw annotation value (default 1.1)
pub fn min_tls_version(raw: &str) -> MinTlsVersion {
    match raw {
        "1.3" => MinTlsVersion::V1_3,
        "1.2" => MinTlsVersion::V1_2,
        _ => MinTlsVersion::V1_1,
    }
}

/// Response timeout from `response-timeout` (or the older `request-timeout`).
///
/// `None` when neither annotation is set. `infinity`, or any value that does
/// not parse as a duration, disables the timeout.
pub fn timeout_policy(ingress: &Ingress) -> Option<TimeoutPolicy> {
    let mut raw = compat_annotation(ingress, "response-timeout");
    if raw.is_empty() {
        raw = compat_annotation(ingress, "request-timeout");
    }
    if raw.is_empty() {
        return None;
    }

    let response_timeout = match raw {
        "infinity" => Timeout::Infinite,
        _ => parse_duration(raw).map_or(Timeout::Infinite, Timeout::Duration),
    };
    Some(TimeoutPolicy { response_timeout })
}

/// Retry policy from `retry-on`, `num-retries` and `per-try-timeout`.
///
/// `None` unless `retry-on` is set.
pub fn retry_policy(ingress: &Ingress) -> Option<RetryPolicy> {
    let retry_on = compat_annotation(ingress, "retry-on");
    if retry_on.is_empty() {
        return None;
    }

    Some(RetryPolicy {
        retry_on: retry_on.to_string(),
        num_retries: compat_annotation(ingress, "num-retries")
            .parse()
            .unwrap_or(0),
        per_try_timeout: parse_duration(compat_annotation(ingress, "per-try-timeout")),
    })
}

/// Protocol for `port` of `service`, from the
/// `upstream-protocol.{h2,h2c,tls}` annotations. Each annotation lists port
/// names or numbers separated by commas.
pub fn upstream_protocol<K: ResourceExt>(service: &K, port: &ServicePort) -> Protocol {
    let number = port.port.to_string();
    let name = port.name.as_deref().unwrap_or_default();

    for protocol in [Protocol::H2, Protocol::H2c, Protocol::Tls] {
        let key = format!("upstream-protocol.{}", protocol.as_str());
        let listed = compat_annotation(service, &key)
            .split(',')
            .map(str::trim)
            .any(|p| !p.is_empty() && (p == number || p == name));
        if listed {
            return protocol;
        }
    }
    Protocol::Http
}

/// Parse a Go-style duration (`300ms`, `1.5h`, `2m30s`).
///
/// Valid units are `ns`, `us` (`µs`), `ms`, `s`, `m` and `h`. A bare `0` is
/// accepted. Negative durations are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    if s == "0" {
        return Some(Duration::ZERO);
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    if rest.is_empty() || rest.starts_with('-') {
        return None;
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_part, tail) = rest.split_at(int_end);
        rest = tail;

        let mut frac_part = "";
        if let Some(tail) = rest.strip_prefix('.') {
            let frac_end = tail.find(|c: char| !c.is_ascii_digit()).unwrap_or(tail.len());
            frac_part = &tail[..frac_end];
            rest = &tail[frac_end..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_end = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (unit, tail) = rest.split_at(unit_end);
        rest = tail;

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3600 * 1_000_000_000,
            _ => return None,
        };

        let int_value: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let mut nanos = int_value.checked_mul(unit_nanos)?;

        if !frac_part.is_empty() {
            // digits past 18 are below nanosecond precision for every unit
            let frac_part = &frac_part[..frac_part.len().min(18)];
            let frac_value: u128 = frac_part.parse().ok()?;
            let scale = 10u128.pow(frac_part.len() as u32);
            nanos = nanos.checked_add(frac_value * unit_nanos / scale)?;
        }

        total = total.checked_add(nanos)?;
    }

    u64::try_from(total).ok().map(Duration::from_nanos)
}
