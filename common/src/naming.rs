//! Generated resource names
//!
//! Every proxy-side resource (clusters, route configurations, listeners) is
//! named from the semantic identity of the object it was generated from.
//! Names must be:
//!
//! - deterministic: the same inputs always give the same name
//! - bounded: never longer than the caller's budget
//! - readable while short: `namespace/name/port/...` is returned untouched
//!
//! Long inputs degrade from fully readable, to partially truncated segments
//! carrying a short hash suffix, to an opaque hash.

use crate::Service;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Length budget for cluster names (and the other names the snapshotter generates)
pub const CLUSTER_NAME_MAX_LEN: usize = 60;

/// Length of the hash suffix appended to truncated segments
pub const SHORT_HASH_LEN: usize = 6;

/// Bytes of the identity digest kept in cluster names
const IDENTITY_KEY_BYTES: usize = 5;

/// Short hex disambiguator for the upstream configuration of `service`.
///
/// Two clusters for the same Service port that differ in load balancer
/// strategy or health check policy are different upstreams as far as the
/// proxy is concerned, so they must not share a name. Fields are appended in a
/// fixed order and only when set.
pub fn cluster_identity_key(service: &Service) -> String {
    let mut buf = service.load_balancer_strategy.clone();
    if let Some(hc) = &service.health_check {
        if hc.timeout_seconds > 0 {
            buf.push_str(&format_duration_secs(hc.timeout_seconds));
        }
        if hc.interval_seconds > 0 {
            buf.push_str(&format_duration_secs(hc.interval_seconds));
        }
        if hc.unhealthy_threshold_count > 0 {
            buf.push_str(&hc.unhealthy_threshold_count.to_string());
        }
        if hc.healthy_threshold_count > 0 {
            buf.push_str(&hc.healthy_threshold_count.to_string());
        }
        buf.push_str(&hc.path);
    }

    let digest = Sha1::digest(buf.as_bytes());
    hex::encode(&digest[..IDENTITY_KEY_BYTES])
}

/// Name of the upstream cluster for `service`.
///
/// `namespace/name/port/<identity key>`, bounded to [`CLUSTER_NAME_MAX_LEN`].
pub fn cluster_name(service: &Service) -> String {
    let port = service.port.to_string();
    let key = cluster_identity_key(service);
    bounded_name(
        CLUSTER_NAME_MAX_LEN,
        &[service.namespace(), service.service_name(), &port, &key],
    )
}

/// Join `segments` with `/` into a name no longer than `max_len` bytes.
///
/// When the joined name fits it is returned unchanged. Otherwise segments are
/// truncated one at a time, last to first, to `max_len / segments.len()`
/// bytes, ending in `-` plus the first [`SHORT_HASH_LEN`] hex characters of
/// the SHA-256 of the full joined name. If the name still does not fit after
/// every segment was truncated, the hex hash itself (cut to `max_len`) is
/// returned.
///
/// ```
/// use common::bounded_name;
///
/// assert_eq!(bounded_name(60, &["default", "echo", "80"]), "default/echo/80");
/// assert!(bounded_name(20, &["default", &"x".repeat(100)]).len() <= 20);
/// ```
pub fn bounded_name(max_len: usize, segments: &[&str]) -> String {
    let joined = segments.join("/");
    if joined.len() <= max_len {
        return joined;
    }

    // joined is non-empty here, so there is at least one segment
    let hash = hex::encode(Sha256::digest(joined.as_bytes()));
    let suffix = &hash[..SHORT_HASH_LEN];
    let budget = max_len / segments.len();

    let mut parts: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
    for n in (0..parts.len()).rev() {
        parts[n] = truncate(budget, &parts[n], suffix);
        let candidate = parts.join("/");
        if candidate.len() <= max_len {
            return candidate;
        }
    }

    hash[..hash.len().min(max_len)].to_string()
}

/// Cut `s` to `budget` bytes by replacing its tail with `-suffix`.
fn truncate(budget: usize, s: &str, suffix: &str) -> String {
    if budget >= s.len() {
        return s.to_string();
    }
    if budget <= suffix.len() {
        return suffix[..budget].to_string();
    }
    let keep = floor_char_boundary(s, budget - suffix.len() - 1);
    format!("{}-{}", &s[..keep], suffix)
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Render whole seconds the way Go prints a `time.Duration`
/// (`45s`, `1m30s`, `2h0m5s`).
pub fn format_duration_secs(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
