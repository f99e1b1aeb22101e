//! Base-URI derivation for consumer creation
//!
//! The creation response carries the URI the client must use for all
//! follow-up requests. When the bridge sits behind a forwarding proxy, the
//! externally visible scheme and authority come from the `Forwarded` or
//! `X-Forwarded-*` headers rather than from the request line.

use axum::http::{header, HeaderMap};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{BridgeError, Result};

#[allow(clippy::expect_used)]
static FORWARDED_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)host=([^;]+)").expect("static pattern"));
#[allow(clippy::expect_used)]
static FORWARDED_PROTO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)proto=([^;]+)").expect("static pattern"));
#[allow(clippy::expect_used)]
static HOST_WITH_PORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*:[0-9]+$").expect("static pattern"));

/// Build the `base_uri` of a newly created consumer instance:
/// `<scheme>://<authority><path>/instances/<name>`.
pub fn consumer_instance_uri(headers: &HeaderMap, path: &str, name: &str) -> Result<String> {
    let mut base = request_uri(headers, path)?;
    if !base.ends_with('/') {
        base.push('/');
    }
    base.push_str("instances/");
    base.push_str(name);
    Ok(base)
}

/// Derive the externally visible request URI, in priority order:
/// a `Forwarded` header carrying both `host=` and `proto=`, then the
/// `X-Forwarded-Host`/`X-Forwarded-Proto` pair, then the request's own
/// absolute URI. Only the first `Forwarded` header is honoured.
fn request_uri(headers: &HeaderMap, path: &str) -> Result<String> {
    let forwarded_path = header_str(headers, "x-forwarded-path").unwrap_or(path);

    if let Some(forwarded) = headers
        .get(header::FORWARDED)
        .and_then(|v| v.to_str().ok())
    {
        let host = FORWARDED_HOST
            .captures(forwarded)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str());
        let proto = FORWARDED_PROTO
            .captures(forwarded)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str());
        if let (Some(host), Some(proto)) = (host, proto) {
            return build_uri(host, proto, forwarded_path);
        }
    }

    let x_host = header_str(headers, "x-forwarded-host").filter(|h| !h.is_empty());
    let x_proto = header_str(headers, "x-forwarded-proto").filter(|p| !p.is_empty());
    if let (Some(host), Some(proto)) = (x_host, x_proto) {
        return build_uri(host, proto, forwarded_path);
    }

    // no forwarding source: the request's own authority, plain http
    let host = header_str(headers, "host").unwrap_or("localhost");
    Ok(format!("http://{}{}", host, path))
}

/// Assemble `<proto>://<host><path>`, appending the default port when the
/// forwarded host does not carry one. Only http and https have defaults;
/// any other proto fails the request.
fn build_uri(host: &str, proto: &str, path: &str) -> Result<String> {
    if HOST_WITH_PORT.is_match(host) {
        return Ok(format!("{}://{}{}", proto, host, path));
    }
    let port = match proto {
        "http" => 80,
        "https" => 443,
        other => {
            return Err(BridgeError::Internal(format!(
                "{} is not a valid schema/proto.",
                other
            )));
        }
    };
    Ok(format!("{}://{}:{}{}", proto, host, port, path))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
