//! Upstream URL validation
//!
//! Both upstreams (the LLM base URL and the search endpoint) come from
//! configuration; validating them at startup prevents the proxy from being
//! pointed at loopback, private ranges, or cloud metadata services.

use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// URL validation errors
#[derive(Debug, Error)]
pub enum UpstreamUrlError {
    #[error("invalid url: {0}")]
    Invalid(#[from] url::ParseError),

    #[error("scheme '{0}' is not allowed; only https is permitted")]
    Scheme(String),

    #[error("host '{0}' is blocked")]
    BlockedHost(String),

    #[error("url must have a host")]
    MissingHost,
}

/// Hostnames never accepted as upstreams
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "metadata.google.internal",
    "metadata.goog",
];

/// Validate one configured upstream URL. `development` relaxes the rules to
/// allow http and loopback/private hosts for local stacks.
pub fn validate_upstream_url(url_str: &str, development: bool) -> Result<Url, UpstreamUrlError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "https" => {}
        "http" if development => {}
        scheme => return Err(UpstreamUrlError::Scheme(scheme.to_string())),
    }

    let host = url.host_str().ok_or(UpstreamUrlError::MissingHost)?;
    let host_lower = host.to_lowercase();

    if !development {
        for blocked in BLOCKED_HOSTNAMES {
            if host_lower == *blocked || host_lower.ends_with(&format!(".{blocked}")) {
                return Err(UpstreamUrlError::BlockedHost(host.to_string()));
            }
        }
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        // metadata endpoints live in link-local space; never allowed
        if is_link_local(&ip) {
            return Err(UpstreamUrlError::BlockedHost(host.to_string()));
        }
        if !development && (ip.is_loopback() || is_private(&ip)) {
            return Err(UpstreamUrlError::BlockedHost(host.to_string()));
        }
    }

    Ok(url)
}

fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                // 100.64.0.0/10 carrier-grade NAT
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 0.0.0.0/8 current network
                || v4.octets()[0] == 0
        }
        // fc00::/7 unique local
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        // 169.254.0.0/16, including the cloud metadata endpoint
        IpAddr::V4(v4) => v4.octets()[0] == 169 && v4.octets()[1] == 254,
        // fe80::/10
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}
