//! SSRF-safe URL admission.
//!
//! Grounded on `examples/original_source/app/scraping/url_validator.py`: the
//! blocked-network table and hostname blocklist are carried over verbatim;
//! DNS resolution and the IPv4-mapped-IPv6 handling are reimplemented with
//! `std::net` instead of `socket.getaddrinfo`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use serde_json::{json, Value};
use tracing::warn;
use url::Url;

const BLOCKED_HOSTNAMES: &[&str] = &["metadata.google.internal", "metadata.google.com"];

const ALLOW_PRIVATE_URLS_ENV: &str = "DIG_ALLOW_PRIVATE_URLS";

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid URL scheme: only http/https are allowed")]
    InvalidScheme { url: String },
    #[error("could not resolve host: {host}")]
    UnresolvableHost { host: String },
    #[error("URL resolves to a private or reserved address")]
    PrivateAddress { host: String, resolved_ip: String },
    #[error("URL targets a blocked metadata host")]
    MetadataHost { host: String },
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidScheme { .. } => "INVALID_URL",
            Self::UnresolvableHost { .. } => "URL_NOT_FOUND",
            Self::PrivateAddress { .. } => "SSRF_BLOCKED",
            Self::MetadataHost { .. } => "SSRF_BLOCKED",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::InvalidScheme { url } => json!({ "url": url }),
            Self::UnresolvableHost { host } => json!({ "host": host }),
            Self::PrivateAddress { host, resolved_ip } => {
                json!({ "host": host, "resolved_ip": resolved_ip })
            }
            Self::MetadataHost { host } => json!({ "host": host }),
        }
    }
}

/// Returns `Ok(())` if `url` is safe to fetch, otherwise a typed reason.
///
/// Honors `DIG_ALLOW_PRIVATE_URLS=1` as a test-only bypass, matching the
/// original's single opt-out toggle.
pub fn validate_url(raw_url: &str) -> Result<(), ValidationError> {
    if std::env::var(ALLOW_PRIVATE_URLS_ENV).as_deref() == Ok("1") {
        return Ok(());
    }

    let parsed = Url::parse(raw_url).map_err(|_| ValidationError::InvalidScheme {
        url: raw_url.to_string(),
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::InvalidScheme {
            url: raw_url.to_string(),
        });
    }

    let host = parsed.host_str().ok_or_else(|| ValidationError::InvalidScheme {
        url: raw_url.to_string(),
    })?;

    let host_lower = host.to_ascii_lowercase();
    if BLOCKED_HOSTNAMES.contains(&host_lower.as_str()) {
        return Err(ValidationError::MetadataHost {
            host: host.to_string(),
        });
    }

    let port = parsed.port_or_known_default().unwrap_or(80);
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|_| ValidationError::UnresolvableHost {
            host: host.to_string(),
        })?
        .collect();

    if addrs.is_empty() {
        return Err(ValidationError::UnresolvableHost {
            host: host.to_string(),
        });
    }

    for addr in &addrs {
        if is_blocked_ip(addr.ip()) {
            warn!(
                event = "ssrf_blocked",
                host = %host,
                resolved_ip = %addr.ip(),
                "rejected URL resolving to a blocked address"
            );
            return Err(ValidationError::PrivateAddress {
                host: host.to_string(),
                resolved_ip: addr.ip().to_string(),
            });
        }
    }

    Ok(())
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_blocked_v4(mapped);
            }
            is_blocked_v6(v6)
        }
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_loopback()
        || ip.is_link_local()
        || ip.is_private()
        || octets[0] == 0
        || ip.is_unspecified()
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    ip.is_loopback()
        || (ip.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
        || (ip.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        let err = validate_url("ftp://example.com/").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_URL");
    }

    #[test]
    fn rejects_loopback_literal() {
        let err = validate_url("http://127.0.0.1/").unwrap_err();
        assert_eq!(err.error_code(), "SSRF_BLOCKED");
    }

    #[test]
    fn rejects_private_rfc1918() {
        let err = validate_url("http://10.0.0.2/").unwrap_err();
        assert_eq!(err.error_code(), "SSRF_BLOCKED");
        assert_eq!(err.details()["resolved_ip"], "10.0.0.2");
    }

    #[test]
    fn rejects_metadata_hostname() {
        let err = validate_url("http://metadata.google.internal/").unwrap_err();
        assert_eq!(err.error_code(), "SSRF_BLOCKED");
    }

    #[test]
    fn allows_private_urls_under_env_bypass() {
        std::env::set_var("DIG_ALLOW_PRIVATE_URLS", "1");
        assert!(validate_url("http://127.0.0.1/").is_ok());
        std::env::remove_var("DIG_ALLOW_PRIVATE_URLS");
    }
}
