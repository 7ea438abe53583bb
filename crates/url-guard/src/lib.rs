//! SSRF guard for caller-supplied base URLs.
//!
//! A URL is accepted only when its scheme is http or https and neither
//! the literal host nor any DNS-resolved address points into private,
//! loopback, link-local, or cloud-metadata ranges. The single exception
//! is the literal hostname `localhost`, permitted over plain http for
//! local development.

#![deny(missing_docs)]

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

/// Rejection reasons for a candidate URL.
#[derive(Debug, thiserror::Error)]
pub enum UrlGuardError {
    /// The string did not parse as a URL.
    #[error("invalid url: {0}")]
    Invalid(String),
    /// Scheme other than http/https.
    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("url has no host")]
    MissingHost,
    /// `localhost` is only permitted over plain http.
    #[error("localhost is only permitted over http")]
    LocalhostOverTls,
    /// The host or one of its resolved addresses is in a blocked range.
    #[error("host resolves to a blocked address: {0}")]
    BlockedAddress(IpAddr),
    /// DNS resolution failed.
    #[error("host did not resolve: {0}")]
    Resolution(String),
}

/// Validate a base URL against the SSRF policy.
///
/// Hostnames are resolved via DNS and every resolved address must pass;
/// an attacker-controlled name pointing at 169.254.169.254 is as blocked
/// as the literal address.
pub async fn validate_url(raw: &str) -> Result<(), UrlGuardError> {
    let url = Url::parse(raw).map_err(|e| UrlGuardError::Invalid(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlGuardError::UnsupportedScheme(other.to_string())),
    }

    let host = url.host().ok_or(UrlGuardError::MissingHost)?;

    match host {
        Host::Ipv4(ip) => check_ip(IpAddr::V4(ip)),
        Host::Ipv6(ip) => check_ip(IpAddr::V6(ip)),
        Host::Domain(domain) => {
            if domain.eq_ignore_ascii_case("localhost") {
                if url.scheme() == "https" {
                    return Err(UrlGuardError::LocalhostOverTls);
                }
                return Ok(());
            }

            let port = url.port_or_known_default().unwrap_or(443);
            let addrs = tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| UrlGuardError::Resolution(e.to_string()))?;

            for addr in addrs {
                check_ip(addr.ip())?;
            }

            Ok(())
        }
    }
}

fn check_ip(ip: IpAddr) -> Result<(), UrlGuardError> {
    if is_blocked_ip(ip) {
        Err(UrlGuardError::BlockedAddress(ip))
    } else {
        Ok(())
    }
}

/// Whether an address falls in a range the gateway must never dial on a
/// caller's behalf.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => {
            // IPv4-mapped addresses smuggle v4 targets through v6 parsing.
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_blocked_v4(mapped);
            }
            is_blocked_v6(v6)
        }
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();

    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // Carrier-grade NAT 100.64.0.0/10, which covers the Alibaba
        // metadata endpoint 100.100.100.200.
        || (octets[0] == 100 && (64..128).contains(&octets[1]))
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();

    ip.is_loopback()
        || ip.is_unspecified()
        // Unique-local fc00::/7.
        || (segments[0] & 0xfe00) == 0xfc00
        // Link-local fe80::/10.
        || (segments[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_ranges() {
        let blocked = [
            "10.0.0.1",
            "10.255.255.254",
            "172.16.0.1",
            "172.31.200.9",
            "192.168.1.1",
            "127.0.0.1",
            "127.8.8.8",
            "169.254.169.254",
            "169.254.0.1",
            "100.100.100.200",
            "100.64.0.1",
            "0.0.0.0",
            "::1",
            "::",
            "fc00::1",
            "fd12:3456::1",
            "fe80::1",
            "::ffff:10.0.0.1",
            "::ffff:169.254.169.254",
        ];

        for addr in blocked {
            let ip: IpAddr = addr.parse().unwrap();
            assert!(is_blocked_ip(ip), "{addr} should be blocked");
        }
    }

    #[test]
    fn public_addresses_pass() {
        let allowed = ["1.1.1.1", "8.8.8.8", "93.184.216.34", "2606:4700::1111"];

        for addr in allowed {
            let ip: IpAddr = addr.parse().unwrap();
            assert!(!is_blocked_ip(ip), "{addr} should be allowed");
        }
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        for raw in ["ftp://example.com", "file:///etc/passwd", "gopher://example.com"] {
            assert!(matches!(
                validate_url(raw).await,
                Err(UrlGuardError::UnsupportedScheme(_))
            ));
        }
    }

    #[tokio::test]
    async fn rejects_literal_blocked_ips() {
        for raw in [
            "http://10.0.0.1/api",
            "http://169.254.169.254/latest/meta-data",
            "http://127.0.0.1:8080",
            "https://[::1]/v1",
            "http://100.100.100.200/",
        ] {
            assert!(matches!(
                validate_url(raw).await,
                Err(UrlGuardError::BlockedAddress(_))
            ));
        }
    }

    #[tokio::test]
    async fn localhost_only_over_http() {
        validate_url("http://localhost:8080/v1").await.unwrap();

        assert!(matches!(
            validate_url("https://localhost/v1").await,
            Err(UrlGuardError::LocalhostOverTls)
        ));
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        assert!(matches!(validate_url("not a url").await, Err(UrlGuardError::Invalid(_))));
    }
}
