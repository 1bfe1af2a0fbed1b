//! SSRF guard for outbound fetch targets.
//!
//! Rejects targets that would point the crawler at the local machine or a
//! private network:
//! - non-http(s) schemes
//! - `localhost` and `*.localhost`
//! - IPv4 literals in loopback, unspecified, RFC 1918 or link-local ranges
//! - IPv6 loopback/unspecified literals (and IPv4-mapped forms of the above)
//!
//! DNS names are not resolved, so a public name that resolves to a private
//! address passes this guard.

use reqwest::Url;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Why a target was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsrfViolation {
    /// Scheme other than http/https.
    Scheme(String),
    /// URL without a host.
    MissingHost,
    /// `localhost` or a subdomain of it.
    Localhost(String),
    /// Literal address in a blocked range.
    BlockedAddress { ip: IpAddr, range: &'static str },
}

impl fmt::Display for SsrfViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsrfViolation::Scheme(scheme) => {
                write!(f, "[SSRF] Scheme '{}' is not allowed (http/https only)", scheme)
            }
            SsrfViolation::MissingHost => write!(f, "[SSRF] URL has no host"),
            SsrfViolation::Localhost(host) => {
                write!(f, "[SSRF] Host '{}' refers to the local machine", host)
            }
            SsrfViolation::BlockedAddress { ip, range } => {
                write!(f, "[SSRF] Address {} is in blocked range {}", ip, range)
            }
        }
    }
}

/// Blocked IPv4 ranges as (network, prefix length, label).
const BLOCKED_V4_RANGES: [([u8; 4], u8, &str); 6] = [
    ([0, 0, 0, 0], 32, "0.0.0.0/32 (unspecified)"),
    ([127, 0, 0, 0], 8, "127.0.0.0/8 (loopback)"),
    ([10, 0, 0, 0], 8, "10.0.0.0/8 (private)"),
    ([172, 16, 0, 0], 12, "172.16.0.0/12 (private)"),
    ([192, 168, 0, 0], 16, "192.168.0.0/16 (private)"),
    ([169, 254, 0, 0], 16, "169.254.0.0/16 (link-local)"),
];

fn in_range(ip: &Ipv4Addr, network: [u8; 4], prefix: u8) -> bool {
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    };
    (u32::from(*ip) & mask) == (u32::from(Ipv4Addr::from(network)) & mask)
}

/// The blocked range containing `ip`, if any.
pub fn blocked_v4_range(ip: &Ipv4Addr) -> Option<&'static str> {
    BLOCKED_V4_RANGES
        .iter()
        .find(|(network, prefix, _)| in_range(ip, *network, *prefix))
        .map(|(_, _, label)| *label)
}

fn blocked_v6_range(ip: &Ipv6Addr) -> Option<&'static str> {
    if ip.is_loopback() {
        return Some("::1/128 (loopback)");
    }
    if ip.is_unspecified() {
        return Some("::/128 (unspecified)");
    }
    ip.to_ipv4_mapped().as_ref().and_then(blocked_v4_range)
}

/// Check a parsed target URL. `Ok(())` means the guard has no objection.
pub fn check_target(url: &Url) -> Result<(), SsrfViolation> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(SsrfViolation::Scheme(other.to_string())),
    }

    let host = url.host_str().ok_or(SsrfViolation::MissingHost)?;
    let bare = host.trim_start_matches('[').trim_end_matches(']');

    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => match blocked_v4_range(&ip) {
            Some(range) => Err(SsrfViolation::BlockedAddress {
                ip: IpAddr::V4(ip),
                range,
            }),
            None => Ok(()),
        },
        Ok(IpAddr::V6(ip)) => match blocked_v6_range(&ip) {
            Some(range) => Err(SsrfViolation::BlockedAddress {
                ip: IpAddr::V6(ip),
                range,
            }),
            None => Ok(()),
        },
        Err(_) => {
            let domain = bare.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                Err(SsrfViolation::Localhost(domain))
            } else {
                Ok(())
            }
        }
    }
}
