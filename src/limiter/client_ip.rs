//! Client identity for rate limiting
//!
//! The identity is the caller's IP address in canonical IPv6 form, so an IPv4
//! client and its IPv4-mapped IPv6 spelling share one bucket. Behind a proxy
//! the `X-Real-IP` and then `X-Forwarded-For` headers win over the peer
//! address. Failing to find any address is an error, never a shared
//! "unknown" bucket.

use hyper::HeaderMap;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use crate::types::{GatehouseError, Result};

/// Convert IP address to canonical IPv6 form
pub fn to_canonical_ip(ip: IpAddr) -> Ipv6Addr {
    match ip {
        IpAddr::V4(ip) => ip.to_ipv6_mapped(),
        IpAddr::V6(ip) => ip,
    }
}

fn header_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
    {
        return Some(ip);
    }

    // Left-most entry is the originating client
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
}

/// Stable per-caller identity string for the limiter
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> Result<String> {
    let proxied = if trust_proxy_headers {
        header_ip(headers)
    } else {
        None
    };

    proxied
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| to_canonical_ip(ip).to_string())
        .ok_or_else(|| GatehouseError::Internal("unable to determine client address".into()))
}
