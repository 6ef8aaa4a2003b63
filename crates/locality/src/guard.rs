//! Address resolution and the LAN-only guard.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

use crate::model::Scope;

#[derive(Error, Debug)]
pub enum LocalityError {
    #[error("could not resolve address {host}: {reason}")]
    Unresolvable { host: String, reason: String },
    #[error("{host} ({ip}) is not a local address; use a private IP or localhost")]
    NotLocal { host: String, ip: IpAddr },
}

/// Parse `host` as a literal IP, falling back to a name lookup.
///
/// When a name resolves to several addresses the first IPv4 one wins, then
/// the first of any family.
pub async fn resolve_address(host: &str) -> Result<IpAddr, LocalityError> {
    let trimmed = host.trim().trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(ip);
    }
    if trimmed.is_empty() {
        return Err(LocalityError::Unresolvable {
            host: host.to_string(),
            reason: "empty host".into(),
        });
    }

    let resolved: Vec<IpAddr> = tokio::net::lookup_host((trimmed, 0))
        .await
        .map_err(|e| LocalityError::Unresolvable {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .map(|sa| sa.ip())
        .collect();

    let ip = resolved
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| resolved.first())
        .copied()
        .ok_or_else(|| LocalityError::Unresolvable {
            host: host.to_string(),
            reason: "no addresses returned".into(),
        })?;

    tracing::debug!("Resolved {} -> {}", host, ip);
    Ok(ip)
}

/// True for loopback, private, link-local and unspecified addresses.
pub fn is_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_local_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_v4(v4),
            None => is_local_v6(v6),
        },
    }
}

fn is_local_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_local_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    ip.is_loopback() || ip.is_unspecified() || unique_local || link_local
}

pub(crate) fn classify_ip(ip: IpAddr) -> Scope {
    if is_local(ip) {
        Scope::Lan
    } else {
        Scope::Wan
    }
}

/// Resolve `host` and report whether it is on the LAN.
pub async fn classify(host: &str) -> Result<(IpAddr, Scope), LocalityError> {
    let ip = resolve_address(host).await?;
    Ok((ip, classify_ip(ip)))
}

/// Resolve `host` and fail unless it is a local address.
pub async fn ensure_local(host: &str) -> Result<IpAddr, LocalityError> {
    let ip = resolve_address(host).await?;
    if !is_local(ip) {
        tracing::warn!("Rejecting non-local address {} ({})", host, ip);
        return Err(LocalityError::NotLocal {
            host: host.to_string(),
            ip,
        });
    }
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_local_accepts_lan_addresses() {
        for host in ["127.0.0.1", "192.168.1.5", "10.0.0.7", "172.16.4.2", "0.0.0.0", "::1"] {
            assert!(ensure_local(host).await.is_ok(), "{host} should be local");
        }
    }

    #[tokio::test]
    async fn test_ensure_local_rejects_public_address() {
        let err = ensure_local("8.8.8.8").await.unwrap_err();
        assert!(matches!(err, LocalityError::NotLocal { .. }));
        assert!(ensure_local("2001:4860:4860::8888").await.is_err());
    }

    #[tokio::test]
    async fn test_localhost_name_resolves() {
        let ip = resolve_address("localhost").await.unwrap();
        assert!(ip.is_loopback());
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let err = resolve_address("no-such-host.invalid").await.unwrap_err();
        assert!(matches!(err, LocalityError::Unresolvable { .. }));
        assert!(resolve_address("  ").await.is_err());
    }

    #[test]
    fn test_is_local_v6_ranges() {
        assert!(is_local("fd12:3456::1".parse().unwrap()));
        assert!(is_local("fe80::1".parse().unwrap()));
        assert!(is_local("::ffff:192.168.0.9".parse().unwrap()));
        assert!(!is_local("::ffff:8.8.4.4".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_classify() {
        let (_, scope) = classify("192.168.10.20").await.unwrap();
        assert_eq!(scope, Scope::Lan);
        let (_, scope) = classify("1.1.1.1").await.unwrap();
        assert_eq!(scope, Scope::Wan);
    }
}
