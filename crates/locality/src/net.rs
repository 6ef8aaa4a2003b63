use std::io::Error;

use crate::guard::classify_ip;
use crate::model::InterfaceIp;

/// Addresses assigned to this host's interfaces, sorted by interface name.
pub fn interface_addrs() -> Result<Vec<InterfaceIp>, Error> {
    let ifs = if_addrs::get_if_addrs()?;

    let mut out: Vec<InterfaceIp> = ifs
        .into_iter()
        .map(|ifa| {
            let ip = ifa.ip();
            let family = if ip.is_ipv4() { "ipv4" } else { "ipv6" };

            InterfaceIp {
                name: ifa.name,
                ip,
                family,
                is_loopback: ip.is_loopback(),
                scope: classify_ip(ip),
            }
        })
        .collect();

    out.sort_by(|a, b| (&a.name, &a.ip).cmp(&(&b.name, &b.ip)));
    out.dedup_by(|a, b| a.name == b.name && a.ip == b.ip);
    tracing::debug!("Found {} interface addresses", out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_addrs_sorted_and_unique() {
        let addrs = interface_addrs().unwrap();
        for pair in addrs.windows(2) {
            assert!((&pair[0].name, &pair[0].ip) < (&pair[1].name, &pair[1].ip));
        }
        for item in addrs.iter().filter(|i| i.is_loopback) {
            assert_eq!(item.scope, crate::Scope::Lan);
        }
    }
}
