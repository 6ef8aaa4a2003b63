use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Where an address sits relative to this machine's network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Loopback, private, link-local or unspecified.
    Lan,
    /// Publicly routable.
    Wan,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Lan => f.write_str("LAN"),
            Scope::Wan => f.write_str("WAN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceIp {
    pub name: String,
    pub ip: IpAddr,
    pub family: &'static str, //ipv4 or ipv6
    pub is_loopback: bool,
    pub scope: Scope,
}
