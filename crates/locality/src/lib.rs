//! LAN locality checks for pinshare peers.
//!
//! Callers run these before connecting or binding when they want to keep a
//! transfer on the local network. Nothing here touches the transfer protocol.

pub mod guard;
pub mod model;
pub mod net;

pub use guard::{classify, ensure_local, is_local, resolve_address, LocalityError};
pub use model::{InterfaceIp, Scope};
pub use net::interface_addrs;
