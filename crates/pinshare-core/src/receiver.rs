use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::{TcpListener, TcpSocket};

use locality::Scope;
use storage::OutputDir;

use crate::config::TransferConfig;
use crate::events::{EventSink, Phase, TransferEvent};
use crate::handshake::Role;
use crate::keys::derive_key_blocking;
use crate::session::{ReceiveReport, TransferSession};
use crate::Result;

#[derive(Debug, Clone)]
pub struct ReceiveRequest {
    pub bind: String,
    pub port: u16,
    pub pin: String,
    /// Created if missing.
    pub output_dir: PathBuf,
}

/// Listening side of a transfer. Accepts exactly one connection.
#[derive(Debug)]
pub struct Receiver {
    listener: TcpListener,
    cfg: TransferConfig,
}

impl Receiver {
    /// Bind `bind:port`; port 0 picks a free one (see [`local_addr`](Self::local_addr)).
    pub async fn bind(cfg: TransferConfig, bind: &str, port: u16) -> Result<Self> {
        cfg.validate()?;
        let ip = if cfg.local_only {
            locality::ensure_local(bind).await?
        } else {
            locality::resolve_address(bind).await?
        };
        let addr = SocketAddr::new(ip, port);

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1)?;
        tracing::info!("Bound receiver on {}", listener.local_addr()?);

        Ok(Self { listener, cfg })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the sender, then run the whole session into `output_dir`.
    pub async fn receive(
        self,
        pin: &str,
        output_dir: &Path,
        sink: &dyn EventSink,
    ) -> Result<ReceiveReport> {
        let Receiver { listener, cfg } = self;

        let out = OutputDir::create(output_dir).await?;
        let key = derive_key_blocking(pin).await?;

        let addr = listener.local_addr()?;
        log_reachable_addrs(addr);
        sink.emit(TransferEvent::Listening { addr });
        sink.emit(TransferEvent::phase(
            Phase::Listening,
            format!("waiting for sender; files go to {}", out.path().display()),
        ));

        let (stream, peer) = listener.accept().await?;
        // one peer per session
        drop(listener);
        stream.set_nodelay(true)?;
        tracing::info!("Accepted connection from {}", peer);
        sink.emit(TransferEvent::Connected { peer });

        TransferSession::new(stream, Role::Responder, key, &cfg)
            .with_peer(peer)
            .receive_file(&out, sink)
            .await
    }
}

/// For a wildcard bind, list the concrete LAN addresses a sender can use.
fn log_reachable_addrs(addr: SocketAddr) {
    if !addr.ip().is_unspecified() {
        return;
    }
    match locality::interface_addrs() {
        Ok(ips) => {
            for item in ips
                .iter()
                .filter(|i| !i.is_loopback && i.scope == Scope::Lan && i.ip.is_ipv4() == addr.is_ipv4())
            {
                tracing::info!("  reachable at {}:{} ({})", item.ip, addr.port(), item.name);
            }
        }
        Err(e) => tracing::debug!("Could not list interfaces: {}", e),
    }
}
