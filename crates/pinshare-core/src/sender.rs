use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::archive;
use crate::config::{validate_port, TransferConfig};
use crate::events::{EventSink, Phase, TransferEvent};
use crate::handshake::Role;
use crate::keys::derive_key_blocking;
use crate::session::{SendReport, TransferSession};
use crate::wire;
use crate::{Result, TransferError};

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub host: String,
    pub port: u16,
    pub pin: String,
    /// File or directory; directories are sent as one zip archive.
    pub path: PathBuf,
}

/// Connecting side of a transfer.
#[derive(Debug, Clone)]
pub struct Sender {
    cfg: TransferConfig,
}

impl Sender {
    pub fn new(cfg: TransferConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub async fn send(&self, req: &SendRequest, sink: &dyn EventSink) -> Result<SendReport> {
        validate_port(req.port)?;
        let vetted: Option<IpAddr> = if self.cfg.local_only {
            let ip = locality::ensure_local(&req.host).await?;
            tracing::debug!("{} resolved to local address {}", req.host, ip);
            Some(ip)
        } else {
            None
        };

        // Dropping `source` removes any scratch archive, on every path out.
        let source = archive::prepare_source(&req.path).await?;
        if source.is_archive() {
            sink.emit(TransferEvent::phase(
                Phase::Archiving,
                format!("{} archived as {} ({} bytes)", req.path.display(), source.name(), source.size()),
            ));
        }
        wire::check_name(source.name())?;

        let key = derive_key_blocking(&req.pin).await?;

        sink.emit(TransferEvent::phase(
            Phase::Connecting,
            format!("connecting to {}:{}", req.host, req.port),
        ));
        // a second lookup could land on a different, non-local address
        let stream = match vetted {
            Some(ip) => connect_addr(SocketAddr::new(ip, req.port), self.cfg.connect_timeout()).await?,
            None => connect(&req.host, req.port, self.cfg.connect_timeout()).await?,
        };
        let peer = stream.peer_addr()?;
        tracing::info!("Sending {} ({} bytes) to {}", source.name(), source.size(), peer);
        sink.emit(TransferEvent::Connected { peer });

        TransferSession::new(stream, Role::Initiator, key, &self.cfg)
            .with_peer(peer)
            .send_file(source.path(), source.name(), sink)
            .await
    }
}

/// TCP connect bounded by `timeout`, with Nagle disabled.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    let target = format!("{}:{}", host, port);
    connect_with_timeout(TcpStream::connect((host, port)), &target, timeout).await
}

/// Like [`connect`], but to an already resolved address.
pub async fn connect_addr(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    connect_with_timeout(TcpStream::connect(addr), &addr.to_string(), timeout).await
}

async fn connect_with_timeout<F>(connecting: F, target: &str, timeout: Duration) -> Result<TcpStream>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    let stream = match tokio::time::timeout(timeout, connecting).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(TransferError::Io(e)),
        Err(_) => {
            return Err(TransferError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting to {} timed out after {:?}", target, timeout),
            )))
        }
    };
    stream.set_nodelay(true)?;
    Ok(stream)
}
