//! Progress reporting.
//!
//! Sessions never print. They hand [`TransferEvent`]s to whatever
//! [`EventSink`] the caller supplied; a UI can render them, the CLI logs them.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::chunking::MIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Archiving,
    Connecting,
    Listening,
    Handshake,
    Metadata,
    Streaming,
    Verifying,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Archiving => "archiving",
            Phase::Connecting => "connecting",
            Phase::Listening => "listening",
            Phase::Handshake => "handshake",
            Phase::Metadata => "metadata",
            Phase::Streaming => "streaming",
            Phase::Verifying => "verifying",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// A new phase began.
    Phase { phase: Phase, message: String },
    /// The receiver is bound and waiting for its single peer.
    Listening { addr: SocketAddr },
    /// The TCP connection is up.
    Connected { peer: SocketAddr },
    /// Buffer size picked for the payload.
    ChunkSize { bytes: usize, total: u64, auto: bool },
    /// Cumulative payload bytes moved so far.
    Progress { bytes: u64, total: u64 },
    /// Digest matched on both ends.
    Completed { name: String, bytes: u64, elapsed: Duration },
}

impl TransferEvent {
    pub(crate) fn phase(phase: Phase, message: impl Into<String>) -> Self {
        TransferEvent::Phase {
            phase,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferEvent::Phase { phase, message } => write!(f, "[{}] {}", phase, message),
            TransferEvent::Listening { addr } => write!(f, "Listening on {}", addr),
            TransferEvent::Connected { peer } => write!(f, "Connected to {}", peer),
            TransferEvent::ChunkSize { bytes, total, auto } => {
                let how = if *auto { "auto" } else { "fixed" };
                write!(f, "Chunk size {} bytes ({}, payload {} bytes)", bytes, how, total)
            }
            TransferEvent::Progress { bytes, total } => write!(f, "{}/{} bytes", bytes, total),
            TransferEvent::Completed { name, bytes, elapsed } => write!(
                f,
                "{} verified: {} bytes in {:.2}s ({:.2} MiB/s)",
                name,
                bytes,
                elapsed.as_secs_f64(),
                throughput_mib_s(*bytes, *elapsed)
            ),
        }
    }
}

/// Average rate in MiB/s; zero when no time elapsed.
pub fn throughput_mib_s(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / secs / MIB as f64
    } else {
        0.0
    }
}

/// Receives events from a running transfer. Called on the session's task,
/// so implementations should return quickly.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TransferEvent);
}

impl<F> EventSink for F
where
    F: Fn(TransferEvent) + Send + Sync,
{
    fn emit(&self, event: TransferEvent) {
        self(event)
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: TransferEvent) {
        match &event {
            TransferEvent::Progress { .. } | TransferEvent::ChunkSize { .. } => {
                tracing::debug!("{}", event)
            }
            _ => tracing::info!("{}", event),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: TransferEvent) {}
}
