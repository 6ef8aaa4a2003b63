//! One transfer over one connection.
//!
//! Wire order after the handshake, all initiator → responder unless noted:
//! metadata, exactly `size` payload bytes, the SHA-256 of the payload, then
//! a 2-byte status from the responder.

use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use storage::OutputDir;

use crate::chunking::ChunkSizing;
use crate::config::TransferConfig;
use crate::events::{throughput_mib_s, EventSink, Phase, TransferEvent};
use crate::handshake::{self, Role};
use crate::keys::SharedSecret;
use crate::wire::{self, TransferMetadata, DIGEST_LEN};
use crate::{Result, TransferError};

/// Outcome of a verified send.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReport {
    pub name: String,
    pub bytes: u64,
    pub digest: [u8; DIGEST_LEN],
    pub chunk_size: usize,
    pub elapsed: Duration,
}

/// Outcome of a verified receive.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveReport {
    /// Where the file landed, after any `_N` suffix.
    pub path: PathBuf,
    /// Name the sender announced.
    pub name: String,
    pub bytes: u64,
    pub digest: [u8; DIGEST_LEN],
    pub chunk_size: usize,
    pub elapsed: Duration,
    pub peer: Option<SocketAddr>,
}

impl SendReport {
    pub fn throughput_mib_s(&self) -> f64 {
        throughput_mib_s(self.bytes, self.elapsed)
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

impl ReceiveReport {
    pub fn throughput_mib_s(&self) -> f64 {
        throughput_mib_s(self.bytes, self.elapsed)
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

/// Owns the connection, the derived key and the running digest for a single
/// transfer. Consumed by [`send_file`](Self::send_file) or
/// [`receive_file`](Self::receive_file); a retry needs a fresh session.
pub struct TransferSession<T> {
    transport: T,
    role: Role,
    key: SharedSecret,
    chunk_size: ChunkSizing,
    progress_every: u64,
    peer: Option<SocketAddr>,
}

impl<T> TransferSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(transport: T, role: Role, key: SharedSecret, cfg: &TransferConfig) -> Self {
        Self {
            transport,
            role,
            key,
            chunk_size: cfg.chunk_size,
            progress_every: cfg.progress_every_chunks.max(1),
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn expect_role(&self, role: Role) -> Result<()> {
        if self.role != role {
            return Err(TransferError::Validation(format!(
                "session is the {:?}, not the {:?}",
                self.role, role
            )));
        }
        Ok(())
    }

    /// Stream `path` to the peer under the announced `name`.
    pub async fn send_file(
        mut self,
        path: &Path,
        name: &str,
        sink: &dyn EventSink,
    ) -> Result<SendReport> {
        self.expect_role(Role::Initiator)?;

        let mut file = match File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();
        // checked before a single byte goes out
        let meta = TransferMetadata::new(name, size)?;

        sink.emit(TransferEvent::phase(Phase::Handshake, "proving PIN to receiver"));
        handshake::perform(self.role, &self.key, &mut self.transport).await?;

        sink.emit(TransferEvent::phase(Phase::Metadata, format!("announcing {}", meta.summary())));
        wire::write_metadata(&mut self.transport, &meta).await?;

        let chunk_size = self.chunk_size.resolve(size);
        sink.emit(TransferEvent::ChunkSize {
            bytes: chunk_size,
            total: size,
            auto: self.chunk_size.is_auto(),
        });

        sink.emit(TransferEvent::phase(Phase::Streaming, format!("sending {} bytes", size)));
        let start = Instant::now();
        let digest = self.stream_out(&mut file, size, chunk_size, sink).await?;

        sink.emit(TransferEvent::phase(Phase::Verifying, "waiting for receiver verdict"));
        wire::write_field(&mut self.transport, &digest, "sending digest").await?;
        let accepted = wire::read_status(&mut self.transport, "reading transfer status").await?;
        let elapsed = start.elapsed();

        if !accepted {
            tracing::warn!("Receiver rejected {} after digest check", meta.name);
            return Err(TransferError::Integrity(format!(
                "receiver rejected {} after verifying its digest",
                meta.name
            )));
        }

        sink.emit(TransferEvent::Completed {
            name: meta.name.clone(),
            bytes: size,
            elapsed,
        });
        Ok(SendReport {
            name: meta.name,
            bytes: size,
            digest,
            chunk_size,
            elapsed,
        })
    }

    /// Read exactly `size` bytes of `file` onto the wire, hashing as we go.
    async fn stream_out(
        &mut self,
        file: &mut File,
        size: u64,
        chunk_size: usize,
        sink: &dyn EventSink,
    ) -> Result<[u8; DIGEST_LEN]> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; buffer_len(chunk_size, size)];
        let mut source = file.take(size);
        let mut sent: u64 = 0;
        let mut chunks: u64 = 0;

        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            self.transport
                .write_all(&buf[..n])
                .await
                .map_err(|e| TransferError::from_io(e, "sending payload"))?;
            sent += n as u64;
            chunks += 1;

            if chunks % self.progress_every == 0 {
                sink.emit(TransferEvent::Progress { bytes: sent, total: size });
            }
        }
        self.transport
            .flush()
            .await
            .map_err(|e| TransferError::from_io(e, "sending payload"))?;

        if sent != size {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("source shrank during transfer: {} of {} bytes read", sent, size),
            )));
        }
        sink.emit(TransferEvent::Progress { bytes: sent, total: size });
        Ok(finish(hasher))
    }

    /// Accept one file into `out`. The file is kept only after its digest
    /// matched and `OK` went back to the sender.
    pub async fn receive_file(
        mut self,
        out: &OutputDir,
        sink: &dyn EventSink,
    ) -> Result<ReceiveReport> {
        self.expect_role(Role::Responder)?;

        sink.emit(TransferEvent::phase(Phase::Handshake, "checking sender's PIN"));
        handshake::perform(self.role, &self.key, &mut self.transport).await?;

        let meta = wire::read_metadata(&mut self.transport).await?;
        sink.emit(TransferEvent::phase(Phase::Metadata, format!("incoming {}", meta.summary())));

        let chunk_size = self.chunk_size.resolve(meta.size);
        sink.emit(TransferEvent::ChunkSize {
            bytes: chunk_size,
            total: meta.size,
            auto: self.chunk_size.is_auto(),
        });

        // removes the file on every exit short of a verified digest,
        // including the future being dropped mid-payload
        let (pending, file) = out.create_unique(&meta.name).await?;
        tracing::info!("Receiving {} -> {}", meta.name, pending.path().display());
        sink.emit(TransferEvent::phase(
            Phase::Streaming,
            format!("writing {} ({} bytes expected)", pending.path().display(), meta.size),
        ));

        let start = Instant::now();
        let digest = match self.stream_in(file, &meta, chunk_size, sink).await {
            Ok(digest) => digest,
            Err(e) => {
                let path = pending.path().to_path_buf();
                if let Err(cleanup) = pending.discard().await {
                    tracing::warn!("Could not remove {}: {}", path.display(), cleanup);
                }
                return Err(e);
            }
        };
        let path = pending.keep();
        let elapsed = start.elapsed();

        sink.emit(TransferEvent::Completed {
            name: meta.name.clone(),
            bytes: meta.size,
            elapsed,
        });

        Ok(ReceiveReport {
            path,
            name: meta.name,
            bytes: meta.size,
            digest,
            chunk_size,
            elapsed,
            peer: self.peer,
        })
    }

    /// Payload, trailer and verdict. Returns the verified digest.
    async fn stream_in(
        &mut self,
        mut file: File,
        meta: &TransferMetadata,
        chunk_size: usize,
        sink: &dyn EventSink,
    ) -> Result<[u8; DIGEST_LEN]> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; buffer_len(chunk_size, meta.size)];
        let mut remaining = meta.size;
        let mut chunks: u64 = 0;

        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = self
                .transport
                .read(&mut buf[..want])
                .await
                .map_err(|e| TransferError::from_io(e, "receiving payload"))?;
            if n == 0 {
                return Err(TransferError::ConnectionFault(format!(
                    "receiving payload ({} of {} bytes missing)",
                    remaining, meta.size
                )));
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            remaining -= n as u64;
            chunks += 1;

            if chunks % self.progress_every == 0 {
                sink.emit(TransferEvent::Progress {
                    bytes: meta.size - remaining,
                    total: meta.size,
                });
            }
        }
        file.flush().await?;
        drop(file);
        sink.emit(TransferEvent::Progress { bytes: meta.size, total: meta.size });

        sink.emit(TransferEvent::phase(Phase::Verifying, "comparing digests"));
        let expected: [u8; DIGEST_LEN] = wire::read_field(&mut self.transport, "reading digest").await?;
        let actual = finish(hasher);

        if !bool::from(actual.ct_eq(&expected)) {
            tracing::warn!(
                "Digest mismatch for {}: expected {} got {}",
                meta.name,
                hex::encode(expected),
                hex::encode(actual)
            );
            if let Err(e) = wire::write_status(&mut self.transport, false, "sending transfer status").await {
                tracing::debug!("Could not tell sender about the mismatch: {}", e);
            }
            return Err(TransferError::Integrity(format!(
                "digest mismatch for {}; received file removed",
                meta.name
            )));
        }

        wire::write_status(&mut self.transport, true, "sending transfer status").await?;
        Ok(actual)
    }
}

/// Never allocate more than the payload needs; at least one byte.
fn buffer_len(chunk_size: usize, total: u64) -> usize {
    let total = usize::try_from(total).unwrap_or(usize::MAX);
    chunk_size.min(total).max(1)
}

fn finish(hasher: Sha256) -> [u8; DIGEST_LEN] {
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&hasher.finalize());
    digest
}
