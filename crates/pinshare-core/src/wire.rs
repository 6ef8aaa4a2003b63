//! Fixed-size fields and the metadata frame.
//!
//! Every integer on the wire is big-endian. Reads of a fixed-length field
//! block until the whole field arrives; a close part-way through is a
//! [`TransferError::ConnectionFault`].

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Result, TransferError};

/// Protocol tag mixed into the handshake MAC. Never sent on its own.
pub const MAGIC: &[u8; 4] = b"P2P1";
pub const NONCE_LEN: usize = 16;
pub const TOKEN_LEN: usize = 32;
pub const DIGEST_LEN: usize = 32;
pub const STATUS_LEN: usize = 2;

pub const STATUS_OK: &[u8; STATUS_LEN] = b"OK";
pub const STATUS_NO: &[u8; STATUS_LEN] = b"NO";

/// Longest file name the 2-byte length prefix can carry.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Name and exact payload size, sent once by the sender before any payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMetadata {
    pub name: String,
    pub size: u64,
}

impl TransferMetadata {
    pub fn new(name: impl Into<String>, size: u64) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self { name, size })
    }

    /// `name_len[2] ‖ name ‖ size[8]`
    pub fn encode(&self) -> Result<Vec<u8>> {
        let name = self.name.as_bytes();
        let name_len = u16::try_from(name.len()).map_err(|_| name_too_long(name.len()))?;

        let mut frame = Vec::with_capacity(2 + name.len() + 8);
        frame.extend_from_slice(&name_len.to_be_bytes());
        frame.extend_from_slice(name);
        frame.extend_from_slice(&self.size.to_be_bytes());
        Ok(frame)
    }

    pub fn summary(&self) -> String {
        format!("{} ({} bytes)", self.name, self.size)
    }
}

/// Reject names whose UTF-8 form does not fit the length prefix.
pub fn check_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(name_too_long(name.len()));
    }
    Ok(())
}

fn name_too_long(len: usize) -> TransferError {
    TransferError::Validation(format!(
        "file name is {} bytes; the limit is {}",
        len, MAX_NAME_LEN
    ))
}

pub async fn write_metadata<T>(transport: &mut T, meta: &TransferMetadata) -> Result<()>
where
    T: AsyncWrite + Unpin + Send,
{
    let frame = meta.encode()?;
    write_field(transport, &frame, "sending metadata").await
}

pub async fn read_metadata<T>(transport: &mut T) -> Result<TransferMetadata>
where
    T: AsyncRead + Unpin + Send,
{
    let len_bytes: [u8; 2] = read_field(transport, "reading name length").await?;
    let name_len = u16::from_be_bytes(len_bytes) as usize;

    let mut name = vec![0u8; name_len];
    transport
        .read_exact(&mut name)
        .await
        .map_err(|e| TransferError::from_io(e, "reading file name"))?;

    let size_bytes: [u8; 8] = read_field(transport, "reading payload size").await?;

    Ok(TransferMetadata {
        name: String::from_utf8_lossy(&name).into_owned(),
        size: u64::from_be_bytes(size_bytes),
    })
}

/// Read exactly `N` bytes.
pub async fn read_field<T, const N: usize>(transport: &mut T, what: &str) -> Result<[u8; N]>
where
    T: AsyncRead + Unpin + Send,
{
    let mut buf = [0u8; N];
    transport
        .read_exact(&mut buf)
        .await
        .map_err(|e| TransferError::from_io(e, what))?;
    Ok(buf)
}

/// Write all of `data` and flush.
pub async fn write_field<T>(transport: &mut T, data: &[u8], what: &str) -> Result<()>
where
    T: AsyncWrite + Unpin + Send,
{
    transport
        .write_all(data)
        .await
        .map_err(|e| TransferError::from_io(e, what))?;
    transport
        .flush()
        .await
        .map_err(|e| TransferError::from_io(e, what))?;
    Ok(())
}

pub async fn write_status<T>(transport: &mut T, ok: bool, what: &str) -> Result<()>
where
    T: AsyncWrite + Unpin + Send,
{
    let status = if ok { STATUS_OK } else { STATUS_NO };
    write_field(transport, status, what).await
}

/// True only for `"OK"`; any other two bytes count as a refusal.
pub async fn read_status<T>(transport: &mut T, what: &str) -> Result<bool>
where
    T: AsyncRead + Unpin + Send,
{
    let status: [u8; STATUS_LEN] = read_field(transport, what).await?;
    Ok(&status == STATUS_OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_layout() {
        let meta = TransferMetadata::new("a.txt", 0x0102_0304_0506_0708).unwrap();
        let frame = meta.encode().unwrap();
        assert_eq!(&frame[..2], &[0, 5]);
        assert_eq!(&frame[2..7], b"a.txt");
        assert_eq!(&frame[7..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_name_limit() {
        assert!(TransferMetadata::new("n".repeat(MAX_NAME_LEN), 1).is_ok());
        let err = TransferMetadata::new("n".repeat(MAX_NAME_LEN + 1), 1).unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
        // multi-byte characters count by encoded length
        assert!(check_name(&"é".repeat(MAX_NAME_LEN / 2 + 1)).is_err());
    }

    #[tokio::test]
    async fn test_metadata_over_duplex() -> Result<()> {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let meta = TransferMetadata::new("résumé.pdf", 42)?;
        write_metadata(&mut a, &meta).await?;
        assert_eq!(read_metadata(&mut b).await?, meta);
        Ok(())
    }

    #[tokio::test]
    async fn test_truncated_field_is_connection_fault() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0, 10, b'x']).await.unwrap();
        drop(a);
        let err = read_metadata(&mut b).await.unwrap_err();
        assert!(matches!(err, TransferError::ConnectionFault(_)));
    }

    #[tokio::test]
    async fn test_status_markers() -> Result<()> {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_status(&mut a, true, "status").await?;
        write_status(&mut a, false, "status").await?;
        a.write_all(b"ok").await.unwrap();
        assert!(read_status(&mut b, "status").await?);
        assert!(!read_status(&mut b, "status").await?);
        assert!(!read_status(&mut b, "status").await?);
        Ok(())
    }
}
