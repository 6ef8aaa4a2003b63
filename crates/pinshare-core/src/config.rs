use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::chunking::ChunkSizing;
use crate::{Result, TransferError};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BIND: &str = "0.0.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Payload buffer size; `auto` follows the size-based policy.
    pub chunk_size: ChunkSizing,

    /// Bound on the sender's initial connect.
    pub connect_timeout_secs: u64,

    /// Emit a progress event every this many chunks.
    pub progress_every_chunks: u64,

    /// Port used when the caller gives none.
    pub port: u16,

    /// Receiver bind address used when the caller gives none.
    pub bind: String,

    /// Refuse peers and bind addresses outside the LAN.
    pub local_only: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: ChunkSizing::Auto,
            connect_timeout_secs: 10,
            progress_every_chunks: 50,
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            local_only: false,
        }
    }
}

impl TransferConfig {
    pub fn with_chunk_size(mut self, chunk_size: ChunkSizing) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_local_only(mut self, local_only: bool) -> Self {
        self.local_only = local_only;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunk_size.validate()?;
        if self.connect_timeout_secs == 0 {
            return Err(TransferError::Validation("connect timeout must be positive".into()));
        }
        if self.progress_every_chunks == 0 {
            return Err(TransferError::Validation("progress interval must be positive".into()));
        }
        validate_port(self.port)?;
        Ok(())
    }

    /// Read a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let cfg: TransferConfig = serde_json::from_str(&json).map_err(|e| {
            TransferError::Validation(format!("bad config {}: {}", path.display(), e))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TransferError::Validation(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(TransferError::Validation("port must be between 1 and 65535".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = TransferConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.port, 5000);
        assert!(cfg.chunk_size.is_auto());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut cfg = TransferConfig::default();
        cfg.port = 0;
        assert!(cfg.validate().is_err());

        let cfg = TransferConfig::default().with_chunk_size(ChunkSizing::Fixed(0));
        assert!(cfg.validate().is_err());

        let cfg = TransferConfig::default().with_chunk_size(ChunkSizing::Fixed(usize::MAX));
        assert!(cfg.validate().is_err());

        let mut cfg = TransferConfig::default();
        cfg.progress_every_chunks = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_save_and_load_partial() -> Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("nested/config.json");

        let cfg = TransferConfig::default()
            .with_chunk_size(ChunkSizing::Fixed(4096))
            .with_local_only(true);
        cfg.save(&path)?;
        assert_eq!(TransferConfig::load(&path)?, cfg);

        std::fs::write(&path, r#"{ "port": 6000 }"#)?;
        let loaded = TransferConfig::load(&path)?;
        assert_eq!(loaded.port, 6000);
        assert_eq!(loaded.connect_timeout_secs, 10);
        Ok(())
    }
}
