//! PinShare Core - PIN-authenticated point-to-point file transfer
//!
//! Two peers on the same network share a short PIN out of band. The sender
//! connects straight to the receiver over TCP, both prove knowledge of the
//! PIN, and one file (or a zipped directory) is streamed and checked against
//! a SHA-256 digest before the receiver keeps it.

pub mod archive;
pub mod chunking;
pub mod config;
pub mod error;
pub mod events;
pub mod handshake;
pub mod keys;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod transferer;
pub mod wire;

// Re-export commonly used types
pub use archive::{prepare_source, PreparedSource};
pub use chunking::{optimal_chunk_size, ChunkSizing};
pub use config::TransferConfig;
pub use error::{Result, TransferError};
pub use events::{EventSink, NullSink, Phase, TracingSink, TransferEvent};
pub use handshake::Role;
pub use keys::{derive_key, SharedSecret};
pub use receiver::{ReceiveRequest, Receiver};
pub use sender::{SendRequest, Sender};
pub use session::{ReceiveReport, SendReport, TransferSession};
pub use transferer::{TcpTransferer, Transferer};
pub use wire::TransferMetadata;
