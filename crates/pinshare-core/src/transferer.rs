//! The single entry point UIs and the CLI drive.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{validate_port, TransferConfig};
use crate::events::{EventSink, TracingSink};
use crate::receiver::{ReceiveRequest, Receiver};
use crate::sender::{SendRequest, Sender};
use crate::session::{ReceiveReport, SendReport};
use crate::Result;

/// Send or receive one file. Each call is an independent session; callers
/// must not run two calls on the same connection concurrently.
#[async_trait]
pub trait Transferer: Send + Sync {
    async fn send(&self, request: SendRequest) -> Result<SendReport>;
    async fn receive(&self, request: ReceiveRequest) -> Result<ReceiveReport>;
}

/// [`Transferer`] over plain TCP.
#[derive(Clone)]
pub struct TcpTransferer {
    cfg: TransferConfig,
    sink: Arc<dyn EventSink>,
}

impl TcpTransferer {
    pub fn new(cfg: TransferConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            sink: Arc::new(TracingSink),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.cfg
    }
}

#[async_trait]
impl Transferer for TcpTransferer {
    async fn send(&self, request: SendRequest) -> Result<SendReport> {
        let sender = Sender::new(self.cfg.clone())?;
        sender.send(&request, self.sink.as_ref()).await
    }

    async fn receive(&self, request: ReceiveRequest) -> Result<ReceiveReport> {
        validate_port(request.port)?;
        let receiver = Receiver::bind(self.cfg.clone(), &request.bind, request.port).await?;
        receiver
            .receive(&request.pin, &request.output_dir, self.sink.as_ref())
            .await
    }
}
