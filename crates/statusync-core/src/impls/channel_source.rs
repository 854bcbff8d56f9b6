//! ChannelSource - mpsc チャネルで供給する ActivitySource
//!
//! push 型のイベント受信（IPC の event emitter など）をこの sender に流し込む。

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{ActivityEvent, SourceSignal};
use crate::error::StatusyncError;
use crate::ports::ActivitySource;

pub struct ChannelSource {
    rx: mpsc::Receiver<SourceSignal>,
}

/// Producer side of a `ChannelSource`.
#[derive(Clone)]
pub struct ChannelSourceSender {
    tx: mpsc::Sender<SourceSignal>,
}

/// Create a bounded source and its sender.
pub fn channel_source(capacity: usize) -> (ChannelSourceSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSourceSender { tx }, ChannelSource { rx })
}

impl ChannelSourceSender {
    pub async fn send_event(&self, event: ActivityEvent) -> Result<(), StatusyncError> {
        self.send(SourceSignal::Event(event)).await
    }

    /// The upstream channel came back after a gap.
    pub async fn reconnected(&self) -> Result<(), StatusyncError> {
        self.send(SourceSignal::Reconnected).await
    }

    async fn send(&self, signal: SourceSignal) -> Result<(), StatusyncError> {
        self.tx
            .send(signal)
            .await
            .map_err(|_| StatusyncError::SessionClosed)
    }
}

#[async_trait]
impl ActivitySource for ChannelSource {
    async fn next_signal(&mut self) -> Option<SourceSignal> {
        self.rx.recv().await
    }
}
