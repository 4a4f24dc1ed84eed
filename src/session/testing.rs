//! In-memory transport halves for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ws::{FrameSink, FrameSource};

/// Records every frame written; optionally fails after N writes.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSink {
    frames: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    fail_after: Option<usize>,
}

impl RecordingSink {
    pub(crate) fn failing_after(writes: usize) -> Self {
        Self {
            fail_after: Some(writes),
            ..Self::default()
        }
    }

    /// Frames written so far, parsed as JSON.
    pub(crate) fn frames(&self) -> Vec<serde_json::Value> {
        self.frames
            .lock()
            .expect("frames lock")
            .iter()
            .map(|text| serde_json::from_str(text).expect("frame is JSON"))
            .collect()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        let mut frames = self.frames.lock().expect("frames lock");
        if self.fail_after.is_some_and(|limit| frames.len() >= limit) {
            anyhow::bail!("connection reset by peer");
        }
        frames.push(text.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Frame source fed from a channel. `None` items (or a dropped sender)
/// end the stream; `Some("")` stands in for a control frame.
#[derive(Debug)]
pub(crate) struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Option<String>>,
}

impl ChannelSource {
    pub(crate) fn new() -> (mpsc::UnboundedSender<Option<String>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv_text(&mut self) -> Result<Option<String>> {
        Ok(self.rx.recv().await.flatten())
    }
}
