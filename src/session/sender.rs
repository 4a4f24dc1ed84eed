//! Keepalive & sender context.
//!
//! The only code that writes to the transport. Runs a fixed-period loop:
//!
//! ```text
//!   repeat forever:
//!     repeat ticks_per_period times:
//!       sleep(poll_interval)
//!       drain bridge → stamp each request with the next id → write
//!     write {"id": next, "type": "ping"}
//! ```
//!
//! The sequence counter lives here and nowhere else, so ids are strictly
//! increasing and never reused. Requests are written in the order they were
//! drained from the bridge, which is the order the application queued them.
//!
//! A failed write ends the context with [`SessionError::Transport`]; the
//! session controller observes the exit and fails its next `receive`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::bridge::{BridgePoll, BridgeReader};
use crate::error::{Result, SessionError};
use crate::event::{OutboundFrame, OutboundRequest};
use crate::ws::FrameSink;

/// Record carried over the bridge from the controller to this context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub(crate) enum BridgeRecord {
    /// Forward a request to the transport.
    Send {
        /// The request, still without an id.
        request: OutboundRequest,
    },
    /// Readiness check written right after the fork. Never forwarded.
    Probe {
        /// Who wrote the probe.
        origin: String,
    },
    /// Flush what is queued, close the stream, exit.
    Shutdown,
}

/// Why the sender context stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderExit {
    /// A shutdown record was drained.
    Shutdown,
    /// The controller dropped its end of the bridge.
    BridgeClosed,
}

/// Monotonic outbound sequence counter.
#[derive(Debug)]
pub(crate) struct SequenceCounter {
    next: u64,
}

impl SequenceCounter {
    pub(crate) fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Take the next id.
    pub(crate) fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Poll cadence within one keepalive period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveSchedule {
    /// Wait between bridge polls.
    pub poll_interval: Duration,
    /// Polls per keepalive period; a ping follows the last one.
    pub ticks_per_period: u32,
}

impl KeepaliveSchedule {
    /// Split `keepalive` into whole `poll` ticks (at least one).
    #[must_use]
    pub fn new(keepalive: Duration, poll: Duration) -> Self {
        let poll_ms = poll.as_millis().max(1);
        let ticks = (keepalive.as_millis() / poll_ms).clamp(1, u128::from(u32::MAX));
        Self {
            poll_interval: poll,
            ticks_per_period: ticks as u32,
        }
    }

    /// Effective keepalive period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.poll_interval * self.ticks_per_period
    }
}

/// The sender context. Owns the transport write half.
pub(crate) struct Sender<S, R> {
    sink: S,
    bridge: BridgeReader<R>,
    sequence: SequenceCounter,
    schedule: KeepaliveSchedule,
}

impl<S, R> std::fmt::Debug for Sender<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("next_id", &self.sequence.next)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl<S, R> Sender<S, R>
where
    S: FrameSink,
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(
        sink: S,
        bridge: BridgeReader<R>,
        sequence: SequenceCounter,
        schedule: KeepaliveSchedule,
    ) -> Self {
        Self {
            sink,
            bridge,
            sequence,
            schedule,
        }
    }

    /// Run until shutdown, bridge close, or a fatal write failure.
    pub(crate) async fn run(mut self) -> Result<SenderExit> {
        log::info!(
            "Sender context started (poll every {:?}, ping every {:?})",
            self.schedule.poll_interval,
            self.schedule.period()
        );

        let exit = match self.schedule_loop().await {
            Ok(exit) => exit,
            Err(e) => {
                log::error!("Sender context exiting: {e}");
                return Err(e);
            }
        };

        log::info!("Sender context stopping ({exit:?}); closing stream");
        if let Err(e) = self.sink.close().await {
            log::debug!("Stream close failed: {e:#}");
        }
        Ok(exit)
    }

    async fn schedule_loop(&mut self) -> Result<SenderExit> {
        loop {
            for _ in 0..self.schedule.ticks_per_period {
                tokio::time::sleep(self.schedule.poll_interval).await;
                if let Some(exit) = self.drain().await? {
                    return Ok(exit);
                }
            }
            let ping = OutboundFrame::Ping {
                id: self.sequence.next_id(),
            };
            self.write(&ping).await?;
        }
    }

    /// Forward everything currently queued, in arrival order.
    async fn drain(&mut self) -> Result<Option<SenderExit>> {
        loop {
            match self.bridge.try_receive_one() {
                Ok(BridgePoll::Empty) => return Ok(None),
                Ok(BridgePoll::Closed) => return Ok(Some(SenderExit::BridgeClosed)),
                Ok(BridgePoll::Record(record)) => {
                    if let Some(exit) = self.handle_record(&record).await? {
                        return Ok(Some(exit));
                    }
                }
                Err(e) => log::warn!("Dropping bridge record: {e}"),
            }
        }
    }

    async fn handle_record(&mut self, record: &str) -> Result<Option<SenderExit>> {
        match serde_json::from_str::<BridgeRecord>(record) {
            Ok(BridgeRecord::Send { request }) => {
                let frame = request.stamp(self.sequence.next_id());
                self.write(&frame).await?;
                Ok(None)
            }
            Ok(BridgeRecord::Probe { origin }) => {
                log::info!("Bridge probe from {origin} received. IPC ready.");
                Ok(None)
            }
            Ok(BridgeRecord::Shutdown) => Ok(Some(SenderExit::Shutdown)),
            Err(e) => {
                log::warn!("Dropping undecodable bridge record ({e}): {record}");
                Ok(None)
            }
        }
    }

    async fn write(&mut self, frame: &OutboundFrame) -> Result<()> {
        let text = frame
            .to_json()
            .map_err(|e| SessionError::Transport(format!("failed to encode frame: {e}")))?;
        if frame.is_ping() {
            log::debug!("Sending keepalive: {text}");
        } else {
            log::info!("Sending event: {text}");
        }
        self.sink
            .send_text(&text)
            .await
            .map_err(|e| SessionError::Transport(format!("{e:#}")))
    }
}
