//! Session controller.
//!
//! Orchestrates connect → verify → fork → run.
//!
//! # Architecture
//!
//! ```text
//!   Session::connect
//!     │  HandshakeClient::start ──► endpoint, roster, team
//!     │  ws::connect(endpoint)  ──► (WsWriter, WsReader)
//!     │  first frame must be hello
//!     ▼
//!   fork ─────────────────────────────────────────────┐
//!     │                                               │
//!   receiver context (caller's task)          sender context (spawned task)
//!     Session::receive ◄── WsReader             Sender ──► WsWriter
//!     Session::send ── BridgeWriter ──► bridge ──► BridgeReader
//! ```
//!
//! After the fork each transport direction has exactly one owner: the
//! reader stays inside [`Session`], the writer moves into the sender task.
//! The two contexts share nothing mutable; the only link is the bridge.
//! The roster and team identity become a read-only snapshot.
//!
//! # Lifecycle
//!
//! - [`Session::shutdown`] queues a shutdown record, waits for the sender to
//!   flush and close the stream.
//! - Dropping the [`Session`] closes the bridge; the sender notices at its
//!   next tick and closes the stream.
//! - A fatal write failure in the sender surfaces from the next
//!   [`Session::receive`] or [`Session::send`].

// Rust guideline compliant 2026-02

pub mod sender;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::{JoinError, JoinHandle};

use crate::bridge::{self, BridgeWriter};
use crate::config::SessionConfig;
use crate::constants::{FIRST_SEQUENCE_ID, SHUTDOWN_GRACE};
use crate::error::{Result, SessionError};
use crate::event::{truncate_chars, Event, OutboundRequest};
use crate::handshake::{HandshakeClient, HandshakeResult};
use crate::roster::{BotIdentity, Roster, TeamIdentity};
use crate::ws::{self, FrameSink, FrameSource};

use sender::{BridgeRecord, KeepaliveSchedule, Sender, SenderExit, SequenceCounter};

/// Read-only session state shared after the fork.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Stream endpoint the session is connected to.
    pub endpoint: String,
    /// User id → direct channel / display name.
    pub roster: Roster,
    /// Team identity record.
    pub team: TeamIdentity,
    /// The bot's own identity.
    pub bot: Option<BotIdentity>,
}

impl From<HandshakeResult> for SessionInfo {
    fn from(result: HandshakeResult) -> Self {
        Self {
            endpoint: result.endpoint,
            roster: result.roster,
            team: result.team,
            bot: result.bot,
        }
    }
}

/// A live session. Lives in the receiver context.
pub struct Session {
    info: Arc<SessionInfo>,
    source: Box<dyn FrameSource>,
    bridge: BridgeWriter,
    sender: Option<JoinHandle<Result<SenderExit>>>,
    /// Set once the sender context has exited; replayed to every later call.
    sender_outcome: Option<SessionError>,
    max_text_len: usize,
    receive_timeout: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.info.endpoint)
            .field("sender_running", &self.sender.is_some())
            .field("sender_outcome", &self.sender_outcome)
            .finish_non_exhaustive()
    }
}

/// What woke the receive loop.
enum Wake {
    SenderExited(SessionError),
    Frame(std::result::Result<anyhow::Result<Option<String>>, tokio::time::error::Elapsed>),
}

impl Session {
    /// Handshake, open the stream, verify hello, fork the sender context.
    ///
    /// # Errors
    ///
    /// `Config`/`Auth` for bad settings, `Network`/`Handshake`/`Auth` from the
    /// handshake, `Transport` if the stream cannot be opened, `Handshake` if
    /// the first frame is not a hello.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        log::info!("Connecting ({} environment)", config.environment);

        let client = HandshakeClient::new(&config.api_base_url)?;
        let handshake = client.start(&config.credential).await?;
        log::info!(
            "Handshake complete: team {} with {} roster entries",
            handshake.team.name.as_deref().unwrap_or("<unnamed>"),
            handshake.roster.len()
        );

        log::info!("Opening WebSocket connection...");
        let (writer, reader) = ws::connect(&handshake.endpoint)
            .await
            .map_err(|e| SessionError::Transport(format!("{e:#}")))?;

        Self::start(handshake.into(), writer, reader, config).await
    }

    /// Verify hello on an already-open transport, then fork.
    ///
    /// Split out of [`Session::connect`] so any transport pair can be used.
    pub async fn start<W, R>(
        info: SessionInfo,
        writer: W,
        mut reader: R,
        config: &SessionConfig,
    ) -> Result<Self>
    where
        W: FrameSink + 'static,
        R: FrameSource + 'static,
    {
        config.validate()?;
        await_hello(&mut reader, config.hello_timeout).await?;
        log::info!("Hello received.");

        let (mut bridge_writer, bridge_reader) = bridge::channel(config.bridge_capacity);
        let sender = Sender::new(
            writer,
            bridge_reader,
            SequenceCounter::starting_at(FIRST_SEQUENCE_ID),
            KeepaliveSchedule::new(config.keepalive_interval, config.poll_interval),
        );
        let handle = tokio::spawn(sender.run());

        log::debug!("Testing bridge to sender context...");
        bridge_writer
            .send_json(&BridgeRecord::Probe {
                origin: "session controller".to_string(),
            })
            .await?;

        Ok(Self {
            info: Arc::new(info),
            source: Box::new(reader),
            bridge: bridge_writer,
            sender: Some(handle),
            sender_outcome: None,
            max_text_len: config.max_text_len,
            receive_timeout: config.receive_timeout,
        })
    }

    /// Roster, team and endpoint snapshot.
    #[must_use]
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Shared handle to the snapshot, for other tasks.
    #[must_use]
    pub fn shared_info(&self) -> Arc<SessionInfo> {
        Arc::clone(&self.info)
    }

    /// Wait for the next inbound event.
    ///
    /// Receive timeouts, control frames and empty frames are absorbed, so
    /// this never returns an empty event. Frames that are not JSON are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// `Transport` when the stream ends or fails, or the sender context died
    /// on a write failure; `Closed` after a clean sender exit.
    pub async fn receive(&mut self) -> Result<Event> {
        loop {
            if let Some(outcome) = &self.sender_outcome {
                return Err(outcome.clone());
            }

            let wake = tokio::select! {
                biased;
                outcome = watch_sender(&mut self.sender) => Wake::SenderExited(outcome),
                frame = tokio::time::timeout(self.receive_timeout, self.source.recv_text()) => {
                    Wake::Frame(frame)
                }
            };

            let text = match wake {
                Wake::SenderExited(outcome) => {
                    self.sender_outcome = Some(outcome);
                    continue;
                }
                Wake::Frame(Err(_elapsed)) => continue,
                Wake::Frame(Ok(Ok(Some(text)))) => text,
                Wake::Frame(Ok(Ok(None))) => {
                    return Err(SessionError::Transport(
                        "stream closed by remote".to_string(),
                    ));
                }
                Wake::Frame(Ok(Err(e))) => return Err(SessionError::Transport(format!("{e:#}"))),
            };

            if text.trim().is_empty() {
                continue;
            }

            match Event::decode(&text) {
                Ok(event) => {
                    log::log!(event_log_level(&event), "Received event: {text}");
                    return Ok(event);
                }
                Err(e) => log::warn!("Skipping undecodable frame ({e}): {text}"),
            }
        }
    }

    /// Queue a message for `channel`. Text past the limit is truncated.
    ///
    /// Returns once the request is in the bridge; it never waits on the
    /// transport. If the call is cancelled while the bridge is full, the
    /// request is kept whole and goes out ahead of the next one.
    ///
    /// # Errors
    ///
    /// `Bridge` if the request could not be queued (reported, not retried),
    /// or the sender's exit error once it has stopped.
    pub async fn send(&mut self, channel: &str, text: &str) -> Result<()> {
        if truncate_chars(text, self.max_text_len).len() < text.len() {
            log::debug!(
                "Truncating outbound text to {} characters",
                self.max_text_len
            );
        }
        self.enqueue(OutboundRequest::message(channel, text, self.max_text_len))
            .await
    }

    /// Queue a typing indicator for `channel`.
    pub async fn send_typing(&mut self, channel: &str) -> Result<()> {
        self.enqueue(OutboundRequest::Typing {
            channel: channel.to_string(),
        })
        .await
    }

    async fn enqueue(&mut self, request: OutboundRequest) -> Result<()> {
        self.reap_sender();
        if let Some(outcome) = &self.sender_outcome {
            return Err(outcome.clone());
        }

        match self.bridge.send_json(&BridgeRecord::Send { request }).await {
            Ok(()) => Ok(()),
            Err(bridge_err) => match self.settle_sender().await {
                Some(outcome) => Err(outcome),
                None => Err(bridge_err),
            },
        }
    }

    /// Record the sender's outcome if it has already exited.
    fn reap_sender(&mut self) {
        if !self.sender.as_ref().is_some_and(JoinHandle::is_finished) {
            return;
        }
        if let Some(outcome) = self.sender.take().and_then(FutureExt::now_or_never) {
            self.sender_outcome = Some(exit_outcome(outcome));
        }
    }

    /// After a bridge failure: wait briefly for the sender to finish exiting
    /// and return its outcome.
    async fn settle_sender(&mut self) -> Option<SessionError> {
        if let Some(handle) = self.sender.as_mut() {
            if let Ok(outcome) = tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                self.sender = None;
                self.sender_outcome = Some(exit_outcome(outcome));
            }
        }
        self.sender_outcome.clone()
    }

    /// Flush queued sends, close the stream, and stop the sender context.
    ///
    /// # Errors
    ///
    /// The sender's fatal error if it had already failed.
    pub async fn shutdown(mut self) -> Result<()> {
        let Some(handle) = self.sender.take() else {
            return match self.sender_outcome {
                None | Some(SessionError::Closed) => Ok(()),
                Some(e) => Err(e),
            };
        };

        if let Err(e) = self.bridge.send_json(&BridgeRecord::Shutdown).await {
            log::debug!("Shutdown record not queued: {e}");
        }

        let abort = handle.abort_handle();
        match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
            Ok(Ok(Ok(exit))) => {
                log::info!("Session shut down ({exit:?})");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(join)) => Err(SessionError::Transport(format!(
                "sender context panicked: {join}"
            ))),
            Err(elapsed) => {
                log::warn!("Sender context did not stop in {SHUTDOWN_GRACE:?} ({elapsed}); aborting");
                abort.abort();
                Ok(())
            }
        }
    }
}

/// Resolve once the sender context exits; pending forever if it already has.
async fn watch_sender(sender: &mut Option<JoinHandle<Result<SenderExit>>>) -> SessionError {
    let Some(handle) = sender.as_mut() else {
        return std::future::pending().await;
    };
    let outcome = handle.await;
    *sender = None;
    exit_outcome(outcome)
}

/// Error replayed to callers once the sender context has exited.
fn exit_outcome(outcome: std::result::Result<Result<SenderExit>, JoinError>) -> SessionError {
    match outcome {
        Ok(Ok(exit)) => {
            log::info!("Sender context exited ({exit:?})");
            SessionError::Closed
        }
        Ok(Err(e)) => e,
        Err(join) => SessionError::Transport(format!("sender context panicked: {join}")),
    }
}

/// Pongs are keepalive chatter; everything else is logged at info.
fn event_log_level(event: &Event) -> log::Level {
    if event.is_pong() {
        log::Level::Debug
    } else {
        log::Level::Info
    }
}

/// The first non-empty frame must be a hello event.
async fn await_hello<R: FrameSource + ?Sized>(reader: &mut R, timeout: Duration) -> Result<()> {
    let first = tokio::time::timeout(timeout, first_frame(reader))
        .await
        .map_err(|elapsed| {
            SessionError::Handshake(format!("No hello within {timeout:?} ({elapsed})"))
        })??;

    match Event::decode(&first) {
        Ok(event) if event.is_hello() => Ok(()),
        Ok(_) | Err(_) => Err(SessionError::Handshake(format!(
            "First event from stream is not a hello: {first}"
        ))),
    }
}

async fn first_frame<R: FrameSource + ?Sized>(reader: &mut R) -> Result<String> {
    loop {
        match reader.recv_text().await {
            Ok(Some(text)) if text.trim().is_empty() => continue,
            Ok(Some(text)) => return Ok(text),
            Ok(None) => {
                return Err(SessionError::Handshake(
                    "stream closed before hello".to_string(),
                ));
            }
            Err(e) => return Err(SessionError::Transport(format!("{e:#}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use testing::{ChannelSource, RecordingSink};
    use tokio::sync::mpsc::UnboundedSender;

    fn info() -> SessionInfo {
        SessionInfo {
            endpoint: "wss://example.invalid/stream".to_string(),
            roster: Roster::default(),
            team: TeamIdentity::default(),
            bot: None,
        }
    }

    fn settings() -> SessionConfig {
        SessionConfig::new(Credential::new("xoxb-test"))
    }

    async fn started(sink: RecordingSink) -> (UnboundedSender<Option<String>>, Session) {
        started_with(sink, &settings()).await
    }

    async fn started_with(
        sink: RecordingSink,
        config: &SessionConfig,
    ) -> (UnboundedSender<Option<String>>, Session) {
        let (tx, source) = ChannelSource::new();
        tx.send(Some(r#"{"type":"hello"}"#.to_string())).expect("hello");
        let session = Session::start(info(), sink, source, config)
            .await
            .expect("session starts");
        (tx, session)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_frame_must_be_hello() {
        let (tx, source) = ChannelSource::new();
        tx.send(Some(r#"{"type":"ack"}"#.to_string())).expect("frame");

        let err = Session::start(info(), RecordingSink::default(), source, &settings())
            .await
            .expect_err("not a hello");
        assert!(matches!(err, SessionError::Handshake(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_frames_before_hello_are_skipped() {
        let (tx, source) = ChannelSource::new();
        tx.send(Some(String::new())).expect("control");
        tx.send(Some(r#"{"type":"hello"}"#.to_string())).expect("hello");

        let session = Session::start(info(), RecordingSink::default(), source, &settings()).await;
        assert!(session.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_hello_times_out() {
        let (_tx, source) = ChannelSource::new();
        let err = Session::start(info(), RecordingSink::default(), source, &settings())
            .await
            .expect_err("no hello");
        assert!(matches!(err, SessionError::Handshake(msg) if msg.contains("No hello")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_closed_before_hello() {
        let (tx, source) = ChannelSource::new();
        drop(tx);
        let err = Session::start(info(), RecordingSink::default(), source, &settings())
            .await
            .expect_err("closed");
        assert!(matches!(err, SessionError::Handshake(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_skips_empty_and_garbage_frames() {
        let (tx, mut session) = started(RecordingSink::default()).await;
        tx.send(Some(String::new())).expect("control");
        tx.send(Some("   ".to_string())).expect("blank");
        tx.send(Some("not json".to_string())).expect("garbage");
        tx.send(Some(r#"{"type":"pong","reply_to":1}"#.to_string())).expect("pong");
        tx.send(Some(r#"{"type":"message","channel":"D1","user":"U1","text":"hi"}"#.to_string()))
            .expect("message");

        assert_eq!(
            session.receive().await.expect("pong"),
            Event::Pong { reply_to: Some(1) }
        );
        let event = session.receive().await.expect("message");
        assert_eq!(event.kind(), "message");
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_retries_across_timeouts() {
        let (tx, mut session) = started(RecordingSink::default()).await;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(95)).await;
            tx.send(Some(r#"{"type":"user_typing"}"#.to_string())).expect("late frame");
            // Keep the stream open.
            std::future::pending::<()>().await;
        });

        let event = session.receive().await.expect("event after timeouts");
        assert_eq!(event.kind(), "user_typing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_reports_stream_end() {
        let (tx, mut session) = started(RecordingSink::default()).await;
        drop(tx);
        let err = session.receive().await.expect_err("stream ended");
        assert!(matches!(err, SessionError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_reaches_transport_with_first_id() {
        let sink = RecordingSink::default();
        let (_tx, mut session) = started(sink.clone()).await;
        let long = "x".repeat(4100);
        session.send("C1", &long).await.expect("queued");
        session.send_typing("C1").await.expect("queued");

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["id"], 1);
        assert_eq!(frames[0]["channel"], "C1");
        assert_eq!(frames[0]["text"].as_str().map(str::len), Some(4000));
        assert_eq!(frames[1], serde_json::json!({"id": 2, "type": "typing", "channel": "C1"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sender_failure_surfaces_from_receive() {
        let sink = RecordingSink::failing_after(0);
        let (_tx, mut session) = started(sink).await;
        session.send("C1", "doomed").await.expect("queued");

        let err = session.receive().await.expect_err("sender died");
        assert!(matches!(err, SessionError::Transport(_)));

        let err = session.send("C1", "again").await.expect_err("still dead");
        assert!(matches!(err, SessionError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sender_failure_surfaces_from_send_alone() {
        let sink = RecordingSink::failing_after(0);
        let (_tx, mut session) = started(sink).await;
        session.send("C1", "doomed").await.expect("queued");

        tokio::time::sleep(Duration::from_secs(3)).await;
        let err = session.send("C1", "again").await.expect_err("sender died");
        assert!(matches!(err, SessionError::Transport(_)), "got {err:?}");

        let err = session.send_typing("C1").await.expect_err("still dead");
        assert!(matches!(err, SessionError::Transport(_)), "got {err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_send_does_not_swallow_next_message() {
        let sink = RecordingSink::default();
        let mut config = settings();
        config.bridge_capacity = 128;
        let (_tx, mut session) = started_with(sink.clone(), &config).await;

        let long = "x".repeat(400);
        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), session.send("C1", &long)).await;
        assert!(cancelled.is_err(), "bridge should have been full");

        session.send("C1", "important").await.expect("queued");
        tokio::time::sleep(Duration::from_secs(3)).await;

        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["text"], long.as_str());
        assert_eq!(frames[1]["text"], "important");
        assert_eq!(frames[1]["id"], 2);
    }

    #[test]
    fn test_only_pongs_log_below_info() {
        assert_eq!(
            event_log_level(&Event::Pong { reply_to: Some(3) }),
            log::Level::Debug
        );
        assert_eq!(event_log_level(&Event::Hello), log::Level::Info);
        assert_eq!(
            event_log_level(&Event::decode(r#"{"type":"message","text":"hi"}"#).expect("json")),
            log::Level::Info
        );
        assert_eq!(
            event_log_level(&Event::decode(r#"{"reply_to":1,"ok":true}"#).expect("json")),
            log::Level::Info
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_and_closes() {
        let sink = RecordingSink::default();
        let (_tx, mut session) = started(sink.clone()).await;
        session.send("C1", "bye").await.expect("queued");

        session.shutdown().await.expect("clean shutdown");
        assert_eq!(sink.frames().len(), 1);
        assert!(sink.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_session_closes_stream() {
        let sink = RecordingSink::default();
        let (_tx, session) = started(sink.clone()).await;
        drop(session);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(sink.is_closed());
        assert!(sink.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_info_is_shared_snapshot() {
        let (_tx, session) = started(RecordingSink::default()).await;
        let shared = session.shared_info();
        assert_eq!(shared.endpoint, session.info().endpoint);
    }
}
