//! Streaming transport.
//!
//! Thin wrapper around `tokio-tungstenite` providing type-isolated
//! reader/writer halves. The session never touches `tokio-tungstenite`
//! directly; it talks to the [`FrameSink`] and [`FrameSource`] traits so
//! the two execution contexts can be driven by in-memory fakes in tests.
//!
//! # Ownership
//!
//! [`connect`] returns a ([`WsWriter`], [`WsReader`]) pair. The writer is
//! moved into the sender context and the reader stays with the session
//! controller, so each direction has exactly one owner by construction.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

/// Concrete WebSocket stream type (avoids repeating the 6-line generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Write side of the transport. Only the sender context holds one.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Close the stream gracefully.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Read side of the transport. Only the session controller holds one.
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next frame.
    ///
    /// Returns `Some("")` when something other than a text frame arrived
    /// (control frames, binary), and `None` once the stream has ended.
    async fn recv_text(&mut self) -> Result<Option<String>>;
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a close frame and flush the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake cannot be written.
    pub async fn send_close(&mut self) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Close(None))
            .await
            .context("WebSocket send_close failed")
    }
}

#[async_trait]
impl FrameSink for WsWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("WebSocket send_text failed")
    }

    async fn close(&mut self) -> Result<()> {
        self.send_close().await?;
        self.sink.close().await.context("WebSocket close failed")
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsReader {
    async fn recv_text(&mut self) -> Result<Option<String>> {
        match self.stream.next().await {
            Some(Ok(tungstenite::Message::Text(text))) => Ok(Some(text.to_string())),
            Some(Ok(tungstenite::Message::Close(close_frame))) => {
                let (code, reason) = close_frame
                    .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                    .unwrap_or((1005, String::new()));
                log::info!("WebSocket closed by remote: {code} {reason}");
                Ok(None)
            }
            // Control and binary frames carry no events. tungstenite queues
            // pong replies itself; they go out with the sender's next write.
            Some(Ok(
                tungstenite::Message::Ping(_)
                | tungstenite::Message::Pong(_)
                | tungstenite::Message::Binary(_)
                | tungstenite::Message::Frame(_),
            )) => Ok(Some(String::new())),
            Some(Err(e)) => Err(anyhow::anyhow!("WebSocket read error: {e}")),
            None => Ok(None),
        }
    }
}

/// Connect to a WebSocket URL.
///
/// Returns split (writer, reader) halves for independent ownership.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the WebSocket handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    use tungstenite::client::IntoClientRequest;

    let request = url
        .into_client_request()
        .with_context(|| format!("invalid WebSocket URL: {url}"))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .context("WebSocket connect failed")?;

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}
