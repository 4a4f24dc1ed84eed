//! In-process bridge between the session controller and the sender context.
//!
//! A bounded in-memory byte pipe carrying newline-delimited records.
//!
//! ```text
//!   Session (receiver context)            sender context
//!         │                                     │
//!         │ BridgeWriter::send(record)          │ BridgeReader::try_receive_one()
//!         │ ──── bytes ────► [ duplex pipe ] ───┤──► reassembly buffer ──► record
//! ```
//!
//! The writer only waits when the pipe is full (bounded backpressure). The
//! reader never waits: each poll takes whatever bytes are available, keeps
//! partial fragments in its buffer, and hands back at most one complete
//! record. Dropping the writer closes the pipe and the reader reports
//! [`BridgePoll::Closed`] once the buffer is drained.

use bytes::{Buf, BufMut, BytesMut};
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};

use crate::constants::MAX_BRIDGE_RECORD;
use crate::error::{Result, SessionError};

/// Record delimiter.
const DELIMITER: u8 = b'\n';

/// Bytes reserved in the reassembly buffer before each read.
const READ_CHUNK: usize = 4096;

/// Outcome of one non-blocking poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgePoll {
    /// One complete record, without its delimiter.
    Record(String),
    /// Nothing complete is available right now.
    Empty,
    /// The writer is gone and every buffered record has been delivered.
    Closed,
}

/// Create a connected writer/reader pair with `capacity` bytes of buffering.
#[must_use]
pub fn channel(capacity: usize) -> (BridgeWriter, BridgeReader) {
    let (writer_end, mut reader_end) = tokio::io::duplex(capacity);
    // The reader end never writes. DuplexStream shutdown completes
    // synchronously, so polling once is enough.
    let _ = reader_end.shutdown().now_or_never();
    (BridgeWriter::new(writer_end), BridgeReader::new(reader_end))
}

/// Write side. Owned by the session controller.
#[derive(Debug)]
pub struct BridgeWriter<W = DuplexStream> {
    inner: W,
    /// Bytes of accepted records not yet in the pipe.
    pending: BytesMut,
}

impl<W: AsyncWrite + Unpin> BridgeWriter<W> {
    /// Wrap a byte sink.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: BytesMut::new(),
        }
    }

    /// Append one record.
    ///
    /// Cancel safe at record granularity: once a call has started, its
    /// record is either fully in the pipe or kept whole in the writer and
    /// written before the next record. A cancelled send may therefore still
    /// be delivered by the next call.
    pub async fn send(&mut self, record: &str) -> Result<()> {
        if record.as_bytes().contains(&DELIMITER) {
            return Err(SessionError::Bridge(
                "record contains the delimiter".to_string(),
            ));
        }
        self.pending.reserve(record.len() + 1);
        self.pending.extend_from_slice(record.as_bytes());
        self.pending.put_u8(DELIMITER);
        self.flush_pending().await
    }

    /// Bytes accepted by [`BridgeWriter::send`] but not yet in the pipe.
    #[must_use]
    pub fn unflushed(&self) -> usize {
        self.pending.len()
    }

    async fn flush_pending(&mut self) -> Result<()> {
        while !self.pending.is_empty() {
            let written = self
                .inner
                .write(&self.pending)
                .await
                .map_err(|e| SessionError::Bridge(format!("bridge write failed: {e}")))?;
            if written == 0 {
                return Err(SessionError::Bridge(
                    "bridge write failed: pipe closed".to_string(),
                ));
            }
            self.pending.advance(written);
        }
        Ok(())
    }

    /// Serialize `value` as one JSON record.
    pub async fn send_json<T: serde::Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let record = serde_json::to_string(value)
            .map_err(|e| SessionError::Bridge(format!("bridge encode failed: {e}")))?;
        self.send(&record).await
    }
}

/// Read side. Owned by the sender context.
#[derive(Debug)]
pub struct BridgeReader<R = DuplexStream> {
    inner: R,
    buf: BytesMut,
    /// Bytes of `buf` already known to hold no delimiter.
    scanned: usize,
    /// Dropping bytes until the next delimiter (after an over-long record).
    discarding: bool,
    eof: bool,
    max_record: usize,
}

impl<R: AsyncRead + Unpin> BridgeReader<R> {
    /// Wrap a byte source.
    pub fn new(inner: R) -> Self {
        Self::with_max_record(inner, MAX_BRIDGE_RECORD)
    }

    /// Wrap a byte source with a custom record size limit.
    pub fn with_max_record(inner: R, max_record: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            scanned: 0,
            discarding: false,
            eof: false,
            max_record,
        }
    }

    /// Poll for one complete record without waiting.
    ///
    /// # Errors
    ///
    /// [`SessionError::Bridge`] for a record that is not UTF-8 or exceeds the
    /// size limit. The bad record is consumed, so the next poll resumes at
    /// the following record.
    pub fn try_receive_one(&mut self) -> Result<BridgePoll> {
        loop {
            if let Some(record) = self.take_record()? {
                return Ok(BridgePoll::Record(record));
            }

            if self.eof {
                if !self.buf.is_empty() {
                    log::warn!(
                        "Bridge closed with {} bytes of unterminated record; discarding",
                        self.buf.len()
                    );
                    self.buf.clear();
                    self.scanned = 0;
                }
                return Ok(BridgePoll::Closed);
            }

            self.buf.reserve(READ_CHUNK);
            match self.inner.read_buf(&mut self.buf).now_or_never() {
                None => return Ok(BridgePoll::Empty),
                Some(Ok(0)) => self.eof = true,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(SessionError::Bridge(format!("bridge read failed: {e}")));
                }
            }
        }
    }

    /// Number of buffered bytes not yet returned as records.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn take_record(&mut self) -> Result<Option<String>> {
        loop {
            let found = self.buf[self.scanned..]
                .iter()
                .position(|&b| b == DELIMITER)
                .map(|offset| self.scanned + offset);

            let Some(pos) = found else {
                self.scanned = self.buf.len();
                if self.discarding {
                    self.buf.clear();
                    self.scanned = 0;
                } else if self.buf.len() > self.max_record {
                    let dropped = self.buf.len();
                    self.buf.clear();
                    self.scanned = 0;
                    self.discarding = true;
                    return Err(SessionError::Bridge(format!(
                        "record exceeds {} bytes ({dropped} buffered); discarding",
                        self.max_record
                    )));
                }
                return Ok(None);
            };

            let line = self.buf.split_to(pos);
            self.buf.advance(1);
            self.scanned = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return match std::str::from_utf8(line) {
                Ok(text) => Ok(Some(text.to_string())),
                Err(e) => Err(SessionError::Bridge(format!("record is not UTF-8: {e}"))),
            };
        }
    }
}
