//! Application-wide constants for rtmbot.
//!
//! Defaults for the configuration surface and fixed protocol limits live
//! here so the session, bridge and CLI agree on them.
//!
//! # Categories
//!
//! - **Endpoints**: handshake API location
//! - **Timeouts**: network and stream timeouts
//! - **Keepalive**: sender scheduling cadence
//! - **Limits**: text and bridge sizes

use std::time::Duration;

// ============================================================================
// Endpoints
// ============================================================================

/// Default base URL for the platform Web API.
pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";

/// Web API method that exchanges a bot token for a stream endpoint.
pub const RTM_START_METHOD: &str = "rtm.start";

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for the handshake call.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a single blocking receive on the stream.
///
/// Expiry is the "empty result" of the receive primitive and is retried
/// transparently by the receive loop.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for the mandatory hello frame after opening the stream.
pub const DEFAULT_HELLO_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `Session::shutdown` waits for the sender context to exit.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// Keepalive
// ============================================================================

/// Period between keepalive pings when the stream is otherwise idle.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Cadence at which the sender context polls the bridge.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Limits
// ============================================================================

/// Maximum outbound message length, in characters.
pub const DEFAULT_MAX_TEXT_LEN: usize = 4000;

/// In-memory pipe capacity between the two contexts.
///
/// Writers wait (bounded backpressure) once this many bytes are unread.
pub const BRIDGE_CAPACITY: usize = 64 * 1024;

/// Longest bridge record accepted without a delimiter before it is discarded.
pub const MAX_BRIDGE_RECORD: usize = 1024 * 1024;

/// First sequence id assigned to an outbound frame in a new session.
pub const FIRST_SEQUENCE_ID: u64 = 1;

/// User-Agent header for API calls.
#[must_use]
pub fn user_agent() -> String {
    format!("rtmbot/{}", env!("CARGO_PKG_VERSION"))
}
