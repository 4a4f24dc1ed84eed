//! rtmbot - persistent real-time messaging session client.
//!
//! Opens a streaming session for a chat bot user, keeps it alive, and lets
//! an application receive events and send messages concurrently.
//!
//! # Architecture
//!
//! - **Handshake** - one-shot Web API call returning the stream endpoint and
//!   the roster snapshot
//! - **Session** - owns the read half of the stream, verifies hello, exposes
//!   `receive` / `send`
//! - **Sender** - spawned task owning the write half; drains queued sends,
//!   stamps sequence ids, sends keepalive pings
//! - **Bridge** - newline-delimited JSON pipe from the session to the sender
//!
//! # Modules
//!
//! - [`handshake`] - Web API client
//! - [`session`] - session controller and sender context
//! - [`bridge`] - in-process record pipe
//! - [`config`] - configuration loading/saving

// Rust guideline compliant 2026-02

// Library modules
pub mod bridge;
pub mod config;
pub mod constants;
pub mod env;
pub mod error;
pub mod event;
pub mod handshake;
pub mod roster;
pub mod session;
pub mod ws;

// Re-export commonly used types
pub use config::{Config, Credential, SessionConfig, Verbosity};
pub use error::{Result, SessionError};
pub use event::{Event, MessageEvent};
pub use roster::{Roster, RosterEntry};
pub use session::{Session, SessionInfo};
