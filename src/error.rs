//! Error taxonomy for the session client.
//!
//! Startup failures (`Config`, `Auth`, `Network`, `Handshake`) mean the
//! session never opened. `Transport` after startup is fatal to the whole
//! session: a broken single-writer connection cannot be repaired in place,
//! so the caller must reconnect from scratch.

/// Errors surfaced by the session client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Configuration is invalid (zero periods, zero text limit, ...).
    Config(String),
    /// Credential missing, empty, or rejected by the remote.
    Auth(String),
    /// The handshake request failed below the HTTP response level.
    Network(String),
    /// Malformed handshake response, missing endpoint, or missing hello.
    Handshake(String),
    /// Send or receive failed on the streaming socket.
    Transport(String),
    /// The in-process bridge between the two contexts failed.
    Bridge(String),
    /// The session was shut down cleanly.
    Closed,
}

impl SessionError {
    /// Returns `true` for errors that can only happen before the session opens.
    #[must_use]
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Auth(_) | Self::Network(_) | Self::Handshake(_)
        )
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Invalid configuration: {msg}"),
            Self::Auth(msg) => write!(f, "Authentication failed: {msg}"),
            Self::Network(msg) => write!(f, "Network failure: {msg}"),
            Self::Handshake(msg) => write!(f, "Handshake failed: {msg}"),
            Self::Transport(msg) => write!(f, "Transport failure: {msg}"),
            Self::Bridge(msg) => write!(f, "Bridge failure: {msg}"),
            Self::Closed => write!(f, "Session closed"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Convenience alias for results carrying a [`SessionError`].
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = SessionError::Handshake("First event is not a hello".to_string());
        assert_eq!(
            err.to_string(),
            "Handshake failed: First event is not a hello"
        );
        assert_eq!(SessionError::Closed.to_string(), "Session closed");
    }

    #[test]
    fn test_startup_classification() {
        assert!(SessionError::Auth("invalid_auth".into()).is_startup());
        assert!(SessionError::Handshake("no url".into()).is_startup());
        assert!(!SessionError::Transport("broken pipe".into()).is_startup());
        assert!(!SessionError::Bridge("closed".into()).is_startup());
        assert!(!SessionError::Closed.is_startup());
    }

    #[test]
    fn test_usable_as_anyhow_error() {
        let err: anyhow::Error = SessionError::Auth("not_authed".into()).into();
        assert!(err.downcast_ref::<SessionError>().is_some());
    }
}
