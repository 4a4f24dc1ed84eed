//! Handshake client: exchanges a bot token for a stream endpoint.
//!
//! One form-encoded POST to the `rtm.start` Web API method. The response
//! carries the stream URL plus a roster snapshot (direct channels, users,
//! team identity, bot identity). Nothing is retained beyond the result.

// Rust guideline compliant 2026-02

use serde::Deserialize;

use crate::config::Credential;
use crate::constants;
use crate::error::{Result, SessionError};
use crate::roster::{BotIdentity, DirectChannel, Roster, TeamIdentity, UserRecord};

/// Error codes the Web API uses for a rejected credential.
const AUTH_ERROR_CODES: &[&str] = &[
    "not_authed",
    "invalid_auth",
    "account_inactive",
    "token_revoked",
    "token_expired",
    "no_permission",
    "not_allowed_token_type",
];

/// Raw `rtm.start` response body.
#[derive(Debug, Deserialize)]
struct RtmStartResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    ims: Vec<DirectChannel>,
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    team: Option<TeamIdentity>,
    #[serde(default, rename = "self")]
    bot: Option<BotIdentity>,
}

/// Successful handshake result.
#[derive(Debug, Clone)]
pub struct HandshakeResult {
    /// Stream endpoint URL.
    pub endpoint: String,
    /// User id → direct channel / display name.
    pub roster: Roster,
    /// Team identity record.
    pub team: TeamIdentity,
    /// The bot's own identity, when the response carried one.
    pub bot: Option<BotIdentity>,
}

/// Client for the `rtm.start` call.
#[derive(Debug, Clone)]
pub struct HandshakeClient {
    http: reqwest::Client,
    api_base_url: String,
}

impl HandshakeClient {
    /// Create a client targeting the given Web API base URL.
    pub fn new(api_base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .user_agent(constants::user_agent())
            .build()
            .map_err(|e| SessionError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full URL of the handshake method.
    #[must_use]
    pub fn start_url(&self) -> String {
        format!("{}/{}", self.api_base_url, constants::RTM_START_METHOD)
    }

    /// Exchange the credential for a stream endpoint and roster.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Auth`] for an empty credential or one the remote rejects
    /// - [`SessionError::Network`] if the request fails at the transport level
    /// - [`SessionError::Handshake`] if the response lacks a usable endpoint
    pub async fn start(&self, credential: &Credential) -> Result<HandshakeResult> {
        if credential.is_empty() {
            return Err(SessionError::Auth("No bot token given".to_string()));
        }

        log::info!("Making {} call...", constants::RTM_START_METHOD);
        let params = [
            ("token", credential.expose()),
            ("simple_latest", "1"),
            ("no_unreads", "1"),
        ];
        let response = self
            .http
            .post(self.start_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| SessionError::Network(format!("rtm.start request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SessionError::Network(format!("Failed to read rtm.start body: {e}")))?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SessionError::Auth(format!("Server returned {status}")));
        }

        let parsed: RtmStartResponse = serde_json::from_str(&body).map_err(|e| {
            SessionError::Handshake(format!("Invalid rtm.start response ({status}): {e}"))
        })?;

        let result = interpret(parsed)?;
        log::info!("WebSocket URI received.");
        Ok(result)
    }
}

/// Turn a decoded response into a result or the matching failure.
fn interpret(response: RtmStartResponse) -> Result<HandshakeResult> {
    let endpoint = response.url.filter(|url| !url.trim().is_empty());

    let Some(endpoint) = endpoint else {
        let error = response.error.unwrap_or_else(|| "unknown_error".to_string());
        if AUTH_ERROR_CODES.contains(&error.as_str()) {
            return Err(SessionError::Auth(error));
        }
        return Err(SessionError::Handshake(format!(
            "Failed to get WebSocket URI: {error}"
        )));
    };

    if !response.ok {
        log::warn!(
            "rtm.start returned a URL without ok=true (error: {})",
            response.error.as_deref().unwrap_or("none")
        );
    }

    Ok(HandshakeResult {
        endpoint,
        roster: Roster::build(&response.ims, &response.users),
        team: response.team.unwrap_or_default(),
        bot: response.bot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> RtmStartResponse {
        serde_json::from_value(json).expect("response shape")
    }

    #[test]
    fn test_interpret_success_builds_roster() {
        let result = interpret(parse(serde_json::json!({
            "ok": true,
            "url": "wss://x",
            "ims": [{"user": "U1", "id": "D1"}],
            "users": [{"id": "U1", "name": "Alice"}],
            "team": {"id": "T1", "name": "Acme", "domain": "acme"},
            "self": {"id": "B1", "name": "bot"},
        })))
        .expect("handshake ok");

        assert_eq!(result.endpoint, "wss://x");
        assert_eq!(result.roster.direct_channel("U1"), Some("D1"));
        assert_eq!(result.roster.display_name("U1"), Some("Alice"));
        assert_eq!(result.team.domain.as_deref(), Some("acme"));
        assert_eq!(result.bot.and_then(|b| b.name).as_deref(), Some("bot"));
    }

    #[test]
    fn test_missing_url_surfaces_remote_error() {
        let err = interpret(parse(serde_json::json!({"ok": false, "error": "ratelimited"})))
            .expect_err("no url");
        assert_eq!(
            err,
            SessionError::Handshake("Failed to get WebSocket URI: ratelimited".to_string())
        );
    }

    #[test]
    fn test_missing_url_without_error_field() {
        let err = interpret(parse(serde_json::json!({"ok": true}))).expect_err("no url");
        assert!(matches!(err, SessionError::Handshake(msg) if msg.contains("unknown_error")));
    }

    #[test]
    fn test_empty_url_is_not_usable() {
        let err = interpret(parse(serde_json::json!({"ok": true, "url": "  "}))).expect_err("empty url");
        assert!(matches!(err, SessionError::Handshake(_)));
    }

    #[test]
    fn test_invalid_auth_is_auth_failure() {
        let err = interpret(parse(serde_json::json!({"ok": false, "error": "invalid_auth"})))
            .expect_err("rejected token");
        assert_eq!(err, SessionError::Auth("invalid_auth".to_string()));
    }

    #[test]
    fn test_missing_lists_default_to_empty() {
        let result = interpret(parse(serde_json::json!({"ok": true, "url": "wss://x"})))
            .expect("handshake ok");
        assert!(result.roster.is_empty());
        assert_eq!(result.team, TeamIdentity::default());
        assert!(result.bot.is_none());
    }

    #[test]
    fn test_start_url_joins_method() {
        let client = HandshakeClient::new("https://slack.com/api/").expect("client");
        assert_eq!(client.start_url(), "https://slack.com/api/rtm.start");
    }

    #[tokio::test]
    async fn test_empty_credential_rejected_before_network() {
        // Unroutable base URL: reaching the network would produce Network, not Auth.
        let client = HandshakeClient::new("http://127.0.0.1:1").expect("client");
        let err = client.start(&Credential::new("")).await.expect_err("empty token");
        assert!(matches!(err, SessionError::Auth(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_failure() {
        let client = HandshakeClient::new("http://127.0.0.1:1").expect("client");
        let err = client
            .start(&Credential::new("xoxb-1"))
            .await
            .expect_err("unreachable");
        assert!(matches!(err, SessionError::Network(_)));
    }
}
