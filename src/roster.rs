//! Team roster and identity records from the handshake snapshot.
//!
//! The roster maps a user id to the user's display name and direct-message
//! channel. It is built once at handshake time and shared read-only after
//! the session forks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Direct-message channel record from the handshake `ims` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DirectChannel {
    /// Channel id (e.g. `D123456`).
    #[serde(default)]
    pub id: Option<String>,
    /// User on the other end of the channel.
    #[serde(default)]
    pub user: Option<String>,
}

/// User record from the handshake `users` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserRecord {
    /// User id (e.g. `U123456`).
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Roster entry for one user. Both fields are independently settable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    /// Direct-message channel with the bot, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Display name, if the user list carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Mapping from user id to [`RosterEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Roster {
    entries: BTreeMap<String, RosterEntry>,
}

impl Roster {
    /// Build the roster from the handshake's direct channels and users.
    ///
    /// Records with a missing or empty id are skipped. The two lists are
    /// merged field by field, so input order does not affect the result.
    #[must_use]
    pub fn build(direct_channels: &[DirectChannel], users: &[UserRecord]) -> Self {
        let mut entries: BTreeMap<String, RosterEntry> = BTreeMap::new();

        for im in direct_channels {
            if let (Some(user), Some(channel)) = (non_empty(&im.user), non_empty(&im.id)) {
                entries.entry(user.to_string()).or_default().channel = Some(channel.to_string());
            }
        }

        for user in users {
            if let (Some(id), Some(name)) = (non_empty(&user.id), non_empty(&user.name)) {
                entries.entry(id.to_string()).or_default().name = Some(name.to_string());
            }
        }

        Self { entries }
    }

    /// Entry for a user id.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&RosterEntry> {
        self.entries.get(user_id)
    }

    /// Direct-message channel for a user id.
    #[must_use]
    pub fn direct_channel(&self, user_id: &str) -> Option<&str> {
        self.get(user_id).and_then(|entry| entry.channel.as_deref())
    }

    /// Display name for a user id.
    #[must_use]
    pub fn display_name(&self, user_id: &str) -> Option<&str> {
        self.get(user_id).and_then(|entry| entry.name.as_deref())
    }

    /// Reverse lookup: which user a direct-message channel belongs to.
    #[must_use]
    pub fn user_for_channel(&self, channel_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.channel.as_deref() == Some(channel_id))
            .map(|(user, _)| user.as_str())
    }

    /// Number of users in the roster.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the roster has no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in user-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RosterEntry)> {
        self.entries.iter().map(|(user, entry)| (user.as_str(), entry))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Team identity record. Opaque beyond the common fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamIdentity {
    /// Team id.
    #[serde(default)]
    pub id: Option<String>,
    /// Team name.
    #[serde(default)]
    pub name: Option<String>,
    /// Team domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Remaining fields, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The bot's own identity from the handshake `self` record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    /// Bot user id.
    #[serde(default)]
    pub id: Option<String>,
    /// Bot user name.
    #[serde(default)]
    pub name: Option<String>,
}
