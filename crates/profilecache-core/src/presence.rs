//! Presence model.
//!
//! Presence arrives from the real-time feed as [`RawPresence`] and is
//! projected into a [`PresenceSnapshot`] by [`crate::decode::decode_presence`].
//! A missing presence is always represented by [`PresenceSnapshot::offline`],
//! never by omission.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Online status of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Idle,
    Dnd,
    #[default]
    Offline,
}

impl PresenceStatus {
    /// Maps a feed status string. `invisible` and anything unknown read as
    /// offline.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "online" => Self::Online,
            "idle" => Self::Idle,
            "dnd" => Self::Dnd,
            _ => Self::Offline,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Dnd => "dnd",
            Self::Offline => "offline",
        }
    }
}

/// Kind of an activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Game,
    Streaming,
    Listening,
    Watching,
    Custom,
    Competing,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTimestamps {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEmoji {
    pub name: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub kind: ActivityKind,
    pub name: Option<String>,
    pub details: Option<String>,
    pub state: Option<String>,
    pub application_id: Option<String>,
    pub timestamps: Option<ActivityTimestamps>,
    pub emoji: Option<ActivityEmoji>,
    pub created_at: Option<i64>,
}

/// Normalized presence of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSnapshot {
    pub status: PresenceStatus,
    pub activities: Vec<Activity>,
    pub platforms: BTreeSet<String>,
}

impl PresenceSnapshot {
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn is_offline(&self) -> bool {
        self.status == PresenceStatus::Offline
            && self.activities.is_empty()
            && self.platforms.is_empty()
    }
}

// ---- Raw feed payloads ----

/// Presence record as delivered by the real-time feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPresence {
    pub status: Option<String>,
    pub activities: Vec<RawActivity>,
    /// Platform name (`desktop`, `mobile`, `web`) to per-platform status.
    pub client_status: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawActivity {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<i64>,
    pub details: Option<String>,
    pub state: Option<String>,
    pub application_id: Option<String>,
    pub timestamps: Option<RawActivityTimestamps>,
    pub emoji: Option<RawActivityEmoji>,
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawActivityTimestamps {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawActivityEmoji {
    pub name: Option<String>,
    pub id: Option<String>,
}
