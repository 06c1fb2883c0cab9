//! Profile model: the raw upstream record and the normalized, cached profile.

use serde::{Deserialize, Serialize};

use crate::id::EntityKey;
use crate::presence::PresenceSnapshot;

/// Unvalidated user object returned by the upstream service.
///
/// Every field is optional; absent or `null` attributes decode to `None`
/// and unknown attributes are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProfile {
    pub id: Option<String>,
    pub username: Option<String>,
    pub global_name: Option<String>,
    pub discriminator: Option<String>,
    pub avatar: Option<String>,
    pub banner: Option<String>,
    pub accent_color: Option<u32>,
    pub public_flags: Option<u64>,
    pub flags: Option<u64>,
    pub premium_type: Option<u8>,
    pub bot: Option<bool>,
}

/// Named status flag decoded from the public flags bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeName {
    DiscordStaff,
    DiscordPartner,
    HypesquadEvents,
    BugHunterLevel1,
    HypesquadBravery,
    HypesquadBrilliance,
    HypesquadBalance,
    EarlySupporter,
    TeamUser,
    BugHunterLevel2,
    VerifiedBot,
    EarlyVerifiedBotDeveloper,
    CertifiedModerator,
    BotHttpInteractions,
    ActiveDeveloper,
}

impl BadgeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiscordStaff => "discord_staff",
            Self::DiscordPartner => "discord_partner",
            Self::HypesquadEvents => "hypesquad_events",
            Self::BugHunterLevel1 => "bug_hunter_level_1",
            Self::HypesquadBravery => "hypesquad_bravery",
            Self::HypesquadBrilliance => "hypesquad_brilliance",
            Self::HypesquadBalance => "hypesquad_balance",
            Self::EarlySupporter => "early_supporter",
            Self::TeamUser => "team_user",
            Self::BugHunterLevel2 => "bug_hunter_level_2",
            Self::VerifiedBot => "verified_bot",
            Self::EarlyVerifiedBotDeveloper => "early_verified_bot_developer",
            Self::CertifiedModerator => "certified_moderator",
            Self::BotHttpInteractions => "bot_http_interactions",
            Self::ActiveDeveloper => "active_developer",
        }
    }
}

impl std::fmt::Display for BadgeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paid subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NitroTier {
    NitroClassic,
    NitroBoost,
    NitroBasic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    #[serde(default)]
    pub hash: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Banner {
    pub hash: Option<String>,
    pub url: Option<String>,
}

/// Creation time derived from the entity id. Both fields are `None` when the
/// id cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreatedAt {
    pub unix_millis: Option<i64>,
    pub iso8601: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Badges {
    pub raw: u64,
    pub decoded: Vec<BadgeName>,
}

/// The cached artifact served to clients.
///
/// Key-value backends may drop `null` values and empty containers when
/// storing a record, so everything except the id, the avatar and the fetch
/// time reads back as its empty value when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedProfile {
    pub id: EntityKey,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub bot: bool,
    pub avatar: Avatar,
    #[serde(default)]
    pub banner: Banner,
    #[serde(default)]
    pub accent_color: Option<u32>,
    #[serde(default)]
    pub accent_color_hex: Option<String>,
    #[serde(default)]
    pub created_at: CreatedAt,
    #[serde(default)]
    pub badges: Badges,
    #[serde(default)]
    pub nitro: Option<NitroTier>,
    #[serde(default)]
    pub presence: PresenceSnapshot,
    /// Unix millis of the upstream fetch that produced this profile.
    pub fetched_at: i64,
}

impl NormalizedProfile {
    /// Returns the form written to the persistent tier. Presence is live
    /// data and is never persisted, so the stored copy is always offline.
    pub fn persisted(&self) -> Self {
        Self {
            presence: PresenceSnapshot::offline(),
            ..self.clone()
        }
    }

    pub fn with_presence(mut self, presence: PresenceSnapshot) -> Self {
        self.presence = presence;
        self
    }

    /// Structural equality of the persisted forms, ignoring `fetched_at`.
    ///
    /// Used to decide whether a fresh fetch needs to be written back.
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.username == other.username
            && self.display_name == other.display_name
            && self.discriminator == other.discriminator
            && self.bot == other.bot
            && self.avatar == other.avatar
            && self.banner == other.banner
            && self.accent_color == other.accent_color
            && self.accent_color_hex == other.accent_color_hex
            && self.created_at == other.created_at
            && self.badges == other.badges
            && self.nitro == other.nitro
    }

    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis - self.fetched_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::PresenceStatus;

    fn sample(fetched_at: i64) -> NormalizedProfile {
        NormalizedProfile {
            id: EntityKey::from("42"),
            username: Some("nelly".into()),
            display_name: Some("Nelly".into()),
            discriminator: Some("0".into()),
            bot: false,
            avatar: Avatar {
                hash: None,
                url: "https://cdn.discordapp.com/embed/avatars/2.png".into(),
            },
            banner: Banner::default(),
            accent_color: None,
            accent_color_hex: None,
            created_at: CreatedAt::default(),
            badges: Badges::default(),
            nitro: None,
            presence: PresenceSnapshot::offline(),
            fetched_at,
        }
    }

    #[test]
    fn same_content_ignores_fetched_at_and_presence() {
        let a = sample(1_000);
        let mut b = sample(9_000);
        b.presence.status = PresenceStatus::Online;
        assert!(a.same_content(&b));

        b.username = Some("renamed".into());
        assert!(!a.same_content(&b));
    }

    #[test]
    fn persisted_form_drops_presence() {
        let mut profile = sample(1_000);
        profile.presence.status = PresenceStatus::Dnd;
        assert!(profile.persisted().presence.is_offline());
        assert_eq!(profile.persisted().fetched_at, 1_000);
    }

    #[test]
    fn camel_case_wire_format() {
        let value = serde_json::to_value(sample(5)).unwrap();
        assert_eq!(value["displayName"], "Nelly");
        assert_eq!(value["fetchedAt"], 5);
        assert_eq!(value["presence"]["status"], "offline");
        assert!(value["createdAt"]["unixMillis"].is_null());
    }

    #[test]
    fn raw_profile_ignores_unknown_fields() {
        let raw: RawProfile = serde_json::from_str(
            r#"{"id":"42","username":"nelly","avatar":null,"clan":{"tag":"x"}}"#,
        )
        .unwrap();
        assert_eq!(raw.id.as_deref(), Some("42"));
        assert!(raw.avatar.is_none());
        assert!(raw.public_flags.is_none());
    }

    #[test]
    fn record_without_nulls_or_empty_containers_decodes() {
        let profile: NormalizedProfile = serde_json::from_str(
            r#"{
                "id": "42",
                "username": "nelly",
                "avatar": {"url": "https://cdn.discordapp.com/embed/avatars/2.png"},
                "badges": {"raw": 0},
                "presence": {"status": "offline"},
                "fetchedAt": 7
            }"#,
        )
        .unwrap();

        let mut expected = sample(7);
        expected.display_name = None;
        expected.discriminator = None;
        assert_eq!(profile, expected);
    }
}
