//! Stateless decoding of raw upstream attributes into normalized values.
//!
//! Nothing in here performs I/O or fails a request: decoration problems
//! (an id that is not a snowflake, a timestamp out of range) degrade the
//! affected field to `None`.

use crate::error::Result;
use crate::id::EntityKey;
use crate::presence::{
    Activity, ActivityEmoji, ActivityKind, ActivityTimestamps, PresenceSnapshot, PresenceStatus,
    RawActivity, RawPresence,
};
use crate::profile::{
    Avatar, Badges, Banner, BadgeName, CreatedAt, NitroTier, NormalizedProfile, RawProfile,
};
use crate::time::format_iso8601_millis;

/// Milliseconds between the unix epoch and the snowflake epoch (2015-01-01).
pub const SNOWFLAKE_EPOCH_MILLIS: i64 = 1_420_070_400_000;

/// Bits below the embedded timestamp (worker, process, increment).
pub const SNOWFLAKE_TIMESTAMP_SHIFT: u32 = 22;

pub const CDN_BASE_URL: &str = "https://cdn.discordapp.com";

/// Requested image size for avatars and banners.
pub const MEDIA_SIZE: u32 = 4096;

/// Hash prefix marking animated media.
const ANIMATED_HASH_PREFIX: &str = "a_";

/// Number of built-in default avatars.
const DEFAULT_AVATAR_COUNT: u64 = 5;

/// Public flag bits, ordered by ascending bit position.
const BADGE_TABLE: [(u64, BadgeName); 15] = [
    (1 << 0, BadgeName::DiscordStaff),
    (1 << 1, BadgeName::DiscordPartner),
    (1 << 2, BadgeName::HypesquadEvents),
    (1 << 3, BadgeName::BugHunterLevel1),
    (1 << 6, BadgeName::HypesquadBravery),
    (1 << 7, BadgeName::HypesquadBrilliance),
    (1 << 8, BadgeName::HypesquadBalance),
    (1 << 9, BadgeName::EarlySupporter),
    (1 << 10, BadgeName::TeamUser),
    (1 << 14, BadgeName::BugHunterLevel2),
    (1 << 16, BadgeName::VerifiedBot),
    (1 << 17, BadgeName::EarlyVerifiedBotDeveloper),
    (1 << 18, BadgeName::CertifiedModerator),
    (1 << 19, BadgeName::BotHttpInteractions),
    (1 << 22, BadgeName::ActiveDeveloper),
];

/// Decodes a public flags bitmask. Bits missing from the table are ignored.
pub fn decode_badges(flags: u64) -> Vec<BadgeName> {
    BADGE_TABLE
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

/// Extracts the creation timestamp embedded in a snowflake, in unix millis.
pub fn snowflake_millis(id: &EntityKey) -> Result<i64> {
    let raw = id.as_u64()?;
    Ok((raw >> SNOWFLAKE_TIMESTAMP_SHIFT) as i64 + SNOWFLAKE_EPOCH_MILLIS)
}

/// Decodes the creation time of an entity from its id.
///
/// Best-effort: a malformed id yields `{null, null}`.
pub fn decode_creation_time(id: &EntityKey) -> CreatedAt {
    let millis = match snowflake_millis(id) {
        Ok(millis) => millis,
        Err(e) => {
            tracing::debug!(key = %id, error = %e, "creation time not decodable");
            return CreatedAt::default();
        }
    };

    match format_iso8601_millis(millis) {
        Ok(iso) => CreatedAt {
            unix_millis: Some(millis),
            iso8601: Some(iso),
        },
        Err(e) => {
            tracing::debug!(key = %id, error = %e, "creation time out of range");
            CreatedAt::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Avatar,
    Banner,
}

impl MediaKind {
    fn path_segment(&self) -> &'static str {
        match self {
            MediaKind::Avatar => "avatars",
            MediaKind::Banner => "banners",
        }
    }
}

/// Resolves the CDN URL for an avatar or banner.
///
/// Banners without a hash have no URL. Avatars without a hash fall back to
/// one of the built-in default images, chosen by `id mod 5`.
pub fn media_url(kind: MediaKind, id: &EntityKey, hash: Option<&str>) -> Option<String> {
    match (kind, hash) {
        (MediaKind::Banner, None) => None,
        (MediaKind::Avatar, None) => {
            let index = id.as_u64().map(|v| v % DEFAULT_AVATAR_COUNT).unwrap_or(0);
            Some(format!("{CDN_BASE_URL}/embed/avatars/{index}.png"))
        }
        (kind, Some(hash)) => {
            let extension = if hash.starts_with(ANIMATED_HASH_PREFIX) {
                "gif"
            } else {
                "png"
            };
            Some(format!(
                "{CDN_BASE_URL}/{}/{id}/{hash}.{extension}?size={MEDIA_SIZE}",
                kind.path_segment()
            ))
        }
    }
}

pub fn decode_activity_kind(raw_kind: i64) -> ActivityKind {
    match raw_kind {
        0 => ActivityKind::Game,
        1 => ActivityKind::Streaming,
        2 => ActivityKind::Listening,
        3 => ActivityKind::Watching,
        4 => ActivityKind::Custom,
        5 => ActivityKind::Competing,
        _ => ActivityKind::Unknown,
    }
}

pub fn decode_nitro(premium_type: Option<u8>) -> Option<NitroTier> {
    match premium_type? {
        1 => Some(NitroTier::NitroClassic),
        2 => Some(NitroTier::NitroBoost),
        3 => Some(NitroTier::NitroBasic),
        _ => None,
    }
}

/// Formats a 24-bit RGB integer as `#rrggbb`.
pub fn accent_color_hex(color: u32) -> String {
    format!("#{:06x}", color & 0x00ff_ffff)
}

fn decode_activity(raw: &RawActivity) -> Activity {
    Activity {
        kind: raw
            .kind
            .map(decode_activity_kind)
            .unwrap_or(ActivityKind::Unknown),
        name: raw.name.clone(),
        details: raw.details.clone(),
        state: raw.state.clone(),
        application_id: raw.application_id.clone(),
        timestamps: raw.timestamps.as_ref().map(|t| ActivityTimestamps {
            start: t.start,
            end: t.end,
        }),
        emoji: raw.emoji.as_ref().map(|e| ActivityEmoji {
            name: e.name.clone(),
            id: e.id.clone(),
        }),
        created_at: raw.created_at,
    }
}

/// Projects a feed presence record into its normalized shape.
pub fn decode_presence(raw: &RawPresence) -> PresenceSnapshot {
    let status = raw
        .status
        .as_deref()
        .map(PresenceStatus::from_raw)
        .unwrap_or_default();

    let platforms = raw
        .client_status
        .iter()
        .filter(|(_, status)| PresenceStatus::from_raw(status) != PresenceStatus::Offline)
        .map(|(platform, _)| platform.clone())
        .collect();

    PresenceSnapshot {
        status,
        activities: raw.activities.iter().map(decode_activity).collect(),
        platforms,
    }
}

/// Builds a [`NormalizedProfile`] from a raw upstream record.
///
/// `key` is the identifier the profile was requested under and is used as
/// the profile id regardless of what the payload echoes back.
pub fn normalize(
    key: &EntityKey,
    raw: RawProfile,
    fetched_at: i64,
    presence: PresenceSnapshot,
) -> NormalizedProfile {
    if let Some(ref echoed) = raw.id
        && echoed != key.as_str()
    {
        tracing::warn!(key = %key, echoed = %echoed, "upstream echoed a different id");
    }

    let flags = raw.public_flags.or(raw.flags).unwrap_or(0);
    let avatar_url = media_url(MediaKind::Avatar, key, raw.avatar.as_deref())
        .unwrap_or_else(|| format!("{CDN_BASE_URL}/embed/avatars/0.png"));
    let banner_url = media_url(MediaKind::Banner, key, raw.banner.as_deref());

    NormalizedProfile {
        id: key.clone(),
        username: raw.username,
        display_name: raw.global_name,
        discriminator: raw.discriminator,
        bot: raw.bot.unwrap_or(false),
        avatar: Avatar {
            hash: raw.avatar,
            url: avatar_url,
        },
        banner: Banner {
            hash: raw.banner,
            url: banner_url,
        },
        accent_color: raw.accent_color,
        accent_color_hex: raw.accent_color.map(accent_color_hex),
        created_at: decode_creation_time(key),
        badges: Badges {
            raw: flags,
            decoded: decode_badges(flags),
        },
        nitro: decode_nitro(raw.premium_type),
        presence,
        fetched_at,
    }
}
