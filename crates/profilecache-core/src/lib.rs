pub mod decode;
pub mod error;
pub mod id;
pub mod presence;
pub mod profile;
pub mod time;

pub use decode::{
    MediaKind, decode_activity_kind, decode_badges, decode_creation_time, decode_nitro,
    decode_presence, media_url, normalize,
};
pub use error::{CoreError, Result};
pub use id::EntityKey;
pub use presence::{
    Activity, ActivityEmoji, ActivityKind, ActivityTimestamps, PresenceSnapshot, PresenceStatus,
    RawActivity, RawPresence,
};
pub use profile::{
    Avatar, Badges, Banner, BadgeName, CreatedAt, NitroTier, NormalizedProfile, RawProfile,
};
pub use time::{format_iso8601_millis, now_millis};
