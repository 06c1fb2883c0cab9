//! Live presence index fed by the real-time gateway connection.
//!
//! Presence is keyed by guild, then by member. The aggregator resolves an
//! entity's presence by scanning guilds in iteration order; the first guild
//! that carries a record for the entity wins.

use std::sync::Arc;

use dashmap::DashMap;
use profilecache_core::{EntityKey, PresenceSnapshot, RawPresence, decode_presence};

/// Guild id to per-member presence records.
#[derive(Debug, Default)]
pub struct PresenceIndex {
    guilds: DashMap<String, DashMap<EntityKey, RawPresence>>,
}

impl PresenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) the presence of `member` in `guild`.
    pub fn upsert_presence(&self, guild: &str, member: EntityKey, presence: RawPresence) {
        self.guilds
            .entry(guild.to_string())
            .or_default()
            .insert(member, presence);
    }

    /// Forgets `member` in `guild`. Empty guilds are kept until removed.
    pub fn remove_member(&self, guild: &str, member: &EntityKey) -> Option<RawPresence> {
        self.guilds
            .get(guild)
            .and_then(|members| members.remove(member).map(|(_, p)| p))
    }

    /// Forgets every presence recorded for `guild`.
    pub fn remove_guild(&self, guild: &str) -> bool {
        self.guilds.remove(guild).is_some()
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    fn find(&self, member: &EntityKey) -> Option<RawPresence> {
        self.guilds
            .iter()
            .find_map(|members| members.get(member).map(|p| p.value().clone()))
    }
}

/// Read side of the presence index.
#[derive(Debug, Clone, Default)]
pub struct PresenceAggregator {
    index: Arc<PresenceIndex>,
}

impl PresenceAggregator {
    pub fn new(index: Arc<PresenceIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<PresenceIndex> {
        &self.index
    }

    /// Current presence of `key`, or the offline snapshot when no guild
    /// knows the entity. Never fails.
    pub fn snapshot(&self, key: &EntityKey) -> PresenceSnapshot {
        match self.index.find(key) {
            Some(raw) => decode_presence(&raw),
            None => PresenceSnapshot::offline(),
        }
    }
}
