//! Cache pipeline: memory tier, persistent tier, upstream, stale fallback.
//!
//! ## Resolution order
//!
//! 1. Memory tier, if the entry is unexpired (no I/O).
//! 2. Persistent tier, if the record is within the TTL. The memory entry
//!    expires at `fetched_at + ttl`, so age is never reset by re-reading.
//! 3. Upstream fetch, bounded by the upstream timeout.
//!    - found: decode, write back unless unchanged, cache for the full TTL
//!    - not found / transient failure: serve the freshest record still
//!      known (expired memory entry or persistent record) for the stale
//!      window, otherwise fail
//!
//! `force_refresh` skips steps 1 and 2 but keeps the fallback.
//!
//! With `coalesce_misses` on, concurrent misses for one key share a single
//! run of steps 2 and 3 and all receive its outcome, errors included.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use profilecache_core::{EntityKey, NormalizedProfile, RawProfile, normalize};
use profilecache_storage::{DynProfileStore, StoreError};
use tokio::sync::OnceCell;

use super::clock::{Clock, SystemClock};
use super::memory::{CacheEntry, MemoryTier};
use crate::metrics::{self, tier};
use crate::presence::PresenceAggregator;
use crate::upstream::{FetchOutcome, UpstreamClient, UpstreamError};

/// Tunables for [`CacheManager`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Freshness window (default: 5 minutes).
    pub ttl: Duration,
    /// Window granted to fallback records (default: 30 seconds, capped at `ttl`).
    pub stale_ttl: Duration,
    /// Upper bound on one upstream fetch (default: 10 seconds).
    pub upstream_timeout: Duration,
    /// Collapse concurrent misses for one key into a single upstream call.
    pub coalesce_misses: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            stale_ttl: Duration::from_secs(30),
            upstream_timeout: Duration::from_secs(10),
            coalesce_misses: true,
        }
    }
}

impl CacheSettings {
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_stale_ttl(mut self, stale_ttl: Duration) -> Self {
        self.stale_ttl = stale_ttl;
        self
    }

    #[must_use]
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_coalesce_misses(mut self, coalesce: bool) -> Self {
        self.coalesce_misses = coalesce;
        self
    }

    fn ttl_millis(&self) -> i64 {
        self.ttl.as_millis() as i64
    }

    fn stale_ttl_millis(&self) -> i64 {
        self.stale_ttl.min(self.ttl).as_millis() as i64
    }
}

/// Tier that answered a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSource {
    Memory,
    Persistent,
    Upstream,
    Stale,
}

impl ResolveSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Persistent => "persistent",
            Self::Upstream => "upstream",
            Self::Stale => "stale",
        }
    }
}

/// A successfully resolved profile.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub profile: Arc<NormalizedProfile>,
    pub source: ResolveSource,
    /// Unix millis at which the memory entry backing this answer expires.
    pub expires_at: i64,
}

impl Resolved {
    fn new(profile: Arc<NormalizedProfile>, source: ResolveSource, expires_at: i64) -> Self {
        Self {
            profile,
            source,
            expires_at,
        }
    }

    /// Whether the answer came from a cache tier rather than a fresh fetch.
    pub fn is_cached(&self) -> bool {
        self.source != ResolveSource::Upstream
    }

    pub fn is_stale(&self) -> bool {
        self.source == ResolveSource::Stale
    }

    /// Whole seconds left before the backing memory entry expires.
    pub fn ttl_remaining_secs(&self, now_millis: i64) -> i64 {
        (self.expires_at - now_millis).max(0) / 1000
    }
}

/// Resolution failure after every tier and fallback was tried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    /// The upstream service does not know the entity and nothing is cached.
    #[error("Entity not found: {key}")]
    NotFound { key: EntityKey },

    /// The upstream service failed and nothing is cached.
    #[error("Upstream unavailable for {key}: {source}")]
    Upstream {
        key: EntityKey,
        #[source]
        source: UpstreamError,
    },

    /// The upstream service failed and the persistent tier could not be read.
    #[error("Persistent store unavailable for {key}: {source}")]
    Store {
        key: EntityKey,
        #[source]
        source: Arc<StoreError>,
    },
}

impl ResolveError {
    /// Stable machine-readable code exposed to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "user_not_found",
            Self::Upstream { .. } => "upstream_unavailable",
            Self::Store { .. } => "store_unavailable",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

type MissOutcome = Result<Resolved, ResolveError>;
type InflightKey = (EntityKey, bool);

/// Membership in a shared miss. On drop the map entry is removed once the
/// outcome is known or when no other request still holds the cell, so a
/// cancelled request never leaves an entry behind.
struct InflightSlot<'a> {
    inflight: &'a DashMap<InflightKey, Arc<OnceCell<MissOutcome>>>,
    key: InflightKey,
    cell: Arc<OnceCell<MissOutcome>>,
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let cell = &self.cell;
        self.inflight.remove_if(&self.key, |_, current| {
            // Held by the map and by this slot only.
            Arc::ptr_eq(current, cell) && (cell.initialized() || Arc::strong_count(current) == 2)
        });
    }
}

/// Orchestrates the memory tier, the persistent tier and the upstream client.
pub struct CacheManager {
    memory: Arc<dyn MemoryTier>,
    store: DynProfileStore,
    upstream: Arc<dyn UpstreamClient>,
    presence: PresenceAggregator,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    inflight: DashMap<InflightKey, Arc<OnceCell<MissOutcome>>>,
}

impl CacheManager {
    pub fn new(
        memory: Arc<dyn MemoryTier>,
        store: DynProfileStore,
        upstream: Arc<dyn UpstreamClient>,
        presence: PresenceAggregator,
        settings: CacheSettings,
    ) -> Self {
        Self {
            memory,
            store,
            upstream,
            presence,
            clock: Arc::new(SystemClock),
            settings,
            inflight: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn memory(&self) -> &Arc<dyn MemoryTier> {
        &self.memory
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Resolves the profile of `key`.
    pub async fn resolve(
        &self,
        key: &EntityKey,
        force_refresh: bool,
    ) -> Result<Resolved, ResolveError> {
        if !force_refresh && let Some(hit) = self.memory_hit(key) {
            return Ok(hit);
        }

        if !self.settings.coalesce_misses {
            return self.resolve_miss(key, force_refresh).await;
        }

        let slot = self.join_inflight(key, force_refresh);
        slot.cell
            .get_or_init(|| self.resolve_miss(key, force_refresh))
            .await
            .clone()
    }

    /// Joins the shared miss for `key`, starting one if none is running.
    /// Forced refreshes never share a miss with plain lookups.
    fn join_inflight(&self, key: &EntityKey, force_refresh: bool) -> InflightSlot<'_> {
        let inflight_key = (key.clone(), force_refresh);
        let cell = self
            .inflight
            .entry(inflight_key.clone())
            .or_default()
            .clone();
        InflightSlot {
            inflight: &self.inflight,
            key: inflight_key,
            cell,
        }
    }

    fn memory_hit(&self, key: &EntityKey) -> Option<Resolved> {
        let now = self.clock.now_millis();
        let entry = self.memory.get(key).filter(|e| !e.is_expired(now))?;

        tracing::debug!(key = %key, stale = entry.stale, "memory tier hit");
        if entry.stale {
            metrics::record_cache_hit(tier::STALE);
            return Some(Resolved::new(entry.profile, ResolveSource::Stale, entry.expires_at));
        }
        metrics::record_cache_hit(tier::MEMORY);
        Some(Resolved::new(entry.profile, ResolveSource::Memory, entry.expires_at))
    }

    async fn resolve_miss(
        &self,
        key: &EntityKey,
        force_refresh: bool,
    ) -> Result<Resolved, ResolveError> {
        let ttl = self.settings.ttl_millis();

        let (record, store_error) = match self.store.get(key).await {
            Ok(record) => (record, None),
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    category = %e.category(),
                    "persistent tier read failed"
                );
                metrics::record_store_error("get", e.category().to_string());
                (None, Some(e))
            }
        };

        if !force_refresh
            && let Some(ref record) = record
            && record.age_millis(self.clock.now_millis()) <= ttl
        {
            let expires_at = record.fetched_at + ttl;
            let profile = Arc::new(record.clone().with_presence(self.presence.snapshot(key)));
            self.remember(key, CacheEntry::new(profile.clone(), expires_at));

            tracing::debug!(key = %key, "persistent tier hit");
            metrics::record_cache_hit(tier::PERSISTENT);
            return Ok(Resolved::new(profile, ResolveSource::Persistent, expires_at));
        }

        metrics::record_cache_miss();
        let started = Instant::now();
        let outcome =
            match tokio::time::timeout(self.settings.upstream_timeout, self.upstream.fetch(key))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => FetchOutcome::Transient(UpstreamError::Timeout),
            };
        metrics::record_upstream_request(outcome.label(), started.elapsed());

        match outcome {
            FetchOutcome::Found(raw) => Ok(self.accept_fresh(key, raw, record.as_ref()).await),
            FetchOutcome::NotFound => {
                tracing::info!(key = %key, "upstream reports entity not found");
                self.fall_back(key, record)
                    .ok_or_else(|| ResolveError::NotFound { key: key.clone() })
            }
            FetchOutcome::Transient(error) => {
                tracing::warn!(key = %key, error = %error, "upstream fetch failed");
                if let Some(resolved) = self.fall_back(key, record) {
                    return Ok(resolved);
                }
                Err(match store_error {
                    Some(source) => ResolveError::Store {
                        key: key.clone(),
                        source: Arc::new(source),
                    },
                    None => ResolveError::Upstream {
                        key: key.clone(),
                        source: error,
                    },
                })
            }
        }
    }

    /// Normalizes a fresh upstream record, writes it back when it differs
    /// from the persisted copy and caches it for the full TTL.
    async fn accept_fresh(
        &self,
        key: &EntityKey,
        raw: RawProfile,
        existing: Option<&NormalizedProfile>,
    ) -> Resolved {
        let fetched_at = self.clock.now_millis();
        let profile = normalize(key, raw, fetched_at, self.presence.snapshot(key));

        self.write_back(key, &profile, existing).await;

        let expires_at = fetched_at + self.settings.ttl_millis();
        let profile = Arc::new(profile);
        self.remember(key, CacheEntry::new(profile.clone(), expires_at));
        Resolved::new(profile, ResolveSource::Upstream, expires_at)
    }

    async fn write_back(
        &self,
        key: &EntityKey,
        profile: &NormalizedProfile,
        existing: Option<&NormalizedProfile>,
    ) {
        if let Some(existing) = existing
            && existing.same_content(profile)
        {
            tracing::debug!(key = %key, "profile unchanged, persistent write skipped");
            metrics::record_store_write("suppressed");
            return;
        }

        match self.store.put(key, &profile.persisted()).await {
            Ok(()) => {
                tracing::debug!(key = %key, "profile written to persistent tier");
                metrics::record_store_write("written");
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    category = %e.category(),
                    "persistent tier write failed"
                );
                metrics::record_store_write("failed");
                metrics::record_store_error("put", e.category().to_string());
            }
        }
    }

    /// Serves the freshest record still known for `key`, if any, for the
    /// stale window measured from now.
    fn fall_back(&self, key: &EntityKey, record: Option<NormalizedProfile>) -> Option<Resolved> {
        let in_memory = self.memory.get(key).map(|entry| entry.profile);
        let freshest = match (in_memory, record) {
            (Some(cached), Some(record)) if record.fetched_at > cached.fetched_at => record,
            (Some(cached), _) => (*cached).clone(),
            (None, Some(record)) => record,
            (None, None) => return None,
        };

        let expires_at = self.clock.now_millis() + self.settings.stale_ttl_millis();
        let profile = Arc::new(freshest.with_presence(self.presence.snapshot(key)));
        self.remember(key, CacheEntry::stale(profile.clone(), expires_at));

        tracing::warn!(
            key = %key,
            fetched_at = profile.fetched_at,
            "serving stale profile"
        );
        metrics::record_cache_hit(tier::STALE);
        Some(Resolved::new(profile, ResolveSource::Stale, expires_at))
    }

    fn remember(&self, key: &EntityKey, entry: CacheEntry) {
        self.memory.set(key, entry);
        metrics::set_cache_entries(tier::MEMORY, self.memory.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LocalMemoryTier, ManualClock};
    use crate::presence::PresenceIndex;
    use async_trait::async_trait;
    use profilecache_core::{PresenceSnapshot, PresenceStatus, RawPresence};
    use profilecache_db_memory::InMemoryProfileStore;
    use profilecache_storage::ProfileStore;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const T0: i64 = 1_700_000_000_000;
    const TTL: Duration = Duration::from_secs(300);
    const STALE_TTL: Duration = Duration::from_secs(30);

    #[derive(Clone)]
    enum Reply {
        Found(RawProfile),
        NotFound,
        Transient,
    }

    struct ScriptedUpstream {
        reply: StdMutex<Reply>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedUpstream {
        fn new(reply: Reply) -> Self {
            Self {
                reply: StdMutex::new(reply),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn reply_with(&self, reply: Reply) {
            *self.reply.lock().unwrap() = reply;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpstreamClient for ScriptedUpstream {
        async fn fetch(&self, _key: &EntityKey) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let reply = self.reply.lock().unwrap().clone();
            match reply {
                Reply::Found(raw) => FetchOutcome::Found(raw),
                Reply::NotFound => FetchOutcome::NotFound,
                Reply::Transient => FetchOutcome::Transient(UpstreamError::Status(503)),
            }
        }
    }

    fn raw(username: &str) -> RawProfile {
        RawProfile {
            id: Some("42".into()),
            username: Some(username.into()),
            public_flags: Some(64),
            ..Default::default()
        }
    }

    fn stored(username: &str, fetched_at: i64) -> NormalizedProfile {
        normalize(
            &EntityKey::from("42"),
            raw(username),
            fetched_at,
            PresenceSnapshot::offline(),
        )
    }

    struct Harness {
        manager: CacheManager,
        store: Arc<InMemoryProfileStore>,
        upstream: Arc<ScriptedUpstream>,
        memory: Arc<LocalMemoryTier>,
        presence: Arc<PresenceIndex>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(upstream: ScriptedUpstream, settings: CacheSettings) -> Harness {
        let store = Arc::new(InMemoryProfileStore::new());
        let upstream = Arc::new(upstream);
        let memory = Arc::new(LocalMemoryTier::new());
        let presence = Arc::new(PresenceIndex::new());
        let clock = Arc::new(ManualClock::new(T0));
        let manager = CacheManager::new(
            memory.clone(),
            store.clone(),
            upstream.clone(),
            PresenceAggregator::new(presence.clone()),
            settings,
        )
        .with_clock(clock.clone());
        Harness {
            manager,
            store,
            upstream,
            memory,
            presence,
            clock,
        }
    }

    fn harness(reply: Reply) -> Harness {
        harness_with(
            ScriptedUpstream::new(reply),
            CacheSettings::default()
                .with_ttl(TTL)
                .with_stale_ttl(STALE_TTL),
        )
    }

    fn key() -> EntityKey {
        EntityKey::from("42")
    }

    #[tokio::test]
    async fn cold_miss_fetches_writes_and_caches() {
        let h = harness(Reply::Found(raw("alice")));

        let first = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(first.source, ResolveSource::Upstream);
        assert!(!first.is_cached());
        assert_eq!(first.profile.username.as_deref(), Some("alice"));
        assert_eq!(first.profile.fetched_at, T0);
        assert_eq!(first.expires_at, T0 + 300_000);
        assert_eq!(h.store.write_count(), 1);

        let second = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(second.source, ResolveSource::Memory);
        assert_eq!(second.profile, first.profile);
        assert_eq!(h.upstream.calls(), 1);
    }

    #[tokio::test]
    async fn memory_hit_performs_no_io() {
        let h = harness(Reply::Transient);
        let profile = Arc::new(stored("cached", T0 - 270_000));
        h.memory.set(&key(), CacheEntry::new(profile, T0 + 30_000));

        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::Memory);
        assert_eq!(resolved.ttl_remaining_secs(T0), 30);
        assert_eq!(h.store.read_count(), 0);
        assert_eq!(h.upstream.calls(), 0);
    }

    #[tokio::test]
    async fn fresh_persistent_record_keeps_its_age() {
        let h = harness(Reply::Transient);
        h.store.seed(stored("persisted", T0 - 100_000));

        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::Persistent);
        assert_eq!(resolved.expires_at, T0 - 100_000 + 300_000);
        assert_eq!(h.upstream.calls(), 0);

        let entry = h.memory.get(&key()).unwrap();
        assert_eq!(entry.expires_at, T0 + 200_000);
    }

    #[tokio::test]
    async fn expired_persistent_record_goes_upstream() {
        let h = harness(Reply::Found(raw("renamed")));
        h.store.seed(stored("old", T0 - 400_000));

        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::Upstream);
        assert_eq!(resolved.profile.username.as_deref(), Some("renamed"));
        assert_eq!(h.store.write_count(), 1);
    }

    #[tokio::test]
    async fn unchanged_profile_is_not_rewritten() {
        let h = harness(Reply::Found(raw("same")));
        h.store.seed(stored("same", T0 - 400_000));

        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::Upstream);
        assert_eq!(resolved.profile.fetched_at, T0);
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test]
    async fn presence_is_merged_but_never_persisted() {
        let h = harness(Reply::Found(raw("alice")));
        h.presence.upsert_presence(
            "guild",
            key(),
            RawPresence {
                status: Some("dnd".into()),
                ..Default::default()
            },
        );

        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.profile.presence.status, PresenceStatus::Dnd);

        let persisted = h.store.get(&key()).await.unwrap().unwrap();
        assert!(persisted.presence.is_offline());
    }

    #[tokio::test]
    async fn presence_change_alone_does_not_rewrite() {
        let h = harness(Reply::Found(raw("alice")));
        h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(h.store.write_count(), 1);

        h.presence.upsert_presence(
            "guild",
            key(),
            RawPresence {
                status: Some("online".into()),
                ..Default::default()
            },
        );
        let resolved = h.manager.resolve(&key(), true).await.unwrap();
        assert_eq!(resolved.profile.presence.status, PresenceStatus::Online);
        assert_eq!(h.store.write_count(), 1);
    }

    #[tokio::test]
    async fn transient_failure_serves_stale_persistent_record() {
        let h = harness(Reply::Transient);
        h.store.seed(stored("old", T0 - 3_600_000));

        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::Stale);
        assert!(resolved.is_cached());
        assert!(resolved.is_stale());
        assert_eq!(resolved.profile.username.as_deref(), Some("old"));
        assert_eq!(resolved.expires_at, T0 + 30_000);

        // Served from memory for the stale window, then retried.
        let again = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(again.source, ResolveSource::Stale);
        assert_eq!(h.upstream.calls(), 1);

        h.clock.advance(Duration::from_secs(31));
        h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(h.upstream.calls(), 2);
    }

    #[tokio::test]
    async fn not_found_without_records_fails() {
        let h = harness(Reply::NotFound);
        let err = h.manager.resolve(&key(), false).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.code(), "user_not_found");
        assert_eq!(h.store.write_count(), 0);
        assert!(h.memory.get(&key()).is_none());
    }

    #[tokio::test]
    async fn not_found_with_record_serves_stale() {
        let h = harness(Reply::NotFound);
        h.store.seed(stored("gone", T0 - 3_600_000));

        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::Stale);
        assert_eq!(resolved.profile.username.as_deref(), Some("gone"));
    }

    #[tokio::test]
    async fn transient_failure_without_records_is_upstream_error() {
        let h = harness(Reply::Transient);
        let err = h.manager.resolve(&key(), false).await.unwrap_err();
        assert!(matches!(err, ResolveError::Upstream { .. }));
        assert_eq!(err.code(), "upstream_unavailable");
    }

    #[tokio::test]
    async fn store_outage_with_upstream_failure_is_store_error() {
        let h = harness(Reply::Transient);
        h.store.set_unavailable(true);

        let err = h.manager.resolve(&key(), false).await.unwrap_err();
        assert!(matches!(err, ResolveError::Store { .. }));
        assert_eq!(err.code(), "store_unavailable");
    }

    #[tokio::test]
    async fn store_outage_does_not_fail_fresh_fetch() {
        let h = harness(Reply::Found(raw("alice")));
        h.store.set_unavailable(true);

        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::Upstream);
        assert_eq!(h.store.write_count(), 0);

        let again = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(again.source, ResolveSource::Memory);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_fresh_tiers() {
        let h = harness(Reply::Found(raw("alice")));
        h.manager.resolve(&key(), false).await.unwrap();

        h.upstream.reply_with(Reply::Found(raw("alice2")));
        h.clock.advance(Duration::from_secs(1));
        let forced = h.manager.resolve(&key(), true).await.unwrap();
        assert_eq!(forced.source, ResolveSource::Upstream);
        assert_eq!(forced.profile.username.as_deref(), Some("alice2"));
        assert_eq!(h.upstream.calls(), 2);
        assert_eq!(h.store.write_count(), 2);
    }

    #[tokio::test]
    async fn force_refresh_falls_back_to_memory_entry() {
        let h = harness(Reply::Found(raw("alice")));
        h.manager.resolve(&key(), false).await.unwrap();

        h.upstream.reply_with(Reply::Transient);
        h.clock.advance(Duration::from_secs(10));
        let forced = h.manager.resolve(&key(), true).await.unwrap();
        assert_eq!(forced.source, ResolveSource::Stale);
        assert_eq!(forced.profile.username.as_deref(), Some("alice"));
        assert_eq!(forced.profile.fetched_at, T0);
    }

    #[tokio::test]
    async fn fallback_prefers_fresher_record() {
        let h = harness(Reply::Transient);
        h.memory.set(
            &key(),
            CacheEntry::new(Arc::new(stored("memory", T0 - 900_000)), T0 - 600_000),
        );
        h.store.seed(stored("persisted", T0 - 500_000));

        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::Stale);
        assert_eq!(resolved.profile.username.as_deref(), Some("persisted"));
    }

    #[tokio::test]
    async fn memory_expiry_triggers_refetch() {
        let h = harness(Reply::Found(raw("alice")));
        h.manager.resolve(&key(), false).await.unwrap();

        h.clock.advance(Duration::from_secs(301));
        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::Upstream);
        assert_eq!(h.upstream.calls(), 2);
        // Unchanged content: only the first fetch was written.
        assert_eq!(h.store.write_count(), 1);
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let h = harness_with(
            ScriptedUpstream::new(Reply::Found(raw("late"))).with_delay(Duration::from_secs(5)),
            CacheSettings::default().with_upstream_timeout(Duration::from_millis(50)),
        );

        let err = h.manager.resolve(&key(), false).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Upstream {
                source: UpstreamError::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn concurrent_misses_are_coalesced() {
        let h = harness_with(
            ScriptedUpstream::new(Reply::Found(raw("alice"))).with_delay(Duration::from_millis(50)),
            CacheSettings::default(),
        );
        let key = key();

        let results = futures_util::future::join_all(
            (0..8).map(|_| h.manager.resolve(&key, false)),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(h.upstream.calls(), 1);
        assert_eq!(h.store.write_count(), 1);
        assert!(h.manager.inflight.is_empty());
    }

    #[tokio::test]
    async fn concurrent_transient_failures_share_one_fetch() {
        let h = harness_with(
            ScriptedUpstream::new(Reply::Transient).with_delay(Duration::from_millis(100)),
            CacheSettings::default(),
        );
        let key = key();

        let started = Instant::now();
        let results = futures_util::future::join_all(
            (0..8).map(|_| h.manager.resolve(&key, false)),
        )
        .await;

        assert_eq!(h.upstream.calls(), 1);
        assert!(started.elapsed() < Duration::from_millis(800));
        for result in results {
            let err = result.unwrap_err();
            assert_eq!(err.code(), "upstream_unavailable");
        }
        assert!(h.manager.inflight.is_empty());
    }

    #[tokio::test]
    async fn concurrent_not_found_share_one_fetch() {
        let h = harness_with(
            ScriptedUpstream::new(Reply::NotFound).with_delay(Duration::from_millis(50)),
            CacheSettings::default(),
        );
        let key = key();

        let results = futures_util::future::join_all(
            (0..8).map(|_| h.manager.resolve(&key, false)),
        )
        .await;

        assert_eq!(h.upstream.calls(), 1);
        assert!(results.iter().all(|r| matches!(r, Err(e) if e.is_not_found())));
        assert!(h.manager.inflight.is_empty());
    }

    #[tokio::test]
    async fn failed_miss_is_not_reused_by_later_requests() {
        let h = harness(Reply::Transient);
        assert!(h.manager.resolve(&key(), false).await.is_err());

        h.upstream.reply_with(Reply::Found(raw("back")));
        let resolved = h.manager.resolve(&key(), false).await.unwrap();
        assert_eq!(resolved.source, ResolveSource::Upstream);
        assert_eq!(h.upstream.calls(), 2);
    }

    #[tokio::test]
    async fn forced_refresh_does_not_join_plain_miss() {
        let h = harness_with(
            ScriptedUpstream::new(Reply::Found(raw("alice"))).with_delay(Duration::from_millis(50)),
            CacheSettings::default(),
        );
        let key = key();

        let (plain, forced) = tokio::join!(
            h.manager.resolve(&key, false),
            h.manager.resolve(&key, true)
        );
        assert!(plain.is_ok());
        assert_eq!(forced.unwrap().source, ResolveSource::Upstream);
        assert_eq!(h.upstream.calls(), 2);
    }

    #[tokio::test]
    async fn cancelled_request_leaves_no_inflight_entry() {
        let h = harness_with(
            ScriptedUpstream::new(Reply::Found(raw("late"))).with_delay(Duration::from_secs(5)),
            CacheSettings::default(),
        );
        let key = key();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), h.manager.resolve(&key, false)).await;
        assert!(cancelled.is_err());
        assert!(h.manager.inflight.is_empty());
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_disturb_shared_miss() {
        let h = harness_with(
            ScriptedUpstream::new(Reply::Found(raw("alice"))).with_delay(Duration::from_millis(100)),
            CacheSettings::default(),
        );
        let key = key();

        let (leader, waiter) = tokio::join!(
            h.manager.resolve(&key, false),
            tokio::time::timeout(Duration::from_millis(20), h.manager.resolve(&key, false))
        );
        assert_eq!(leader.unwrap().source, ResolveSource::Upstream);
        assert!(waiter.is_err());
        assert_eq!(h.upstream.calls(), 1);
        assert!(h.manager.inflight.is_empty());
    }

    #[tokio::test]
    async fn uncoalesced_misses_each_fetch() {
        let h = harness_with(
            ScriptedUpstream::new(Reply::Found(raw("alice"))).with_delay(Duration::from_millis(50)),
            CacheSettings::default().with_coalesce_misses(false),
        );
        let key = key();

        let results = futures_util::future::join_all(
            (0..4).map(|_| h.manager.resolve(&key, false)),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(h.upstream.calls(), 4);
    }
}
