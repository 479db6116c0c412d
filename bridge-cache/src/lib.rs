//! # Bridge Cache
//!
//! The List Cache (spec §4.6): a per-bridge TTL cache fronting
//! `tools/list`, `resources/list`, `resources/templates/list`, and
//! `prompts/list`, invalidated wholesale by the matching
//! `notifications/*/list_changed` frame.
//!
//! Entries are keyed by [`CacheKind`] only — one aggregate payload per kind,
//! not per cursor, per spec §4.6 ("cursored subsequent pages are not cached
//! separately"). Eviction is lazy: a stale entry is simply treated as a miss
//! the next time it's read, never proactively swept.
//!
//! Grounded on the `DashMap`-backed shared-state pattern the teacher uses for
//! its own per-session maps (`ahma_http_bridge::session::SessionManager`);
//! unlike those maps this one is read/written only from the bridge's single
//! serialized MCP task, so a `DashMap` is a touch more concurrency than
//! strictly required, but keeps the same idiom as the rest of the daemon and
//! leaves the door open if that assumption ever changes.

use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

/// The four listing kinds a bridge caches (spec §3 "Cache entry").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Tools,
    Resources,
    ResourceTemplates,
    Prompts,
}

impl CacheKind {
    /// The `notifications/<kind>/list_changed` method name this kind is
    /// invalidated by.
    pub fn notification_method(self) -> &'static str {
        match self {
            CacheKind::Tools => "notifications/tools/list_changed",
            CacheKind::Resources => "notifications/resources/list_changed",
            CacheKind::ResourceTemplates => "notifications/resources/list_changed",
            CacheKind::Prompts => "notifications/prompts/list_changed",
        }
    }
}

struct Entry {
    payload: Value,
    inserted_at: Instant,
}

/// A per-bridge TTL cache for the four list operations.
pub struct ListCache {
    ttl: Duration,
    entries: DashMap<CacheKind, Entry>,
}

impl ListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }
}

impl Default for ListCache {
    /// The spec's default TTL (5 minutes, spec §6 `ttlMs`).
    fn default() -> Self {
        Self::new(Duration::from_millis(bridge_common::constants::DEFAULT_TTL_MS))
    }
}

impl ListCache {

    /// Returns the cached payload for `kind`, or `None` on a miss or an
    /// expired entry. An expired entry is dropped on the way out.
    pub fn get(&self, kind: CacheKind) -> Option<Value> {
        let expired = match self.entries.get(&kind) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(&kind);
            return None;
        }
        self.entries.get(&kind).map(|entry| entry.payload.clone())
    }

    /// Records the aggregate payload for `kind`, replacing any prior entry.
    pub fn put(&self, kind: CacheKind, payload: Value) {
        self.entries.insert(
            kind,
            Entry {
                payload,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops the cached entry for `kind`, matching a
    /// `notifications/*/list_changed` frame (spec §4.5, §4.6).
    pub fn invalidate(&self, kind: CacheKind) {
        self.entries.remove(&kind);
    }

    /// Dispatches an inbound notification method name to the kind(s) it
    /// invalidates, if any. Unrecognized methods are a no-op — the bridge
    /// forwards everything it doesn't understand (spec §9 passthrough).
    pub fn invalidate_for_notification(&self, method: &str) {
        match method {
            "notifications/tools/list_changed" => self.invalidate(CacheKind::Tools),
            "notifications/resources/list_changed" => {
                self.invalidate(CacheKind::Resources);
                self.invalidate(CacheKind::ResourceTemplates);
            }
            "notifications/prompts/list_changed" => self.invalidate(CacheKind::Prompts),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn miss_on_empty_cache() {
        let cache = ListCache::new(Duration::from_secs(300));
        assert!(cache.get(CacheKind::Tools).is_none());
    }

    #[test]
    fn hit_after_put() {
        let cache = ListCache::new(Duration::from_secs(300));
        cache.put(CacheKind::Tools, json!(["echo", "add"]));
        assert_eq!(cache.get(CacheKind::Tools), Some(json!(["echo", "add"])));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = ListCache::new(Duration::from_millis(1));
        cache.put(CacheKind::Prompts, json!([]));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(CacheKind::Prompts).is_none());
    }

    #[test]
    fn list_changed_notification_invalidates_matching_kind_only() {
        let cache = ListCache::new(Duration::from_secs(300));
        cache.put(CacheKind::Tools, json!([]));
        cache.put(CacheKind::Prompts, json!([]));
        cache.invalidate_for_notification("notifications/tools/list_changed");
        assert!(cache.get(CacheKind::Tools).is_none());
        assert!(cache.get(CacheKind::Prompts).is_some());
    }

    #[test]
    fn resources_notification_invalidates_templates_too() {
        let cache = ListCache::new(Duration::from_secs(300));
        cache.put(CacheKind::Resources, json!([]));
        cache.put(CacheKind::ResourceTemplates, json!([]));
        cache.invalidate_for_notification("notifications/resources/list_changed");
        assert!(cache.get(CacheKind::Resources).is_none());
        assert!(cache.get(CacheKind::ResourceTemplates).is_none());
    }

    #[test]
    fn unrecognized_notification_is_a_noop() {
        let cache = ListCache::new(Duration::from_secs(300));
        cache.put(CacheKind::Tools, json!(["echo"]));
        cache.invalidate_for_notification("notifications/progress");
        assert!(cache.get(CacheKind::Tools).is_some());
    }
}
