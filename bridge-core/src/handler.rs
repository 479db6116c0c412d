//! The client-side [`ClientHandler`] (spec §4.5 "notification dispatcher").
//!
//! Grounded on the teacher's `InteractiveClient` pattern (exercised in the
//! pack's own `ahma_core` integration tests and mirrored in
//! `zed-industries/codex`'s `exec-server` test harness): a plain struct
//! implementing the trait's default-everything hooks, overriding only the
//! ones this bridge cares about. `*/list_changed` notifications invalidate
//! the List Cache and report up through [`NotificationSink`] — never by
//! calling back into a `BridgeCore` directly, per the "notifies up through a
//! channel, never a callback into the core" design note in spec §9.

use bridge_cache::{CacheKind, ListCache};
use rmcp::ClientHandler;
use rmcp::model::{ClientCapabilities, ClientInfo};
use rmcp::service::{NotificationContext, RoleClient};
use std::sync::Arc;

/// Reported whenever a `*/list_changed` notification invalidates a cache
/// entry, so the bridge daemon can touch the session registry's
/// `notifications.<kind>.listChangedAt` timestamp (spec §3, §4.5).
pub trait NotificationSink: Send + Sync {
    fn on_list_changed(&self, kind: CacheKind);
}

pub struct NoopSink;
impl NotificationSink for NoopSink {
    fn on_list_changed(&self, _kind: CacheKind) {}
}

pub struct BridgeClientHandler {
    cache: Arc<ListCache>,
    sink: Arc<dyn NotificationSink>,
}

impl BridgeClientHandler {
    pub fn new(cache: Arc<ListCache>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { cache, sink }
    }

    fn invalidate(&self, kind: CacheKind) {
        self.cache.invalidate(kind);
        self.sink.on_list_changed(kind);
    }

    /// Exposed for tests: the notification handlers below only adapt
    /// `rmcp`'s callback shape onto this, so exercising it directly avoids
    /// having to construct a real `NotificationContext`.
    #[cfg(test)]
    fn invalidate_for_test(&self, kind: CacheKind) {
        self.invalidate(kind);
    }
}

impl ClientHandler for BridgeClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            capabilities: ClientCapabilities::default(),
            ..Default::default()
        }
    }

    async fn on_tool_list_changed(&self, _context: NotificationContext<RoleClient>) {
        self.invalidate(CacheKind::Tools);
    }

    async fn on_resource_list_changed(&self, _context: NotificationContext<RoleClient>) {
        self.invalidate(CacheKind::Resources);
        self.invalidate(CacheKind::ResourceTemplates);
    }

    async fn on_prompt_list_changed(&self, _context: NotificationContext<RoleClient>) {
        self.invalidate(CacheKind::Prompts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingSink {
        seen: Mutex<Vec<CacheKind>>,
    }

    impl NotificationSink for RecordingSink {
        fn on_list_changed(&self, kind: CacheKind) {
            self.seen.lock().unwrap().push(kind);
        }
    }

    #[test]
    fn tool_list_changed_invalidates_cache_and_notifies_sink() {
        let cache = Arc::new(ListCache::new(Duration::from_secs(300)));
        cache.put(CacheKind::Tools, serde_json::json!([]));
        let sink = Arc::new(RecordingSink { seen: Mutex::new(vec![]) });
        let handler = BridgeClientHandler::new(cache.clone(), sink.clone());

        handler.invalidate_for_test(CacheKind::Tools);

        assert!(cache.get(CacheKind::Tools).is_none());
        assert_eq!(sink.seen.lock().unwrap().as_slice(), &[CacheKind::Tools]);
    }
}
