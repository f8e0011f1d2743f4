use std::time::Duration;

use moka::sync::Cache;

/// Short-TTL cache holding the raw result payload of a paid checkout, keyed
/// by the provider's session id. The frontend polls the order-by-session
/// endpoint once after redirect; the entry is consumed on first read and
/// expires on its own otherwise. The durable copy always lives on the order
/// row, so losing an entry (restart, second instance) only degrades to the
/// stored result.
#[derive(Debug)]
pub struct ResultCache {
    entries: Cache<String, String>,
}

impl ResultCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
    pub const DEFAULT_CAPACITY: u64 = 10_000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }

    pub fn insert(&self, session_id: &str, payload: String) {
        self.entries.insert(session_id.to_owned(), payload);
    }

    /// Returns and removes the cached payload, if still present.
    pub fn take(&self, session_id: &str) -> Option<String> {
        let payload = self.entries.get(session_id)?;
        self.entries.invalidate(session_id);
        Some(payload)
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
