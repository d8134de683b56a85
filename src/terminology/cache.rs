use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub code: String,
    pub code_system: String,
    pub language: String,
}

impl CacheKey {
    pub fn new(code: &str, code_system: &str, language: &str) -> Self {
        Self {
            code: code.trim().to_string(),
            code_system: code_system.trim().trim_start_matches("urn:oid:").to_string(),
            language: language.trim().to_ascii_lowercase(),
        }
    }
}

/// 外部查詢結果（含查無結果）；`resolved_display` 為 None 代表負向快取
#[derive(Debug, Clone)]
pub struct TerminologyCacheEntry {
    pub code: String,
    pub code_system: String,
    pub language: String,
    pub resolved_display: Option<String>,
    pub fetched_at: DateTime<Utc>,
    created: Instant,
}

impl TerminologyCacheEntry {
    fn new(key: &CacheKey, resolved_display: Option<String>) -> Self {
        Self {
            code: key.code.clone(),
            code_system: key.code_system.clone(),
            language: key.language.clone(),
            resolved_display,
            fetched_at: Utc::now(),
            created: Instant::now(),
        }
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.created.elapsed() < ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub lookups: u64,
    pub external_calls: u64,
    pub entries: usize,
}

type Slot = Arc<OnceCell<TerminologyCacheEntry>>;

/// Map size at which a miss first sweeps out expired entries.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// TTL 快取；同一個 key 的並行查詢共用同一次外部呼叫
pub struct TerminologyCache {
    ttl: Duration,
    max_entries: usize,
    slots: RwLock<HashMap<CacheKey, Slot>>,
    lookups: AtomicU64,
    external_calls: AtomicU64,
}

impl TerminologyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
            slots: RwLock::new(HashMap::new()),
            lookups: AtomicU64::new(0),
            external_calls: AtomicU64::new(0),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached outcome for `key`, running `fetch` only when no
    /// fresh entry exists. Concurrent callers for the same key wait on the
    /// single in-flight fetch.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        {
            let slots = self.slots.read().await;
            if let Some(entry) = slots.get(&key).and_then(|slot| slot.get()) {
                if entry.is_fresh(self.ttl) {
                    return entry.resolved_display.clone();
                }
            }
        }

        let slot = {
            let mut slots = self.slots.write().await;
            match slots.get(&key) {
                // 進行中或仍有效的 slot 直接共用
                Some(slot) if slot.get().map_or(true, |entry| entry.is_fresh(self.ttl)) => {
                    slot.clone()
                }
                _ => {
                    if slots.len() >= self.max_entries {
                        let purged = retain_fresh(&mut slots, self.ttl);
                        tracing::debug!("🧹 Terminology cache full, dropped {} expired entries", purged);
                    }
                    let slot: Slot = Arc::new(OnceCell::new());
                    slots.insert(key.clone(), slot.clone());
                    slot
                }
            }
        };

        let entry = slot
            .get_or_init(|| async move {
                self.external_calls.fetch_add(1, Ordering::Relaxed);
                let display = fetch().await;
                TerminologyCacheEntry::new(&key, display)
            })
            .await;
        entry.resolved_display.clone()
    }

    /// The stored outcome for `key`, fresh or not.
    pub async fn entry(&self, key: &CacheKey) -> Option<TerminologyCacheEntry> {
        let slots = self.slots.read().await;
        slots.get(key).and_then(|slot| slot.get()).cloned()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.lookups.load(Ordering::Relaxed),
            external_calls: self.external_calls.load(Ordering::Relaxed),
            entries: self.slots.read().await.len(),
        }
    }
}

/// Keeps fresh and in-flight slots; returns how many were dropped.
fn retain_fresh(slots: &mut HashMap<CacheKey, Slot>, ttl: Duration) -> usize {
    let before = slots.len();
    slots.retain(|_, slot| slot.get().map_or(true, |entry| entry.is_fresh(ttl)));
    before - slots.len()
}
