//! # Conversation Memory
//!
//! Per-user, bounded, time-decaying history of (query, response) exchanges.
//! Volatile: nothing survives a restart.
//!
//! Each user's sequence lives in one slot of a sharded concurrent map, so an
//! append and an eviction sweep on the same user are mutually exclusive while
//! different users rarely contend.

use chrono::{DateTime, Duration as AgeLimit, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Exchanges kept per user (oldest dropped first)
    pub max_history: usize,
    /// Exchanges older than this are evicted by the sweep
    pub max_age_hours: u64,
    /// Interval between background sweeps
    pub cleanup_interval_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: 3,
            max_age_hours: 24,
            cleanup_interval_secs: 3600,
        }
    }
}

impl MemoryConfig {
    /// Saturates at the largest representable span instead of overflowing
    pub fn max_age(&self) -> AgeLimit {
        i64::try_from(self.max_age_hours)
            .ok()
            .and_then(AgeLimit::try_hours)
            .unwrap_or(AgeLimit::MAX)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// One recorded user turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub response: String,
}

/// In-process conversation store shared by every pipeline run
#[derive(Debug)]
pub struct ConversationMemory {
    conversations: DashMap<String, VecDeque<Exchange>>,
    config: MemoryConfig,
    eviction_started: AtomicBool,
    eviction_task: Mutex<Option<JoinHandle<()>>>,
    eviction_passes: AtomicU64,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl ConversationMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            conversations: DashMap::new(),
            config,
            eviction_started: AtomicBool::new(false),
            eviction_task: Mutex::new(None),
            eviction_passes: AtomicU64::new(0),
        }
    }

    /// Record an exchange for a user, dropping the oldest ones beyond
    /// `max_history`.
    pub fn add_exchange(&self, user_id: &str, query: &str, response: &str) {
        let mut history = self.conversations.entry(user_id.to_string()).or_default();
        // stamped while holding the entry so each sequence stays in time order
        history.push_back(Exchange {
            timestamp: Utc::now(),
            query: query.to_string(),
            response: response.to_string(),
        });
        while history.len() > self.config.max_history {
            history.pop_front();
        }
    }

    /// The last `max_items` exchanges for a user, oldest first, as
    /// `User:` / `Assistant:` lines. Empty for unknown users.
    pub fn get_context(&self, user_id: &str, max_items: usize) -> String {
        let Some(history) = self.conversations.get(user_id) else {
            return String::new();
        };

        let skip = history.len().saturating_sub(max_items);
        let mut lines = Vec::with_capacity(2 * (history.len() - skip));
        for exchange in history.iter().skip(skip) {
            lines.push(format!("User: {}", exchange.query));
            lines.push(format!("Assistant: {}\n", exchange.response));
        }
        lines.join("\n")
    }

    /// Snapshot of a user's stored exchanges
    pub fn history(&self, user_id: &str) -> Vec<Exchange> {
        self.conversations
            .get(user_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user_count(&self) -> usize {
        self.conversations.len()
    }

    /// Exchanges stored across all users
    pub fn len(&self) -> usize {
        self.conversations.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget a single user
    pub fn clear_user(&self, user_id: &str) -> bool {
        self.conversations.remove(user_id).is_some()
    }

    /// Number of sweeps run so far
    pub fn eviction_passes(&self) -> u64 {
        self.eviction_passes.load(Ordering::Relaxed)
    }

    /// Drop every exchange older than `max_age`, and every user left with
    /// nothing. Returns the number of exchanges removed.
    pub fn run_eviction_pass(&self) -> usize {
        let cutoff = Utc::now()
            .checked_sub_signed(self.config.max_age())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.evict_older_than(cutoff)
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.conversations.retain(|_, history| {
            // ordered by insertion, so the expired ones form a prefix
            while history.front().is_some_and(|e| e.timestamp < cutoff) {
                history.pop_front();
                removed += 1;
            }
            !history.is_empty()
        });

        self.eviction_passes.fetch_add(1, Ordering::Relaxed);
        if removed > 0 {
            tracing::info!(
                removed,
                users = self.conversations.len(),
                "Evicted expired exchanges"
            );
        } else {
            tracing::debug!(
                users = self.conversations.len(),
                "Eviction pass found nothing to remove"
            );
        }
        removed
    }

    /// Start the recurring sweep. Only the first call spawns a loop; later
    /// calls return `false`. The loop ends on its own once the memory is
    /// dropped.
    pub fn start_background_eviction(self: &Arc<Self>, interval: Duration) -> bool {
        if self
            .eviction_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Background eviction already running");
            return false;
        }

        let memory = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(live) = memory.upgrade() else {
                    break;
                };
                live.run_eviction_pass();
            }
        });

        if let Ok(mut slot) = self.eviction_task.lock() {
            *slot = Some(handle);
        }
        tracing::info!(interval_secs = interval.as_secs(), "Background eviction started");
        true
    }

    /// Stop the recurring sweep, if running
    pub fn stop_background_eviction(&self) {
        if let Ok(mut slot) = self.eviction_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        self.eviction_started.store(false, Ordering::Release);
    }
}

impl Drop for ConversationMemory {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.eviction_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_with_history(max_history: usize) -> ConversationMemory {
        ConversationMemory::new(MemoryConfig {
            max_history,
            ..MemoryConfig::default()
        })
    }

    fn insert_aged(memory: &ConversationMemory, user_id: &str, age: AgeLimit, query: &str) {
        memory
            .conversations
            .entry(user_id.to_string())
            .or_default()
            .push_back(Exchange {
                timestamp: Utc::now() - age,
                query: query.to_string(),
                response: format!("re: {}", query),
            });
    }

    #[test]
    fn test_unknown_user_has_empty_context() {
        let memory = ConversationMemory::default();
        assert_eq!(memory.get_context("nobody", 3), "");
        assert!(memory.history("nobody").is_empty());
    }

    #[test]
    fn test_context_format_and_window() {
        let memory = memory_with_history(10);
        memory.add_exchange("alice", "q1", "r1");
        memory.add_exchange("alice", "q2", "r2");
        memory.add_exchange("alice", "q3", "r3");

        assert_eq!(
            memory.get_context("alice", 2),
            "User: q2\nAssistant: r2\n\nUser: q3\nAssistant: r3\n"
        );
        // asking for more than stored returns everything
        assert!(memory.get_context("alice", 50).starts_with("User: q1\n"));
        assert_eq!(memory.get_context("alice", 0), "");
    }

    #[test]
    fn test_history_never_exceeds_capacity() {
        let memory = memory_with_history(3);
        for i in 0..10 {
            memory.add_exchange("bob", &format!("q{}", i), "r");
            assert!(memory.history("bob").len() <= 3);
        }

        let queries: Vec<String> = memory.history("bob").into_iter().map(|e| e.query).collect();
        assert_eq!(queries, vec!["q7", "q8", "q9"]);
    }

    #[test]
    fn test_users_are_isolated() {
        let memory = ConversationMemory::default();
        memory.add_exchange("alice", "mine", "a");
        memory.add_exchange("bob", "theirs", "b");

        assert!(!memory.get_context("alice", 3).contains("theirs"));
        assert_eq!(memory.user_count(), 2);
        assert_eq!(memory.len(), 2);
        assert!(memory.clear_user("bob"));
        assert_eq!(memory.user_count(), 1);
    }

    #[test]
    fn test_eviction_removes_only_expired_prefix() {
        let memory = memory_with_history(10);
        insert_aged(&memory, "carol", AgeLimit::hours(30), "ancient");
        insert_aged(&memory, "carol", AgeLimit::hours(25), "old");
        insert_aged(&memory, "carol", AgeLimit::hours(2), "recent");
        memory.add_exchange("carol", "now", "r");

        let removed = memory.run_eviction_pass();

        assert_eq!(removed, 2);
        let queries: Vec<String> = memory.history("carol").into_iter().map(|e| e.query).collect();
        assert_eq!(queries, vec!["recent", "now"]);
    }

    #[test]
    fn test_eviction_deletes_emptied_users() {
        let memory = ConversationMemory::default();
        insert_aged(&memory, "dave", AgeLimit::hours(48), "stale");
        memory.add_exchange("erin", "fresh", "r");

        memory.run_eviction_pass();

        assert_eq!(memory.user_count(), 1);
        assert_eq!(memory.get_context("dave", 3), "");
        assert_eq!(memory.eviction_passes(), 1);
    }

    #[test]
    fn test_exchange_just_inside_limit_survives() {
        let memory = ConversationMemory::default();
        insert_aged(&memory, "frank", AgeLimit::hours(23), "keep");
        assert_eq!(memory.run_eviction_pass(), 0);
        assert_eq!(memory.history("frank").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_eviction_starts_once() {
        let memory = Arc::new(ConversationMemory::default());
        let interval = Duration::from_secs(3600);

        assert!(memory.start_background_eviction(interval));
        assert!(!memory.start_background_eviction(interval));

        // first tick fires immediately, then one per interval
        tokio::time::sleep(interval * 3 + interval / 2).await;
        assert_eq!(memory.eviction_passes(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_eviction_can_restart_after_stop() {
        let memory = Arc::new(ConversationMemory::default());
        let interval = Duration::from_secs(60);

        assert!(memory.start_background_eviction(interval));
        tokio::time::sleep(interval / 2).await;
        memory.stop_background_eviction();
        let passes = memory.eviction_passes();

        tokio::time::sleep(interval * 5).await;
        assert_eq!(memory.eviction_passes(), passes);

        assert!(memory.start_background_eviction(interval));
    }

    #[test]
    fn test_huge_max_age_saturates() {
        let config = MemoryConfig {
            max_age_hours: 3_000_000_000_000,
            ..MemoryConfig::default()
        };
        assert_eq!(config.max_age(), AgeLimit::MAX);

        let memory = ConversationMemory::new(config);
        insert_aged(&memory, "gina", AgeLimit::hours(10_000), "old but kept");
        memory.add_exchange("gina", "q", "r");

        assert_eq!(memory.run_eviction_pass(), 0);
        assert_eq!(memory.history("gina").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_eviction_survives_huge_max_age() {
        let memory = Arc::new(ConversationMemory::new(MemoryConfig {
            max_age_hours: u64::MAX,
            ..MemoryConfig::default()
        }));
        memory.add_exchange("hank", "q", "r");
        let interval = Duration::from_secs(60);

        assert!(memory.start_background_eviction(interval));
        tokio::time::sleep(interval * 10 - interval / 2).await;

        assert_eq!(memory.eviction_passes(), 10);
        assert_eq!(memory.history("hank").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_stay_ordered() {
        let memory = Arc::new(memory_with_history(1000));
        let mut handles = Vec::new();
        for worker in 0..8 {
            let memory = Arc::clone(&memory);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    memory.add_exchange("shared", &format!("{}-{}", worker, i), "r");
                    if i % 10 == 0 {
                        memory.run_eviction_pass();
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let history = memory.history("shared");
        assert_eq!(history.len(), 400);
        assert!(history
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }
}
