//! Model lifecycle invariants: refcount pairing, chat fallback,
//! keep-alive pinning, idle unload, double-release, and acquire/sweeper
//! atomicity.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wilson_core::{LlmSettings, WilsonResult};
use wilson_llm::{GenerateRequest, GenerateResponse, LlmClient, ModelManager, Purpose};

#[derive(Debug)]
struct StaticClient {
    model: String,
}

impl StaticClient {
    fn new(model: &str) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for StaticClient {
    async fn generate(&self, _request: GenerateRequest) -> WilsonResult<GenerateResponse> {
        Ok(GenerateResponse {
            content: "ok".to_string(),
            model: self.model.clone(),
            tokens_used: Some(1),
            metadata: HashMap::new(),
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "static"
    }
}

fn settings(model: &str, idle_timeout: u64, keep_alive: bool) -> LlmSettings {
    let mut settings = LlmSettings::new(model);
    settings.idle_timeout = idle_timeout;
    settings.keep_alive = keep_alive;
    settings
}

#[tokio::test]
async fn refcount_pairs_with_release_and_never_goes_negative() {
    let manager = ModelManager::new();
    manager.register_client(
        Purpose::Chat,
        StaticClient::new("chat-model"),
        settings("chat-model", 300, false),
    );

    let first = manager.acquire(Purpose::Chat).unwrap();
    assert_eq!(manager.ref_count(Purpose::Chat), Some(1));
    let second = manager.acquire(Purpose::Chat).unwrap();
    assert_eq!(manager.ref_count(Purpose::Chat), Some(2));

    drop(first);
    assert_eq!(manager.ref_count(Purpose::Chat), Some(1));
    drop(second);
    assert_eq!(manager.ref_count(Purpose::Chat), Some(0));
}

/// Only `chat` is registered; acquiring `code` yields the chat client,
/// flags the fallback, and counts against the chat instance.
#[tokio::test]
async fn fallback_acquisition_uses_chat() {
    let manager = ModelManager::new();
    manager.register_client(
        Purpose::Chat,
        StaticClient::new("chat-model"),
        settings("chat-model", 300, false),
    );

    let lease = manager.acquire(Purpose::Code).unwrap();
    assert!(lease.used_fallback);
    assert_eq!(lease.model(), "chat-model");
    assert_eq!(lease.purpose(), Purpose::Chat);
    assert_eq!(manager.ref_count(Purpose::Chat), Some(1));
    assert!(!manager.has_instance(Purpose::Code));

    drop(lease);
    assert_eq!(manager.ref_count(Purpose::Chat), Some(0));
}

#[tokio::test(start_paused = true)]
async fn keep_alive_model_survives_idle_and_sweeps() {
    let manager = ModelManager::new();
    manager.register_client(
        Purpose::Chat,
        StaticClient::new("m"),
        settings("m", 1, true),
    );

    drop(manager.acquire(Purpose::Chat).unwrap());
    // Well past both the idle window and several sweeper ticks.
    tokio::time::advance(Duration::from_secs(300)).await;
    tokio::task::yield_now().await;
    manager.sweep_now();
    assert!(manager.has_instance(Purpose::Chat), "pinned model was evicted");
}

#[tokio::test(start_paused = true)]
async fn idle_timeout_unloads_after_window() {
    let manager = ModelManager::new();
    manager.register_client(Purpose::Chat, StaticClient::new("m"), settings("m", 5, false));

    drop(manager.acquire(Purpose::Chat).unwrap());
    assert!(manager.has_instance(Purpose::Chat));

    tokio::time::advance(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;
    assert!(!manager.has_instance(Purpose::Chat));
}

#[tokio::test(start_paused = true)]
async fn reacquire_within_idle_window_cancels_unload() {
    let manager = ModelManager::new();
    manager.register_client(Purpose::Chat, StaticClient::new("m"), settings("m", 5, false));

    drop(manager.acquire(Purpose::Chat).unwrap());
    tokio::time::advance(Duration::from_secs(2)).await;

    let lease = manager.acquire(Purpose::Chat).unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    tokio::task::yield_now().await;
    assert!(manager.has_instance(Purpose::Chat));
    assert_eq!(manager.ref_count(Purpose::Chat), Some(1));
    drop(lease);
}

#[tokio::test]
async fn double_release_is_noop() {
    let manager = ModelManager::new();
    manager.register_client(
        Purpose::Chat,
        StaticClient::new("m"),
        settings("m", 300, false),
    );

    let first = manager.acquire(Purpose::Chat).unwrap();
    let second = manager.acquire(Purpose::Chat).unwrap();

    // Explicit release; the drop that follows inside release() must not
    // decrement a second time.
    first.release();
    assert_eq!(manager.ref_count(Purpose::Chat), Some(1));
    drop(second);
    assert_eq!(manager.ref_count(Purpose::Chat), Some(0));
}

/// A sweep between a lease being handed out and its first use must be a
/// no-op: the count is raised inside the map critical section.
#[tokio::test]
async fn sweep_cannot_evict_a_held_lease() {
    let manager = ModelManager::new();
    manager.register_client(Purpose::Chat, StaticClient::new("m"), settings("m", 0, false));

    let lease = manager.acquire(Purpose::Chat).unwrap();
    for _ in 0..10 {
        manager.sweep_now();
    }
    assert!(manager.has_instance(Purpose::Chat));
    assert_eq!(manager.ref_count(Purpose::Chat), Some(1));

    // With a zero idle timeout the release itself evicts.
    drop(lease);
    assert!(!manager.has_instance(Purpose::Chat));
}

/// Acquire/release must be observably atomic with respect to the
/// sweeper. Zero idle timeout makes every release evict the entry, so
/// each acquire is a first-time insert — the worst case for a sweeper
/// racing the insert. While a lease is held, the map entry must always
/// be present with a non-zero count.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweeper_racing_first_acquire_never_orphans_an_instance() {
    let manager = Arc::new(ModelManager::new());
    manager.register_client(Purpose::Chat, StaticClient::new("m"), settings("m", 0, false));

    let stop = Arc::new(AtomicBool::new(false));
    let sweeper = {
        let manager = manager.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                manager.sweep_now();
                tokio::task::yield_now().await;
            }
        })
    };

    let worker = {
        let manager = manager.clone();
        tokio::spawn(async move {
            for i in 0..2000 {
                let lease = manager.acquire(Purpose::Chat).unwrap();
                let count = manager.ref_count(Purpose::Chat);
                assert!(
                    count.is_some_and(|n| n >= 1),
                    "iteration {i}: held lease but map shows {count:?}"
                );
                assert_eq!(lease.model(), "m");
                drop(lease);
            }
        })
    };

    worker.await.unwrap();
    stop.store(true, Ordering::Relaxed);
    sweeper.await.unwrap();
}
