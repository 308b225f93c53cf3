use crate::client::LlmClient;
use crate::providers::build_client;
use crate::purpose::Purpose;
use crate::types::{GenerateRequest, GenerateResponse};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use wilson_core::{LlmSettings, WilsonError, WilsonResult};

/// Safety-net cadence; the per-instance one-shot timer is the primary
/// eviction path.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Registered {
    client: Arc<dyn LlmClient>,
    settings: LlmSettings,
}

#[derive(Debug)]
struct InstanceState {
    ref_count: u32,
    last_used: Instant,
    unload_timer: Option<JoinHandle<()>>,
}

/// One live model per registered purpose.
///
/// `state` is a separate fine-grained lock so acquisitions of different
/// purposes never serialise on the manager lock.
#[derive(Debug)]
pub struct ModelInstance {
    purpose: Purpose,
    client: Arc<dyn LlmClient>,
    keep_alive: bool,
    idle_timeout: Duration,
    state: Mutex<InstanceState>,
}

impl ModelInstance {
    fn new(purpose: Purpose, client: Arc<dyn LlmClient>, settings: &LlmSettings) -> Self {
        Self {
            purpose,
            client,
            keep_alive: settings.keep_alive,
            idle_timeout: Duration::from_secs(settings.idle_timeout),
            state: Mutex::new(InstanceState {
                ref_count: 0,
                last_used: Instant::now(),
                unload_timer: None,
            }),
        }
    }

    fn is_evictable(&self) -> bool {
        !self.keep_alive && self.state.lock().ref_count == 0
    }
}

#[derive(Debug)]
struct ManagerInner {
    clients: Mutex<HashMap<Purpose, Registered>>,
    instances: Mutex<HashMap<Purpose, Arc<ModelInstance>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ManagerInner {
    /// Delete the map entry for `purpose` iff it still holds exactly
    /// `instance` and that instance is idle and unpinned. Eviction is
    /// keyed by instance identity, not purpose alone: a stale timer or
    /// lease must never remove a replacement instance that has since
    /// taken the slot.
    fn remove_if_idle(&self, purpose: Purpose, instance: &Arc<ModelInstance>) -> bool {
        let mut instances = self.instances.lock();
        match instances.get(&purpose) {
            Some(current) if Arc::ptr_eq(current, instance) && current.is_evictable() => {
                instances.remove(&purpose);
                debug!(purpose = %purpose, "Unloaded idle model instance");
                true
            }
            _ => false,
        }
    }

    fn sweep(&self) {
        let idle: Vec<(Purpose, Arc<ModelInstance>)> = {
            let instances = self.instances.lock();
            instances
                .iter()
                .filter(|(_, i)| i.is_evictable())
                .map(|(p, i)| (*p, i.clone()))
                .collect()
        };
        for (purpose, instance) in idle {
            self.remove_if_idle(purpose, &instance);
        }
    }
}

/// Owns the pool of LLM clients keyed by purpose; reference-counts
/// in-flight use, unloads idle non-pinned models, and provides the
/// purpose→chat fallback.
pub struct ModelManager {
    inner: Arc<ManagerInner>,
}

impl ModelManager {
    /// Create a manager and start the background sweeper.
    pub fn new() -> Self {
        let inner = Arc::new(ManagerInner {
            clients: Mutex::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
        });

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let sweeper_inner = inner.clone();
            let sweeper = handle.spawn(async move {
                let mut interval = tokio::time::interval(SWEEP_INTERVAL);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    sweeper_inner.sweep();
                }
            });
            *inner.sweeper.lock() = Some(sweeper);
        }

        Self { inner }
    }

    /// Register a client for a purpose, constructed from settings.
    /// Fails for unknown providers.
    pub fn register(&self, purpose: Purpose, settings: LlmSettings) -> WilsonResult<()> {
        let client = build_client(&settings)?;
        self.register_client(purpose, client, settings);
        Ok(())
    }

    /// Register a pre-built client (test seam and embedder hook).
    pub fn register_client(
        &self,
        purpose: Purpose,
        client: Arc<dyn LlmClient>,
        settings: LlmSettings,
    ) {
        debug!(purpose = %purpose, model = %settings.model, "Registered model");
        self.inner
            .clients
            .lock()
            .insert(purpose, Registered { client, settings });
    }

    /// Acquire a model for a purpose, falling back to `chat` when the
    /// purpose has no registered client.
    ///
    /// The returned lease releases on drop; while any lease for a purpose
    /// is alive the instance cannot be unloaded.
    pub fn acquire(&self, purpose: Purpose) -> WilsonResult<ModelLease> {
        let (client, settings, resolved, used_fallback) = {
            let clients = self.inner.clients.lock();
            if let Some(reg) = clients.get(&purpose) {
                (reg.client.clone(), reg.settings.clone(), purpose, false)
            } else if purpose != Purpose::Chat {
                match clients.get(&Purpose::Chat) {
                    Some(reg) => {
                        warn!(purpose = %purpose, "No client registered, falling back to chat");
                        (reg.client.clone(), reg.settings.clone(), Purpose::Chat, true)
                    }
                    None => return Err(WilsonError::ModelUnavailable(purpose.to_string())),
                }
            } else {
                return Err(WilsonError::ModelUnavailable(purpose.to_string()));
            }
        };

        // Lookup/insert and the ref_count increment share one critical
        // section on the instance map: the sweeper and unload timers
        // (which take the same lock) can never observe a zero count for
        // an instance a caller is mid-acquiring.
        let instance = {
            let mut instances = self.inner.instances.lock();
            let instance = instances
                .entry(resolved)
                .or_insert_with(|| Arc::new(ModelInstance::new(resolved, client, &settings)))
                .clone();
            let mut state = instance.state.lock();
            state.ref_count += 1;
            state.last_used = Instant::now();
            if let Some(timer) = state.unload_timer.take() {
                timer.abort();
            }
            drop(state);
            instance
        };

        Ok(ModelLease {
            instance,
            inner: self.inner.clone(),
            used_fallback,
            released: false,
        })
    }

    /// Convenience: acquire, generate, release. On a generation failure
    /// where the backing model reports unavailable and the purpose is not
    /// already chat, retries once through the chat client.
    pub async fn generate(
        &self,
        purpose: Purpose,
        request: GenerateRequest,
    ) -> WilsonResult<GenerateResponse> {
        let lease = self.acquire(purpose)?;
        let first = lease.client().generate(request.clone()).await;

        match first {
            Ok(resp) => Ok(resp),
            Err(err) if purpose != Purpose::Chat && !lease.used_fallback => {
                if lease.client().is_available().await {
                    return Err(err);
                }
                warn!(purpose = %purpose, error = %err, "Model unavailable, retrying via chat");
                drop(lease);
                let chat = self.acquire(Purpose::Chat)?;
                chat.client().generate(request).await
            }
            Err(err) => Err(err),
        }
    }

    /// Run one sweeper pass immediately. The background task does this
    /// every 60 s; exposed for shutdown paths and tests.
    pub fn sweep_now(&self) {
        self.inner.sweep();
    }

    /// Stop the sweeper and all pending unload timers. Outstanding leases
    /// stay valid; they release as usual.
    pub fn stop(&self) {
        if let Some(sweeper) = self.inner.sweeper.lock().take() {
            sweeper.abort();
        }
        let instances = self.inner.instances.lock();
        for instance in instances.values() {
            if let Some(timer) = instance.state.lock().unload_timer.take() {
                timer.abort();
            }
        }
    }

    // -- Observability (used by the coordinator and tests) --

    pub fn ref_count(&self, purpose: Purpose) -> Option<u32> {
        let instances = self.inner.instances.lock();
        instances.get(&purpose).map(|i| i.state.lock().ref_count)
    }

    pub fn has_instance(&self, purpose: Purpose) -> bool {
        self.inner.instances.lock().contains_key(&purpose)
    }

    pub fn instance_count(&self) -> usize {
        self.inner.instances.lock().len()
    }

    pub fn is_registered(&self, purpose: Purpose) -> bool {
        self.inner.clients.lock().contains_key(&purpose)
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped acquisition of a model instance.
///
/// Releases exactly once: on drop, or earlier via [`ModelLease::release`].
/// A second release is a no-op.
#[derive(Debug)]
pub struct ModelLease {
    instance: Arc<ModelInstance>,
    inner: Arc<ManagerInner>,
    pub used_fallback: bool,
    released: bool,
}

impl ModelLease {
    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.instance.client
    }

    pub fn model(&self) -> &str {
        self.instance.client.model()
    }

    pub fn purpose(&self) -> Purpose {
        self.instance.purpose
    }

    /// Explicitly release the lease ahead of drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let schedule_unload = {
            let mut state = self.instance.state.lock();
            state.ref_count = state.ref_count.saturating_sub(1);
            state.last_used = Instant::now();
            state.ref_count == 0 && !self.instance.keep_alive
        };

        if !schedule_unload {
            return;
        }

        let purpose = self.instance.purpose;
        if self.instance.idle_timeout.is_zero() {
            self.inner.remove_if_idle(purpose, &self.instance);
            return;
        }

        // One-shot unload timer; cancelled (aborted) by re-acquisition.
        // The timer carries its own instance handle so it can only ever
        // evict the instance it was scheduled for.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = self.inner.clone();
                let instance = self.instance.clone();
                let idle_timeout = self.instance.idle_timeout;
                let timer = handle.spawn(async move {
                    tokio::time::sleep(idle_timeout).await;
                    inner.remove_if_idle(purpose, &instance);
                });
                self.instance.state.lock().unload_timer = Some(timer);
            }
            // No runtime left (shutdown path): the sweeper is gone too,
            // so unload eagerly rather than leak the instance.
            Err(_) => {
                self.inner.remove_if_idle(purpose, &self.instance);
            }
        }
    }
}

impl Drop for ModelLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Debug)]
    struct StaticClient {
        model: String,
        reply: String,
        available: AtomicBool,
        fail: AtomicBool,
        calls: AtomicU32,
    }

    impl StaticClient {
        fn new(model: &str, reply: &str) -> Arc<Self> {
            Arc::new(Self {
                model: model.to_string(),
                reply: reply.to_string(),
                available: AtomicBool::new(true),
                fail: AtomicBool::new(false),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmClient for StaticClient {
        async fn generate(&self, _request: GenerateRequest) -> WilsonResult<GenerateResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(WilsonError::Http("connection refused".into()));
            }
            Ok(GenerateResponse {
                content: self.reply.clone(),
                model: self.model.clone(),
                tokens_used: Some(1),
                metadata: HashMap::new(),
            })
        }

        async fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        fn model(&self) -> &str {
            &self.model
        }

        fn provider(&self) -> &str {
            "static"
        }
    }

    fn manager_with_chat() -> (ModelManager, Arc<StaticClient>) {
        let manager = ModelManager::new();
        let chat = StaticClient::new("chat-model", "chat reply");
        manager.register_client(Purpose::Chat, chat.clone(), LlmSettings::new("chat-model"));
        (manager, chat)
    }

    #[tokio::test]
    async fn test_no_client_at_all() {
        let manager = ModelManager::new();
        let err = manager.acquire(Purpose::Code).unwrap_err();
        assert!(matches!(err, WilsonError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_zero_idle_timeout_unloads_immediately() {
        let manager = ModelManager::new();
        let mut settings = LlmSettings::new("m");
        settings.idle_timeout = 0;
        manager.register_client(Purpose::Chat, StaticClient::new("m", "r"), settings);

        let lease = manager.acquire(Purpose::Chat).unwrap();
        assert!(manager.has_instance(Purpose::Chat));
        drop(lease);
        assert!(!manager.has_instance(Purpose::Chat));
    }

    #[tokio::test]
    async fn test_generate_convenience_releases() {
        let (manager, chat) = manager_with_chat();
        let resp = manager
            .generate(
                Purpose::Chat,
                GenerateRequest::new(vec![ChatMessage::user("hi")]),
            )
            .await
            .unwrap();
        assert_eq!(resp.content, "chat reply");
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.ref_count(Purpose::Chat), Some(0));
    }

    #[tokio::test]
    async fn test_generate_retries_via_chat_when_unavailable() {
        let manager = ModelManager::new();
        let chat = StaticClient::new("chat-model", "chat reply");
        let code = StaticClient::new("code-model", "code reply");
        code.fail.store(true, Ordering::SeqCst);
        code.available.store(false, Ordering::SeqCst);

        manager.register_client(Purpose::Chat, chat, LlmSettings::new("chat-model"));
        manager.register_client(Purpose::Code, code, LlmSettings::new("code-model"));

        let resp = manager
            .generate(
                Purpose::Code,
                GenerateRequest::new(vec![ChatMessage::user("hi")]),
            )
            .await
            .unwrap();
        assert_eq!(resp.content, "chat reply");
    }

    #[tokio::test]
    async fn test_generate_does_not_mask_errors_when_available() {
        let manager = ModelManager::new();
        let chat = StaticClient::new("chat-model", "chat reply");
        let code = StaticClient::new("code-model", "code reply");
        code.fail.store(true, Ordering::SeqCst);
        // Still "available": the failure is not an availability problem.

        manager.register_client(Purpose::Chat, chat, LlmSettings::new("chat-model"));
        manager.register_client(Purpose::Code, code, LlmSettings::new("code-model"));

        let err = manager
            .generate(
                Purpose::Code,
                GenerateRequest::new(vec![ChatMessage::user("hi")]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WilsonError::Http(_)));
    }

    #[tokio::test]
    async fn test_stop_cancels_timers() {
        let manager = ModelManager::new();
        let mut settings = LlmSettings::new("m");
        settings.idle_timeout = 5;
        manager.register_client(Purpose::Chat, StaticClient::new("m", "r"), settings);
        drop(manager.acquire(Purpose::Chat).unwrap());
        manager.stop();
        // The instance survives: stop() does not force-unload.
        assert!(manager.has_instance(Purpose::Chat));
    }
}
