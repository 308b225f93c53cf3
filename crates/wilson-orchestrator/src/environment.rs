//! Explicit wiring of the whole core — the alternative to global
//! singletons. Build once at boot; nothing is replaced at runtime.

use crate::coordinator::Coordinator;
use crate::feedback::FeedbackBus;
use crate::manager::{DependencyNeededHandler, ErrorPatternHandler, SuccessHandler, TaskManager};
use crate::store::TaskStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use wilson_agent::AgentDeps;
use wilson_core::{FeedbackType, WilsonConfig, WilsonResult};
use wilson_llm::{ModelManager, Purpose};
use wilson_tools::{builtin_registry, AuditLog, ToolExecutor};

pub struct Environment {
    pub config: WilsonConfig,
    pub store: Arc<TaskStore>,
    pub manager: Arc<TaskManager>,
    pub models: Arc<ModelManager>,
    pub executor: Arc<ToolExecutor>,
    pub bus: Arc<FeedbackBus>,
    pub coordinator: Arc<Coordinator>,
    consumer: JoinHandle<()>,
}

impl Environment {
    /// Wire store → manager → bus → models → tools → coordinator from
    /// configuration, register the default agents and feedback handlers,
    /// and start the feedback consumer.
    pub async fn bootstrap(config: WilsonConfig) -> WilsonResult<Self> {
        let store = Arc::new(TaskStore::open(&config.context.db_path).await?);

        let models = Arc::new(ModelManager::new());
        for (purpose_name, settings) in &config.llms {
            let purpose = Purpose::parse(purpose_name)?;
            models.register(purpose, settings.clone())?;
        }

        let audit = if config.audit.enabled {
            Arc::new(AuditLog::new(PathBuf::from(&config.audit.path)))
        } else {
            Arc::new(AuditLog::disabled())
        };
        let executor = Arc::new(ToolExecutor::new(Arc::new(builtin_registry()), audit));

        let manager = Arc::new(TaskManager::new(store.clone()));
        let bus = Arc::new(FeedbackBus::new(store.clone()));
        bus.register_handler(
            FeedbackType::DependencyNeeded,
            Arc::new(DependencyNeededHandler::new(manager.clone())),
        )
        .await;
        bus.register_handler(
            FeedbackType::Success,
            Arc::new(SuccessHandler::new(manager.clone())),
        )
        .await;
        bus.register_handler(
            FeedbackType::ErrorPattern,
            Arc::new(ErrorPatternHandler::new(manager.clone())),
        )
        .await;
        let consumer = bus.spawn_consumer();

        let deps = AgentDeps {
            executor: executor.clone(),
            feedback: bus.sender(),
            store: store.clone(),
        };
        let coordinator = Arc::new(Coordinator::new(
            manager.clone(),
            models.clone(),
            deps,
            config.max_concurrent,
        ));
        coordinator.register_default_agents().await;

        Ok(Self {
            config,
            store,
            manager,
            models,
            executor,
            bus,
            coordinator,
            consumer,
        })
    }

    /// Stop background machinery. Running delegations finish on their
    /// own; model leases release as usual.
    pub fn shutdown(&self) {
        self.models.stop();
        self.consumer.abort();
    }
}
