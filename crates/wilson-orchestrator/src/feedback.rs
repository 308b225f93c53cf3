//! The feedback bus: a bounded in-process channel with a single consumer
//! that persists every event, dispatches it to the registered handler for
//! its type, and stamps `processed_at`.
//!
//! Delivery is at-least-once: a persistence error never suppresses
//! dispatch, so handlers must be idempotent on task keys.

use crate::store::TaskStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wilson_core::{FeedbackEvent, FeedbackSender, FeedbackType, WilsonResult};

const CHANNEL_CAPACITY: usize = 64;

/// Reaction to one feedback event. Registered per event type.
#[async_trait]
pub trait FeedbackHandler: Send + Sync {
    async fn handle(&self, event: &FeedbackEvent) -> WilsonResult<()>;
}

pub struct FeedbackBus {
    tx: mpsc::Sender<FeedbackEvent>,
    rx: parking_lot::Mutex<Option<mpsc::Receiver<FeedbackEvent>>>,
    handlers: tokio::sync::RwLock<HashMap<FeedbackType, Arc<dyn FeedbackHandler>>>,
    store: Arc<TaskStore>,
}

impl FeedbackBus {
    pub fn new(store: Arc<TaskStore>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            rx: parking_lot::Mutex::new(Some(rx)),
            handlers: tokio::sync::RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Producer handle. Cloneable; blocks up to 2 s when the bus is full.
    pub fn sender(&self) -> FeedbackSender {
        FeedbackSender::new(self.tx.clone())
    }

    pub async fn register_handler(
        &self,
        feedback_type: FeedbackType,
        handler: Arc<dyn FeedbackHandler>,
    ) {
        debug!(feedback_type = %feedback_type, "Registered feedback handler");
        self.handlers.write().await.insert(feedback_type, handler);
    }

    /// Start the single consumer loop. Events are processed strictly in
    /// arrival order; call once.
    pub fn spawn_consumer(self: &Arc<Self>) -> JoinHandle<()> {
        let bus = self.clone();
        let rx = self.rx.lock().take();
        tokio::spawn(async move {
            let Some(mut rx) = rx else {
                error!("Feedback consumer already started");
                return;
            };
            info!("Feedback consumer started");
            while let Some(event) = rx.recv().await {
                bus.process(event).await;
            }
            info!("Feedback consumer stopped");
        })
    }

    async fn process(&self, mut event: FeedbackEvent) {
        debug!(
            task = %event.task_key,
            feedback_type = %event.feedback_type,
            severity = %event.severity,
            "Processing feedback"
        );

        // Persist first; on failure still dispatch (at-least-once).
        match self.store.insert_feedback(&event).await {
            Ok(id) => event.id = id,
            Err(e) => warn!(task = %event.task_key, error = %e, "Could not persist feedback"),
        }

        let handler = self.handlers.read().await.get(&event.feedback_type).cloned();
        match handler {
            Some(handler) => {
                if let Err(e) = handler.handle(&event).await {
                    error!(
                        task = %event.task_key,
                        feedback_type = %event.feedback_type,
                        error = %e,
                        "Feedback handler failed"
                    );
                }
            }
            None => {
                warn!(
                    feedback_type = %event.feedback_type,
                    "No handler registered, dropping feedback event"
                );
            }
        }

        if event.id != 0 {
            event.processed_at = Some(Utc::now());
            if let Err(e) = self.store.mark_feedback_processed(event.id).await {
                warn!(id = event.id, error = %e, "Could not stamp processed_at");
            }
        }
    }
}
