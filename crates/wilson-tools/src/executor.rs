use crate::audit::{AuditLog, AuditRecord};
use crate::registry::ToolRegistry;
use crate::tool::{RiskLevel, ToolContext};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use wilson_core::{ToolCall, WilsonError, WilsonResult};

/// Asks a human (or policy) whether a risky tool call may proceed.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub tool: String,
    pub risk: RiskLevel,
    pub arguments: serde_json::Value,
    pub query: String,
}

/// Mediates every tool invocation: resolve → validate → confirm →
/// execute → audit.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    audit: Arc<AuditLog>,
    confirmer: Option<Arc<dyn ConfirmationHandler>>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, audit: Arc<AuditLog>) -> Self {
        Self {
            registry,
            audit,
            confirmer: None,
        }
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn ConfirmationHandler>) -> Self {
        self.confirmer = Some(confirmer);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run one tool call. Validation failures produce no audit row (the
    /// call never began executing); declined and executed calls produce
    /// exactly one each.
    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> WilsonResult<String> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| WilsonError::ToolNotFound(call.name.clone()))?;
        let meta = tool.metadata().clone();

        if !meta.enabled {
            return Err(WilsonError::ToolNotFound(format!(
                "{} (disabled)",
                call.name
            )));
        }

        tool.validate(&call.arguments)?;

        let needs_confirm = meta.requires_confirm || meta.risk_level == RiskLevel::Dangerous;
        let mut confirmed = false;
        let mut user_query = None;

        if needs_confirm {
            let query = format!("Allow '{}' ({} risk)?", meta.name, meta.risk_level);
            user_query = Some(query.clone());
            let request = ConfirmationRequest {
                tool: meta.name.clone(),
                risk: meta.risk_level,
                arguments: call.arguments.clone(),
                query,
            };
            let approved = match &self.confirmer {
                Some(handler) => handler.confirm(&request).await,
                // No handler injected counts as denial.
                None => false,
            };
            if !approved {
                warn!(tool = %meta.name, "Tool call declined");
                self.audit.record(AuditRecord {
                    timestamp: Utc::now(),
                    tool: meta.name.clone(),
                    category: meta.category.to_string(),
                    arguments: call.arguments.clone(),
                    result: None,
                    error: Some("user declined".to_string()),
                    duration_ms: 0,
                    confirmed: false,
                    user_declined: true,
                    user_query,
                });
                return Err(WilsonError::ToolDeclined(meta.name));
            }
            confirmed = true;
        }

        debug!(tool = %meta.name, "Executing tool");
        let start = Instant::now();
        let outcome = tool.execute(ctx, &call.arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let record = AuditRecord {
            timestamp: Utc::now(),
            tool: meta.name.clone(),
            category: meta.category.to_string(),
            arguments: call.arguments.clone(),
            result: None,
            error: outcome.as_ref().err().map(std::string::ToString::to_string),
            duration_ms,
            confirmed,
            user_declined: false,
            user_query,
        };
        match &outcome {
            Ok(result) => self.audit.record(record.with_truncated_result(result)),
            Err(_) => self.audit.record(record),
        }

        outcome
    }
}
