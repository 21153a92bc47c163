//! One structured event per analysis request.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::circuit_breaker::CircuitState;
use crate::security::ModerationCategory;
use crate::Operation;

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Served,
    CacheHit,
    Rejected,
    RateLimited,
    Blocked,
    CircuitOpen,
    Failed,
}

impl AuditOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Served => "served",
            Self::CacheHit => "cache_hit",
            Self::Rejected => "rejected",
            Self::RateLimited => "rate_limited",
            Self::Blocked => "blocked",
            Self::CircuitOpen => "circuit_open",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub operation_id: Uuid,
    pub principal: String,
    pub operation: Operation,
    pub outcome: AuditOutcome,
    /// Backend that served or last failed the request.
    pub backend: Option<String>,
    pub from_cache: bool,
    pub elapsed_ms: u64,
    pub moderation_flags: BTreeSet<ModerationCategory>,
    /// Breaker state of the selected backend when the call was decided.
    pub breaker_state: Option<CircuitState>,
    pub error_code: Option<&'static str>,
}

/// Consumer of audit events. Must not block.
pub trait AuditSink: Send + Sync + Debug {
    fn record(&self, event: &AuditEvent);
}

/// Emits each event as a `tracing` record on target `lexis::audit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let flags = event
            .moderation_flags
            .iter()
            .map(|flag| flag.as_str())
            .collect::<Vec<_>>()
            .join(",");
        info!(
            target: "lexis::audit",
            operation_id = %event.operation_id,
            principal = %event.principal,
            operation = event.operation.as_str(),
            outcome = event.outcome.as_str(),
            backend = event.backend.as_deref().unwrap_or("-"),
            from_cache = event.from_cache,
            elapsed_ms = event.elapsed_ms,
            moderation_flags = %flags,
            breaker_state = event.breaker_state.map_or("-", CircuitState::as_str),
            error_code = event.error_code.unwrap_or("-"),
            "analysis request"
        );
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
