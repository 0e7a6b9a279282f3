//! Audit logging for capability lifecycle events.
//!
//! Every mint, decision, revocation, and sweep can be recorded as a typed
//! [`AuditEvent`]. Hosts install an [`AuditLogger`] once at startup; the
//! default is to log nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TokenMinted,
    DecisionAllowed,
    DecisionDenied,
    TokenRevoked,
    StoreCleanup,
}

/// A single audit record.
///
/// Serialized as one JSON object per event; absent correlation fields are
/// omitted rather than set to null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID.
    pub id: String,

    pub event_type: AuditEventType,

    /// When this event occurred.
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub token_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub principal_sub: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_name: Option<String>,

    /// Decision code (`PCCAP_*`) for decision events.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>,

    /// Free-form context: the verdict reason, sweep count, issuer.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            token_id: None,
            principal_sub: None,
            tool_name: None,
            code: None,
            detail: None,
        }
    }

    pub fn with_token(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = Some(token_id.into());
        self
    }

    pub fn with_principal(mut self, sub: impl Into<String>) -> Self {
        self.principal_sub = Some(sub.into());
        self
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Trait for audit loggers.
pub trait AuditLogger: Send + Sync + std::fmt::Debug {
    /// Log an audit event.
    fn log(&self, event: AuditEvent);
}

/// A logger that writes events to stdout as JSON lines.
///
/// Suitable for containerized environments where logs are scraped by an
/// external agent.
#[derive(Debug, Default)]
pub struct StdoutLogger;

impl StdoutLogger {
    pub fn new() -> Self {
        Self
    }
}

impl AuditLogger for StdoutLogger {
    fn log(&self, event: AuditEvent) {
        if let Ok(json) = serde_json::to_string(&event) {
            println!("{}", json);
        } else {
            eprintln!("failed to serialize audit event: {:?}", event);
        }
    }
}

/// A logger that does nothing (for testing or when auditing is disabled).
#[derive(Debug, Default)]
pub struct NoOpLogger;

impl AuditLogger for NoOpLogger {
    fn log(&self, _event: AuditEvent) {}
}

/// Global audit logger instance.
///
/// A process-wide slot avoids threading the logger through every engine
/// call. Unset by default, which means events are dropped.
static GLOBAL_LOGGER: RwLock<Option<Arc<dyn AuditLogger>>> = RwLock::new(None);

/// Set the global audit logger.
pub fn set_global_logger(logger: Arc<dyn AuditLogger>) {
    if let Ok(mut slot) = GLOBAL_LOGGER.write() {
        *slot = Some(logger);
    }
}

/// Log an event using the global logger.
pub fn log_event(event: AuditEvent) {
    if let Ok(slot) = GLOBAL_LOGGER.read() {
        if let Some(logger) = slot.as_ref() {
            logger.log(event);
        }
    }
}
