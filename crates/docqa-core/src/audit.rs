//! Audit events.
//!
//! The pipelines report what happened as plain `(entity kind, id)` pairs and
//! leave storage of the audit trail to whoever implements [`AuditSink`].

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Document,
    Query,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Document => "document",
            EntityKind::Query => "query",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditAction {
    #[serde(rename = "document.upload")]
    DocumentUpload,
    #[serde(rename = "document.delete")]
    DocumentDelete,
    #[serde(rename = "query.create")]
    QueryCreate,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DocumentUpload => "document.upload",
            AuditAction::DocumentDelete => "document.delete",
            AuditAction::QueryCreate => "query.create",
        }
    }

    /// The kind of entity this action is about.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            AuditAction::DocumentUpload | AuditAction::DocumentDelete => EntityKind::Document,
            AuditAction::QueryCreate => EntityKind::Query,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub actor_id: String,
    pub action: AuditAction,
    pub entity: EntityRef,
}

impl AuditEvent {
    pub fn new(
        actor_id: impl Into<String>,
        action: AuditAction,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            action,
            entity: EntityRef {
                kind: action.entity_kind(),
                id: entity_id.into(),
            },
        }
    }
}

/// Receives audit events. Recording is fire-and-forget.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Discards every event.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: AuditEvent) {}
}
