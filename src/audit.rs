//! Audit trail emitted as structured `tracing` events under the `audit` target.
//!
//! Route them elsewhere with a filter such as `DOCQA_LOG=audit=info,warn`.

use docqa_core::audit::{AuditEvent, AuditSink};

pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "audit",
            actor_id = %event.actor_id,
            action = event.action.as_str(),
            entity_kind = event.entity.kind.as_str(),
            entity_id = %event.entity.id,
            "audit"
        );
    }
}
