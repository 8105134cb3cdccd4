use super::InternalAlertSink;
use crate::models::enums::JobKind;
use crate::tenancy::TenantId;

/// Raises alerts as `error!` events with `severity = "critical"` for the
/// log pipeline to page on.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl InternalAlertSink for LogAlertSink {
    fn raise(&self, tenant_id: &TenantId, job: JobKind, message: &str) {
        tracing::error!(
            severity = "critical",
            tenant_id = %tenant_id,
            job = %job,
            message,
            "Internal alert raised"
        );
    }
}
