use mongodb::Database;

use crate::database::AUDIT_LOGS;
use crate::models::audit_log::AuditLog;

/// Appends an audit entry. A failed write is logged and never fails the
/// request that triggered it.
pub async fn record(db: &Database, entry: AuditLog) {
    let action = entry.action;
    if let Err(err) = db.collection::<AuditLog>(AUDIT_LOGS).insert_one(entry).await {
        tracing::error!(?action, "failed to write audit log: {}", err);
    }
}
