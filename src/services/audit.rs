//! Append-only audit trail. Entries are written inside the same transaction
//! as the action they describe; there is no update or delete path.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};
use uuid::Uuid;

use crate::entities::audit_log;
use crate::errors::ServiceError;

/// One security-relevant action to record.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub detail: Option<serde_json::Value>,
    pub source_ip: Option<String>,
}

impl AuditEntry {
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        entity: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            detail: None,
            source_ip: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn with_source_ip(mut self, ip: Option<String>) -> Self {
        self.source_ip = ip;
        self
    }
}

pub async fn record<C: ConnectionTrait>(conn: &C, entry: AuditEntry) -> Result<(), ServiceError> {
    audit_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        actor: Set(entry.actor),
        action: Set(entry.action),
        entity: Set(entry.entity),
        entity_id: Set(entry.entity_id),
        detail: Set(entry.detail),
        source_ip: Set(entry.source_ip),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, Database, EntityTrait};
    use sea_orm_migration::MigratorTrait;
    use serde_json::json;

    #[tokio::test]
    async fn record_inserts_one_row() {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.expect("connect sqlite");
        crate::migrator::Migrator::up(&db, None)
            .await
            .expect("run migrations");

        let entry = AuditEntry::new("user-1", "order.create", "order", "ORD-42")
            .with_detail(json!({"total": "500"}))
            .with_source_ip(Some("10.0.0.1".to_string()));
        record(&db, entry).await.expect("record audit entry");

        let rows = audit_log::Entity::find().all(&db).await.expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "order.create");
        assert_eq!(rows[0].entity_id, "ORD-42");
        assert_eq!(rows[0].source_ip.as_deref(), Some("10.0.0.1"));
    }
}
