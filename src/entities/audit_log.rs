use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only record of security-relevant actions. There is deliberately no
/// code path that updates or deletes rows of this table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Who: user id, customer id or "system"
    pub actor: String,
    /// What: e.g. "order.create", "order.transition", "auth.login"
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    #[sea_orm(column_type = "Json", nullable)]
    pub detail: Option<Json>,
    #[sea_orm(nullable)]
    pub source_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
