use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::message::{self, MessageDirection, MessageStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

fn status_rank(status: MessageStatus) -> u8 {
    match status {
        MessageStatus::Received => 0,
        MessageStatus::Read => 1,
        MessageStatus::Replied => 2,
    }
}

/// Message archive. Inbound rows are inserted exactly once per provider
/// message id; the unique constraint is the dedup mechanism, so a violation
/// here means "already handled", not a fault.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl MessageService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Persists an inbound message. Returns `Ok(None)` for a duplicate
    /// delivery so the caller can skip reprocessing side effects.
    #[instrument(skip(self, body, metadata), fields(provider_message_id = %provider_message_id))]
    pub async fn record_inbound(
        &self,
        customer_id: Uuid,
        provider_message_id: &str,
        message_type: &str,
        body: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<message::Model>, ServiceError> {
        let now = Utc::now();
        let inserted = message::ActiveModel {
            id: Set(Uuid::new_v4()),
            provider_message_id: Set(provider_message_id.to_string()),
            customer_id: Set(customer_id),
            direction: Set(MessageDirection::Inbound),
            status: Set(MessageStatus::Received),
            message_type: Set(message_type.to_string()),
            body: Set(body),
            metadata: Set(metadata),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await;

        match inserted {
            Ok(model) => {
                if let Err(e) = self
                    .event_sender
                    .send(Event::MessageReceived(model.id))
                    .await
                {
                    warn!(error = %e, "failed to send message received event");
                }
                Ok(Some(model))
            }
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                info!(provider_message_id, "duplicate delivery skipped");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Persists an outbound reply. Outbound rows are terminal from birth.
    #[instrument(skip(self, body))]
    pub async fn record_outbound(
        &self,
        customer_id: Uuid,
        provider_message_id: &str,
        body: &str,
    ) -> Result<message::Model, ServiceError> {
        let now = Utc::now();
        let model = message::ActiveModel {
            id: Set(Uuid::new_v4()),
            provider_message_id: Set(provider_message_id.to_string()),
            customer_id: Set(customer_id),
            direction: Set(MessageDirection::Outbound),
            status: Set(MessageStatus::Replied),
            message_type: Set("text".to_string()),
            body: Set(Some(body.to_string())),
            metadata: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        if let Err(e) = self.event_sender.send(Event::MessageReplied(model.id)).await {
            warn!(error = %e, "failed to send message replied event");
        }

        Ok(model)
    }

    /// Advances an inbound message along received -> read -> replied.
    /// Regressions are ignored: the ladder only ever moves forward.
    #[instrument(skip(self))]
    pub async fn advance_status(
        &self,
        message_id: Uuid,
        status: MessageStatus,
    ) -> Result<message::Model, ServiceError> {
        let current = message::Entity::find_by_id(message_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Message {} not found", message_id)))?;

        if status_rank(status) <= status_rank(current.status) {
            return Ok(current);
        }

        let mut active: message::ActiveModel = current.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_messages(
        &self,
        customer_id: Option<Uuid>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<message::Model>, u64), ServiceError> {
        let mut query = message::Entity::find();
        if let Some(customer_id) = customer_id {
            query = query.filter(message::Column::CustomerId.eq(customer_id));
        }

        let paginator = query
            .order_by_desc(message::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let messages = paginator.fetch_page(page.max(1) - 1).await?;
        Ok((messages, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, Database};
    use sea_orm_migration::MigratorTrait;
    use tokio::sync::mpsc;

    async fn setup() -> MessageService {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.expect("connect sqlite");
        crate::migrator::Migrator::up(&db, None)
            .await
            .expect("run migrations");

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(crate::events::process_events(rx));
        MessageService::new(Arc::new(db), EventSender::new(tx))
    }

    #[tokio::test]
    async fn duplicate_inbound_delivery_is_skipped() {
        let service = setup().await;
        let customer_id = Uuid::new_v4();

        let first = service
            .record_inbound(customer_id, "wamid.1", "text", Some("bonjour".into()), None)
            .await
            .expect("insert");
        assert!(first.is_some());

        let second = service
            .record_inbound(customer_id, "wamid.1", "text", Some("bonjour".into()), None)
            .await
            .expect("duplicate must not error");
        assert!(second.is_none());

        let (all, total) = service
            .list_messages(Some(customer_id), 1, 10)
            .await
            .expect("list");
        assert_eq!(total, 1);
        assert_eq!(all[0].status, MessageStatus::Received);
    }

    #[tokio::test]
    async fn status_ladder_only_moves_forward() {
        let service = setup().await;
        let customer_id = Uuid::new_v4();

        let msg = service
            .record_inbound(customer_id, "wamid.2", "text", None, None)
            .await
            .expect("insert")
            .expect("fresh");

        let read = service
            .advance_status(msg.id, MessageStatus::Read)
            .await
            .expect("advance");
        assert_eq!(read.status, MessageStatus::Read);

        let replied = service
            .advance_status(msg.id, MessageStatus::Replied)
            .await
            .expect("advance");
        assert_eq!(replied.status, MessageStatus::Replied);

        // attempting to regress is a no-op
        let still_replied = service
            .advance_status(msg.id, MessageStatus::Received)
            .await
            .expect("no-op");
        assert_eq!(still_replied.status, MessageStatus::Replied);
    }

    #[tokio::test]
    async fn outbound_rows_are_terminal() {
        let service = setup().await;
        let customer_id = Uuid::new_v4();

        let sent = service
            .record_outbound(customer_id, "wamid.out.1", "votre commande est prête")
            .await
            .expect("insert");
        assert_eq!(sent.direction, MessageDirection::Outbound);
        assert_eq!(sent.status, MessageStatus::Replied);
    }
}
