use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{entities::customer, errors::ServiceError};

/// Customer registry. Rows are created by the webhook pipeline the first time
/// a sender writes in; the REST surface only reads them.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Looks a sender up by provider id, creating the row on first contact and
    /// refreshing the profile name when it changed. Concurrent first-contact
    /// deliveries race on the unique key; the loser of that race re-reads.
    #[instrument(skip(self, display_name))]
    pub async fn find_or_create(
        &self,
        wa_id: &str,
        display_name: Option<&str>,
    ) -> Result<customer::Model, ServiceError> {
        if let Some(existing) = self.find_by_wa_id(wa_id).await? {
            if let Some(name) = display_name {
                if existing.display_name.as_deref() != Some(name) {
                    let mut active: customer::ActiveModel = existing.into();
                    active.display_name = Set(Some(name.to_string()));
                    active.updated_at = Set(Utc::now());
                    return Ok(active.update(&*self.db).await?);
                }
            }
            return Ok(existing);
        }

        let now = Utc::now();
        let inserted = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            wa_id: Set(wa_id.to_string()),
            phone_number: Set(wa_id.to_string()),
            display_name: Set(display_name.map(|s| s.to_string())),
            language: Set("fr".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await;

        match inserted {
            Ok(model) => {
                info!(customer_id = %model.id, "new customer registered");
                Ok(model)
            }
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // Another delivery won the insert race.
                self.find_by_wa_id(wa_id).await?.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "customer {} vanished after unique violation",
                        wa_id
                    ))
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_by_wa_id(
        &self,
        wa_id: &str,
    ) -> Result<Option<customer::Model>, ServiceError> {
        Ok(customer::Entity::find()
            .filter(customer::Column::WaId.eq(wa_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<customer::Model>, ServiceError> {
        Ok(customer::Entity::find()
            .filter(customer::Column::PhoneNumber.eq(phone_number))
            .one(&*self.db)
            .await?)
    }

    pub async fn get_customer(&self, id: Uuid) -> Result<Option<customer::Model>, ServiceError> {
        Ok(customer::Entity::find_by_id(id).one(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<customer::Model>, u64), ServiceError> {
        let paginator = customer::Entity::find()
            .order_by_desc(customer::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let customers = paginator.fetch_page(page.max(1) - 1).await?;
        Ok((customers, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, Database};
    use sea_orm_migration::MigratorTrait;

    async fn setup() -> CustomerService {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.expect("connect sqlite");
        crate::migrator::Migrator::up(&db, None)
            .await
            .expect("run migrations");
        CustomerService::new(Arc::new(db))
    }

    #[tokio::test]
    async fn first_contact_creates_then_reuses_the_row() {
        let service = setup().await;

        let first = service
            .find_or_create("33612345678", Some("Alice"))
            .await
            .expect("create");
        let second = service
            .find_or_create("33612345678", Some("Alice"))
            .await
            .expect("reuse");

        assert_eq!(first.id, second.id);
        assert_eq!(second.phone_number, "33612345678");
        assert_eq!(second.language, "fr");
    }

    #[tokio::test]
    async fn profile_name_refreshes_on_change() {
        let service = setup().await;

        let created = service
            .find_or_create("33612345678", Some("Alice"))
            .await
            .expect("create");
        let renamed = service
            .find_or_create("33612345678", Some("Alice B."))
            .await
            .expect("update");

        assert_eq!(created.id, renamed.id);
        assert_eq!(renamed.display_name.as_deref(), Some("Alice B."));
    }

    #[tokio::test]
    async fn lookup_by_phone_matches_wa_id() {
        let service = setup().await;
        service
            .find_or_create("33698765432", None)
            .await
            .expect("create");

        let found = service
            .find_by_phone("33698765432")
            .await
            .expect("query")
            .expect("exists");
        assert_eq!(found.wa_id, "33698765432");
        assert!(found.display_name.is_none());
    }
}
