use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::{
    entities::product::{self, ProductStatus},
    errors::ServiceError,
    services::audit,
};

#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub name_fr: Option<String>,
    pub description: Option<String>,
    pub description_fr: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub stock: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub name_fr: Option<String>,
    pub description: Option<String>,
    pub description_fr: Option<String>,
    pub price: Option<Decimal>,
}

/// Catalog management. Note that `stock` is deliberately absent from
/// [`UpdateProductInput`]: after creation it belongs to the inventory ledger.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
        actor: &str,
    ) -> Result<product::Model, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "product name must not be empty".to_string(),
            ));
        }
        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price must not be negative".to_string(),
            ));
        }
        if input.stock < 0 {
            return Err(ServiceError::ValidationError(
                "stock must not be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            name: Set(input.name.trim().to_string()),
            name_fr: Set(input.name_fr),
            description: Set(input.description),
            description_fr: Set(input.description_fr),
            price: Set(input.price),
            stock: Set(input.stock),
            status: Set(ProductStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        audit::record(
            &*self.db,
            audit::AuditEntry::new(actor, "product.create", "product", model.id.to_string())
                .with_detail(json!({"name": model.name, "price": model.price})),
        )
        .await?;

        info!(product_id = model.id, "product created");
        Ok(model)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: i64,
        input: UpdateProductInput,
        actor: &str,
    ) -> Result<product::Model, ServiceError> {
        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "price must not be negative".to_string(),
                ));
            }
        }

        let current = product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        let mut active: product::ActiveModel = current.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(name_fr) = input.name_fr {
            active.name_fr = Set(Some(name_fr));
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(description_fr) = input.description_fr {
            active.description_fr = Set(Some(description_fr));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        audit::record(
            &*self.db,
            audit::AuditEntry::new(actor, "product.update", "product", id.to_string()),
        )
        .await?;

        Ok(updated)
    }

    /// Soft delete: the row is kept (order items reference it), the product
    /// just leaves the sellable catalog.
    #[instrument(skip(self))]
    pub async fn retire_product(
        &self,
        id: i64,
        actor: &str,
    ) -> Result<product::Model, ServiceError> {
        let current = product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        let mut active: product::ActiveModel = current.into();
        active.status = Set(ProductStatus::Retired);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        audit::record(
            &*self.db,
            audit::AuditEntry::new(actor, "product.retire", "product", id.to_string()),
        )
        .await?;

        info!(product_id = id, "product retired");
        Ok(updated)
    }

    pub async fn get_product(&self, id: i64) -> Result<Option<product::Model>, ServiceError> {
        Ok(product::Entity::find_by_id(id).one(&*self.db).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        limit: u64,
        active_only: bool,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut query = product::Entity::find();
        if active_only {
            query = query.filter(product::Column::Status.eq(ProductStatus::Active));
        }

        let paginator = query
            .order_by_asc(product::Column::Id)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.max(1) - 1).await?;

        Ok((products, total))
    }

    /// Sellable slice of the catalog shown by the chat menu.
    pub async fn sellable_products(&self, limit: u64) -> Result<Vec<product::Model>, ServiceError> {
        Ok(product::Entity::find()
            .filter(product::Column::Status.eq(ProductStatus::Active))
            .filter(product::Column::Stock.gt(0))
            .order_by_asc(product::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sea_orm::{ConnectOptions, Database};
    use sea_orm_migration::MigratorTrait;

    async fn setup() -> ProductService {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.expect("connect sqlite");
        crate::migrator::Migrator::up(&db, None)
            .await
            .expect("run migrations");
        ProductService::new(Arc::new(db))
    }

    fn input(name: &str, price: Decimal, stock: i32) -> CreateProductInput {
        CreateProductInput {
            name: name.to_string(),
            name_fr: None,
            description: None,
            description_fr: None,
            price,
            stock,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_roundtrip() {
        let service = setup().await;
        let created = service
            .create_product(input("Mug", dec!(8.50), 12), "user:tester")
            .await
            .expect("create");

        let fetched = service
            .get_product(created.id)
            .await
            .expect("query")
            .expect("exists");
        assert_eq!(fetched.name, "Mug");
        assert_eq!(fetched.price, dec!(8.50));
        assert_eq!(fetched.stock, 12);
        assert_eq!(fetched.status, ProductStatus::Active);
    }

    #[tokio::test]
    async fn negative_price_is_rejected() {
        let service = setup().await;
        let err = service
            .create_product(input("Mug", dec!(-1), 0), "user:tester")
            .await
            .expect_err("must fail");
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn retired_products_leave_the_sellable_catalog() {
        let service = setup().await;
        let keep = service
            .create_product(input("Mug", dec!(8), 3), "user:tester")
            .await
            .unwrap();
        let retire = service
            .create_product(input("Plate", dec!(9), 3), "user:tester")
            .await
            .unwrap();
        let empty = service
            .create_product(input("Bowl", dec!(7), 0), "user:tester")
            .await
            .unwrap();

        service
            .retire_product(retire.id, "user:tester")
            .await
            .expect("retire");

        let sellable = service.sellable_products(10).await.expect("sellable");
        let ids: Vec<i64> = sellable.iter().map(|p| p.id).collect();
        assert!(ids.contains(&keep.id));
        assert!(!ids.contains(&retire.id), "retired product listed");
        assert!(!ids.contains(&empty.id), "out-of-stock product listed");

        // but the row itself survives
        assert!(service.get_product(retire.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_changes_only_provided_fields() {
        let service = setup().await;
        let created = service
            .create_product(input("Mug", dec!(8), 3), "user:tester")
            .await
            .unwrap();

        let updated = service
            .update_product(
                created.id,
                UpdateProductInput {
                    price: Some(dec!(9.90)),
                    ..Default::default()
                },
                "user:tester",
            )
            .await
            .expect("update");

        assert_eq!(updated.price, dec!(9.90));
        assert_eq!(updated.name, "Mug");
        assert_eq!(updated.stock, 3);
    }
}
