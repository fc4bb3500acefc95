use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{self, OrderStatus, PaymentStatus},
    entities::order_item,
    entities::order_status_history,
    entities::product::{self, ProductStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{audit, inventory},
};

/// Who an order belongs to. Exactly one owner reference ends up set on the row.
#[derive(Debug, Clone, Copy)]
pub enum OrderOrigin {
    /// Chat-originated, owned by a customer
    Customer(Uuid),
    /// REST-originated, owned by a back-office user
    User(Uuid),
}

impl OrderOrigin {
    pub fn actor(&self) -> String {
        match self {
            OrderOrigin::Customer(id) => format!("customer:{}", id),
            OrderOrigin::User(id) => format!("user:{}", id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemInput {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug)]
pub struct CreateOrderInput {
    pub origin: OrderOrigin,
    pub items: Vec<OrderItemInput>,
    pub note: Option<String>,
    pub source_ip: Option<String>,
}

/// An order with its line items (and, where loaded, its transition history).
#[derive(Debug, Serialize)]
pub struct OrderDetails {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub history: Vec<order_status_history::Model>,
}

#[derive(Debug, Default, Clone)]
pub struct OrderFilter {
    pub page: u64,
    pub limit: u64,
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Per-status aggregate used by the admin stats endpoint.
#[derive(Debug, Serialize, FromQueryResult)]
pub struct StatusSummary {
    pub status: OrderStatus,
    pub orders: i64,
    pub revenue: Option<Decimal>,
}

/// Service owning the order lifecycle. All stock mutation goes through
/// `services::inventory` inside the transactions opened here.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    currency: String,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, currency: String) -> Self {
        Self {
            db,
            event_sender,
            currency,
        }
    }

    /// Creates an order: validates every line against the live catalog,
    /// reserves stock, snapshots unit prices and persists order + items +
    /// audit entry in one transaction.
    #[instrument(skip(self, input), fields(actor = %input.origin.actor(), lines = input.items.len()))]
    pub async fn create_order(
        &self,
        input: CreateOrderInput,
    ) -> Result<OrderDetails, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "an order needs at least one item".to_string(),
            ));
        }
        for item in &input.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for product {} must be at least 1",
                    item.product_id
                )));
            }
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();

        let txn = self.db.begin().await?;

        let mut total = Decimal::ZERO;
        let mut item_models = Vec::with_capacity(input.items.len());

        for item in &input.items {
            let product = product::Entity::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .filter(|p| p.status == ProductStatus::Active)
                .ok_or_else(|| {
                    ServiceError::InvalidProduct(format!(
                        "Product {} does not exist or is no longer sold",
                        item.product_id
                    ))
                })?;

            inventory::reserve(&txn, product.id, item.quantity).await?;

            total += product.price * Decimal::from(item.quantity);
            item_models.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(product.price),
                created_at: Set(now),
            });
        }

        let (customer_id, user_id) = match input.origin {
            OrderOrigin::Customer(id) => (Some(id), None),
            OrderOrigin::User(id) => (None, Some(id)),
        };

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(customer_id),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(total),
            currency: Set(self.currency.clone()),
            payment_status: Set(PaymentStatus::Unpaid),
            notes: Set(input.note.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        order_item::Entity::insert_many(item_models).exec(&txn).await?;

        audit::record(
            &txn,
            audit::AuditEntry::new(
                input.origin.actor(),
                "order.create",
                "order",
                order_number.as_str(),
            )
            .with_detail(json!({
                "total": total,
                "currency": self.currency,
                "lines": input.items.len(),
            }))
            .with_source_ip(input.source_ip.clone()),
        )
        .await?;

        txn.commit().await?;

        info!(order_number = %order_number, total = %total, "order created");

        if let Err(e) = self.event_sender.send(Event::OrderCreated(order_id)).await {
            warn!(error = %e, order_id = %order_id, "failed to send order created event");
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderDetails {
            order: order_model,
            items,
            history: Vec::new(),
        })
    }

    /// Applies a status transition. Illegal edges fail with
    /// [`ServiceError::InvalidTransition`]; entering a terminal state hands
    /// every reserved item back to stock inside the same transaction, and
    /// every successful transition appends to the order's history log.
    #[instrument(skip(self, note), fields(order_number = %order_number, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_number: &str,
        new_status: OrderStatus,
        actor: &str,
        note: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let current = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;

        let old_status = current.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition {
                from: old_status,
                to: new_status,
            });
        }

        let order_id = current.id;
        let mut active: order::ActiveModel = current.into();
        active.status = Set(new_status);
        active.updated_at = Set(now);
        if new_status == OrderStatus::Refunded {
            active.payment_status = Set(PaymentStatus::Refunded);
        }
        let updated = active.update(&txn).await?;

        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            from_status: Set(old_status),
            to_status: Set(new_status),
            actor: Set(actor.to_string()),
            note: Set(note),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        // Terminal states return every reserved unit, in the same atomic unit
        // as the status write.
        let mut released = Vec::new();
        if new_status.restores_stock() {
            let items = order_item::Entity::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(&txn)
                .await?;
            for item in items {
                inventory::release(&txn, item.product_id, item.quantity).await?;
                released.push((item.product_id, item.quantity));
            }
        }

        audit::record(
            &txn,
            audit::AuditEntry::new(actor, "order.transition", "order", order_number).with_detail(
                json!({
                    "from": old_status.to_string(),
                    "to": new_status.to_string(),
                }),
            ),
        )
        .await?;

        txn.commit().await?;

        info!(
            order_number,
            from = %old_status,
            to = %new_status,
            "order status updated"
        );

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await
        {
            warn!(error = %e, order_id = %order_id, "failed to send status changed event");
        }
        for (product_id, quantity) in released {
            if let Err(e) = self
                .event_sender
                .send(Event::StockReleased {
                    product_id,
                    quantity,
                })
                .await
            {
                warn!(error = %e, product_id, "failed to send stock released event");
            }
        }

        Ok(updated)
    }

    /// Fetches an order with items and transition history.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderDetails>, ServiceError> {
        let db = &*self.db;

        let Some(order_model) = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(db)
            .await?
        else {
            return Ok(None);
        };

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_model.id))
            .all(db)
            .await?;
        let history = order_status_history::Entity::find()
            .filter(order_status_history::Column::OrderId.eq(order_model.id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(db)
            .await?;

        Ok(Some(OrderDetails {
            order: order_model,
            items,
            history,
        }))
    }

    /// Lists orders, newest first, with status/owner/date-range filters.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderFilter,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let db = &*self.db;
        let limit = filter.limit.max(1);
        let page = filter.page.max(1);

        let mut query = order::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }
        if let Some(start) = filter.start_date {
            query = query.filter(order::Column::CreatedAt.gte(start));
        }
        if let Some(end) = filter.end_date {
            query = query.filter(order::Column::CreatedAt.lte(end));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok((orders, total))
    }

    /// Aggregates order count and revenue per status.
    #[instrument(skip(self))]
    pub async fn order_stats(&self) -> Result<Vec<StatusSummary>, ServiceError> {
        let rows = order::Entity::find()
            .select_only()
            .column(order::Column::Status)
            .column_as(Expr::col(order::Column::Id).count(), "orders")
            .column_as(Expr::col(order::Column::TotalAmount).sum(), "revenue")
            .group_by(order::Column::Status)
            .into_model::<StatusSummary>()
            .all(&*self.db)
            .await?;

        Ok(rows)
    }

    /// Items of an order, for callers that already hold the order row.
    pub async fn order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }
}

/// Timestamp + random suffix. Global uniqueness is enforced by the database
/// constraint on `orders.order_number`.
fn generate_order_number() -> String {
    use rand::Rng;
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("ORD-{}{:06}", Utc::now().format("%y%m%d%H%M%S"), suffix)
}
