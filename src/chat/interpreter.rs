use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    chat::command::{Command, ID_CONTACT_INFO, ID_TRACK_ORDER, ID_VIEW_PRODUCTS},
    entities::customer,
    entities::order::OrderStatus,
    errors::ServiceError,
    messaging::{MessagingGateway, ReplyButton},
    services::orders::{CreateOrderInput, OrderFilter, OrderItemInput, OrderOrigin},
    services::AppServices,
};

const CONTACT_TEXT: &str = "Notre équipe est joignable du lundi au samedi, 9h-18h.\n\
    Répondez simplement à ce message et un conseiller vous recontactera.";

const HELP_TEXT: &str = "Je n'ai pas compris votre demande. Commandes disponibles :\n\
    • \"menu\" — voir nos produits\n\
    • \"acheter <numéro>\" — commander un article\n\
    • \"commandes\" — suivre vos commandes\n\
    • \"contact\" — nous contacter";

fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "en attente",
        OrderStatus::Confirmed => "confirmée",
        OrderStatus::Processing => "en préparation",
        OrderStatus::Shipped => "expédiée",
        OrderStatus::Delivered => "livrée",
        OrderStatus::Cancelled => "annulée",
        OrderStatus::Refunded => "remboursée",
    }
}

/// Turns parsed chat commands into actions and replies. Every reply goes out
/// through the injected gateway and is archived as an outbound message.
#[derive(Clone)]
pub struct CommandInterpreter {
    services: AppServices,
    gateway: Arc<dyn MessagingGateway>,
    currency: String,
    catalog_limit: u64,
    orders_limit: u64,
}

impl CommandInterpreter {
    pub fn new(
        services: AppServices,
        gateway: Arc<dyn MessagingGateway>,
        currency: String,
        catalog_limit: u64,
        orders_limit: u64,
    ) -> Self {
        Self {
            services,
            gateway,
            currency,
            catalog_limit,
            orders_limit,
        }
    }

    /// Handles one command for one customer. Business failures during a
    /// purchase are converted to user-facing text here; only infrastructure
    /// errors (database, gateway) surface to the caller.
    #[instrument(skip(self, customer), fields(customer_id = %customer.id, command = ?command))]
    pub async fn handle(
        &self,
        customer: &customer::Model,
        command: Command,
    ) -> Result<(), ServiceError> {
        match command {
            Command::Greeting => self.send_welcome(customer).await,
            Command::Menu => self.send_catalog(customer).await,
            Command::MyOrders => self.send_orders(customer).await,
            Command::Buy(product_id) => self.buy(customer, product_id).await,
            Command::Contact => self.send_text(customer, CONTACT_TEXT.to_string()).await,
            Command::Help => self.send_text(customer, HELP_TEXT.to_string()).await,
        }
    }

    async fn send_welcome(&self, customer: &customer::Model) -> Result<(), ServiceError> {
        let name = customer.display_name.as_deref().unwrap_or("et bienvenue");
        let body = format!("Bonjour {} ! Que souhaitez-vous faire ?", name);
        let buttons = [
            ReplyButton::new(ID_VIEW_PRODUCTS, "Voir les produits"),
            ReplyButton::new(ID_TRACK_ORDER, "Mes commandes"),
            ReplyButton::new(ID_CONTACT_INFO, "Contact"),
        ];

        let provider_id = self
            .gateway
            .send_buttons(&customer.wa_id, &body, &buttons)
            .await?;
        self.services
            .messages
            .record_outbound(customer.id, &provider_id, &body)
            .await?;
        Ok(())
    }

    async fn send_catalog(&self, customer: &customer::Model) -> Result<(), ServiceError> {
        let products = self
            .services
            .products
            .sellable_products(self.catalog_limit)
            .await?;

        if products.is_empty() {
            return self
                .send_text(
                    customer,
                    "Le catalogue est vide pour le moment, revenez bientôt !".to_string(),
                )
                .await;
        }

        let mut body = String::from("Nos produits :\n");
        for product in &products {
            body.push_str(&format!(
                "{}. {} — {} {} (stock : {})\n",
                product.id,
                product.display_name(&customer.language),
                product.price,
                self.currency,
                product.stock,
            ));
        }
        body.push_str("\nEnvoyez \"acheter <numéro>\" pour commander.");

        self.send_text(customer, body).await
    }

    async fn send_orders(&self, customer: &customer::Model) -> Result<(), ServiceError> {
        let (orders, _) = self
            .services
            .orders
            .list_orders(OrderFilter {
                page: 1,
                limit: self.orders_limit,
                customer_id: Some(customer.id),
                ..Default::default()
            })
            .await?;

        if orders.is_empty() {
            return self
                .send_text(
                    customer,
                    "Vous n'avez pas encore de commande. Envoyez \"menu\" pour découvrir nos produits."
                        .to_string(),
                )
                .await;
        }

        let mut body = String::from("Vos dernières commandes :\n");
        for order in &orders {
            body.push_str(&format!(
                "• {} — {} — {} {}\n",
                order.order_number,
                status_label(order.status),
                order.total_amount,
                order.currency,
            ));
        }

        self.send_text(customer, body).await
    }

    /// Single-item purchase. The order service re-validates stock inside its
    /// transaction; whatever business error comes back is translated into a
    /// plain-language reply instead of propagating.
    async fn buy(&self, customer: &customer::Model, product_id: i64) -> Result<(), ServiceError> {
        let result = self
            .services
            .orders
            .create_order(CreateOrderInput {
                origin: OrderOrigin::Customer(customer.id),
                items: vec![OrderItemInput {
                    product_id,
                    quantity: 1,
                }],
                note: None,
                source_ip: None,
            })
            .await;

        let body = match result {
            Ok(details) => {
                info!(order_number = %details.order.order_number, "chat purchase succeeded");
                format!(
                    "Commande {} enregistrée : {} — total {} {}.\nNous vous tiendrons informé(e) de son avancement.",
                    details.order.order_number,
                    details.items[0].product_name,
                    details.order.total_amount,
                    details.order.currency,
                )
            }
            Err(ServiceError::InsufficientStock(_)) => {
                "Désolé, ce produit est en rupture de stock.".to_string()
            }
            Err(ServiceError::InvalidProduct(_)) | Err(ServiceError::NotFound(_)) => format!(
                "Le produit {} n'existe pas ou n'est plus disponible. Envoyez \"menu\" pour voir le catalogue.",
                product_id
            ),
            Err(err) => {
                warn!(error = %err, product_id, "chat purchase failed");
                return Err(err);
            }
        };

        self.send_text(customer, body).await
    }

    async fn send_text(
        &self,
        customer: &customer::Model,
        body: String,
    ) -> Result<(), ServiceError> {
        let provider_id = self.gateway.send_text(&customer.wa_id, &body).await?;
        self.services
            .messages
            .record_outbound(customer.id, &provider_id, &body)
            .await?;
        Ok(())
    }
}
