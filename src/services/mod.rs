pub mod audit;
pub mod customers;
pub mod inventory;
pub mod messages;
pub mod orders;
pub mod products;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::auth::AuthService;
use crate::events::EventSender;

/// Aggregate of the service layer, built once at startup and shared through
/// the application state.
#[derive(Clone)]
pub struct AppServices {
    pub orders: orders::OrderService,
    pub products: products::ProductService,
    pub customers: customers::CustomerService,
    pub messages: messages::MessageService,
    pub auth: Arc<AuthService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        auth: Arc<AuthService>,
        currency: String,
    ) -> Self {
        Self {
            orders: orders::OrderService::new(db.clone(), event_sender.clone(), currency),
            products: products::ProductService::new(db.clone()),
            customers: customers::CustomerService::new(db.clone()),
            messages: messages::MessageService::new(db, event_sender),
            auth,
        }
    }
}
