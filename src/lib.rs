pub mod bookings;
pub mod chat;
pub mod contact;
pub mod db;
pub mod error;

use axum::{Router, extract::FromRef, routing::get};

pub use db::Store;
pub use error::{ApiError, ApiResult};

use chat::registry::ChatRegistry;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub registry: ChatRegistry,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            registry: ChatRegistry::new(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/api/bookings", bookings::router())
        .nest("/api/contact", contact::router())
        .nest("/api/chat", chat::router())
        .route("/ws", get(chat::ws::chat_ws))
}
