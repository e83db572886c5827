pub mod protocol;
pub mod registry;
pub mod ws;

use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;

use crate::{AppState, db::Store, error::ApiResult};

pub fn router() -> Router<AppState> {
    Router::new().route("/validate/{chat_key}", get(validate_chat_key))
}

/// Pre-flight check the client runs before opening the socket. The join step
/// re-validates the key on its own; the two calls are not atomic.
#[debug_handler(state = AppState)]
async fn validate_chat_key(
    State(store): State<Store>,
    Path(chat_key): Path<String>,
) -> ApiResult<Response> {
    match store.booking_by_chat_key(&chat_key).await? {
        Some(booking) => Ok(Json(json!({
            "valid": true,
            "bookingId": booking.id,
            "name": booking.name,
        }))
        .into_response()),
        None => Ok((StatusCode::NOT_FOUND, Json(json!({ "valid": false }))).into_response()),
    }
}
