use axum::{
    Json, Router, debug_handler,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde_json::json;
use tracing::info;

use crate::{
    AppState,
    db::{NewContact, Store},
    error::{ApiError, ApiResult},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_contact))
}

#[debug_handler(state = AppState)]
async fn create_contact(
    State(store): State<Store>,
    payload: Result<Json<NewContact>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new) = payload.map_err(|err| ApiError::validation(err.body_text()))?;
    new.validate()?;

    let contact = store.create_contact(new).await?;
    info!(id = contact.id, "contact message received");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Message sent successfully!" })),
    ))
}
