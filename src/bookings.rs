use axum::{
    Json, Router, debug_handler,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use crate::{
    AppState,
    db::{NewBooking, Store},
    error::{ApiError, ApiResult},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_booking))
        .route("/{id}", get(get_booking))
}

#[debug_handler(state = AppState)]
async fn create_booking(
    State(store): State<Store>,
    payload: Result<Json<NewBooking>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new) = payload.map_err(|err| ApiError::validation(err.body_text()))?;
    new.validate()?;

    let booking = store.create_booking(new).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Booking confirmed successfully!",
            "booking": {
                "id": booking.id,
                "name": booking.name,
                "date": booking.date,
                "time": booking.time,
                "chatKey": booking.chat_key,
            },
        })),
    ))
}

#[debug_handler(state = AppState)]
async fn get_booking(
    State(store): State<Store>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let booking = store
        .booking(id)
        .await?
        .ok_or(ApiError::NotFound("Booking"))?;

    Ok(Json(json!({
        "id": booking.id,
        "name": booking.name,
        "date": booking.date,
        "time": booking.time,
        "hours": booking.hours,
        "chatKey": booking.chat_key,
    })))
}
