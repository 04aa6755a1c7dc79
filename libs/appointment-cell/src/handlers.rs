use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{BookSlotRequest, BookingError, CancelAppointmentRequest};
use crate::services::booking::SlotBookingService;

pub async fn book_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<BookSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = SlotBookingService::new(Arc::new(SupabaseClient::new(&state)));

    let confirmation = service
        .book(request, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": confirmation,
    })))
}

pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = SlotBookingService::new(Arc::new(SupabaseClient::new(&state)));

    let appointment = service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({ "appointment": appointment })))
}

pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
    Json(_request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = SlotBookingService::new(Arc::new(SupabaseClient::new(&state)));

    service
        .cancel(appointment_id, token)
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment_id": appointment_id,
        "status": "CANCELLED",
    })))
}

fn map_booking_error(e: BookingError) -> AppError {
    match e {
        BookingError::SlotUnavailable { .. } => AppError::Conflict(e.to_string()),
        BookingError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        BookingError::InvalidSlot(msg) => AppError::BadRequest(msg),
        BookingError::Database(msg) => AppError::Database(msg),
    }
}
