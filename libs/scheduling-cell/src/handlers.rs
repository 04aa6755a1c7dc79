use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::domain::Procedure;
use shared_models::error::AppError;

use crate::models::SchedulingError;
use crate::services::emergency::EmergencyFinder;
use crate::services::routing::RoutingService;

#[derive(Debug, Deserialize)]
pub struct SlotSearchQuery {
    pub proc_id: i32,
    #[serde(default)]
    pub needs_sedation: bool,
    pub preferred_clinic_id: Option<Uuid>,
    pub preferred_doctor_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EmergencyQuery {
    pub tenant_id: Option<Uuid>,
}

/// Tiered slot search for one procedure.
pub async fn search_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<SlotSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let supabase = Arc::new(SupabaseClient::new(&state));

    let procedure = fetch_procedure(&supabase, query.proc_id, token).await?;

    let routing = RoutingService::new(Arc::clone(&supabase));
    let slots = routing
        .find_with_fallback(
            &procedure,
            query.needs_sedation,
            query.preferred_clinic_id,
            query.preferred_doctor_id,
            query.tenant_id,
            token,
        )
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(serde_json::json!({
        "procedure": procedure.name,
        "slots": slots,
    })))
}

/// Earliest emergency block, bypassing preferences.
pub async fn emergency_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<EmergencyQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let supabase = Arc::new(SupabaseClient::new(&state));

    let finder = EmergencyFinder::new(supabase);
    let slot = finder
        .find_earliest(query.tenant_id, token)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(serde_json::json!({ "emergency_slot": slot })))
}

async fn fetch_procedure(
    supabase: &SupabaseClient,
    proc_id: i32,
    token: &str,
) -> Result<Procedure, AppError> {
    let path = format!("/rest/v1/procedures?proc_id=eq.{}", proc_id);
    let rows: Vec<Value> = supabase
        .request(Method::GET, &path, Some(token), None)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    rows.into_iter()
        .next()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| AppError::NotFound(format!("Procedure {} not found", proc_id)))
}

fn map_scheduling_error(e: SchedulingError) -> AppError {
    match e {
        SchedulingError::ProcedureNotFound => AppError::NotFound("Procedure not found".to_string()),
        SchedulingError::InvalidQuery(msg) => AppError::BadRequest(msg),
        SchedulingError::Database(msg) => AppError::Database(msg),
    }
}
