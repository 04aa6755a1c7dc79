use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use scheduling_cell::models::SlotOption;
use shared_database::SupabaseError;

/// A slot the UI picked from a prior search, echoed back for confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSlotRequest {
    pub slot: SlotOption,
    pub patient_id: Uuid,
    #[serde(default)]
    pub proc_id: Option<i32>,
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appt_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub doctor: String,
    pub room: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelAppointmentRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Time slot already booked for {entity_type} on {date} (block {block})")]
    SlotUnavailable {
        entity_type: String,
        date: String,
        block: i32,
    },

    #[error("Appointment not found")]
    NotFound,

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<SupabaseError> for BookingError {
    fn from(e: SupabaseError) -> Self {
        BookingError::Database(e.to_string())
    }
}
