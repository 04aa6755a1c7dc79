use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotType {
    #[serde(rename = "COMBO")]
    Combo,
    #[serde(rename = "CONSULT_ONLY")]
    ConsultOnly,
    #[serde(rename = "SINGLE")]
    Single,
    #[serde(rename = "EMERGENCY")]
    Emergency,
}

/// A concrete bookable option on the 15-minute grid. COMBO carries the
/// consult/treatment split times; CONSULT_ONLY and SINGLE are plain runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotOption {
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    pub date: NaiveDate,
    pub time: String,
    pub end_time: String,
    pub time_block: i32,
    pub duration_minutes: u32,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub room_id: Uuid,
    pub room_name: String,
    pub clinic_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_name: Option<String>,
    pub procedure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consult_end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_start_time: Option<String>,
    pub score: f64,
}

/// Result of the tiered fallback search around the slot engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieredSlots {
    pub tier: u8,
    pub tier_label: String,
    pub combo_slots: Vec<SlotOption>,
    pub single_slots: Vec<SlotOption>,
    pub total_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TieredSlots {
    pub fn empty() -> Self {
        Self {
            tier: 0,
            tier_label: "No Availability".to_string(),
            combo_slots: Vec::new(),
            single_slots: Vec::new(),
            total_found: 0,
            note: Some("No slots found. Please contact the clinic directly.".to_string()),
        }
    }

    pub fn has_slots(&self) -> bool {
        !self.combo_slots.is_empty() || !self.single_slots.is_empty()
    }

    /// Clinics reachable through any of this result's slots.
    pub fn clinic_ids(&self) -> std::collections::HashSet<Uuid> {
        self.combo_slots
            .iter()
            .chain(self.single_slots.iter())
            .map(|s| s.clinic_id)
            .collect()
    }
}

#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Procedure not found")]
    ProcedureNotFound,

    #[error("Invalid search parameters: {0}")]
    InvalidQuery(String),
}

impl From<SupabaseError> for SchedulingError {
    fn from(e: SupabaseError) -> Self {
        SchedulingError::Database(e.to_string())
    }
}
