//! Tenant-scoped clinical records as they exist in the `rest/v1` schema.
//! A clinic's UUID doubles as its tenant id.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    pub clinic_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub onboarding_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    #[serde(rename = "type", default)]
    pub room_type: String,
    #[serde(default)]
    pub capabilities: HashMap<String, Value>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default = "default_active")]
    pub status: String,
}

fn default_active() -> String {
    "active".to_string()
}

impl Room {
    /// Required capabilities match by subset inclusion with scalar equality.
    pub fn satisfies(&self, required: &HashMap<String, Value>) -> bool {
        required
            .iter()
            .all(|(k, v)| self.capabilities.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub doctor_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Specialization {
    pub spec_id: i32,
    pub tenant_id: Option<Uuid>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSpecialization {
    pub doctor_id: Uuid,
    pub spec_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub staff_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedure {
    pub proc_id: i32,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub base_duration_minutes: u32,
    #[serde(default)]
    pub consult_duration_minutes: u32,
    pub required_spec_id: i32,
    #[serde(default)]
    pub required_room_capability: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub requires_anesthetist: bool,
    #[serde(default = "default_true")]
    pub allow_same_day_combo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    Doctor,
    Staff,
}

/// Weekly working window for a doctor or staff member at one clinic.
/// A resource may carry several templates for the same weekday (split shifts,
/// or different clinics); templates are the availability *ceiling* that
/// bookings subtract from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityTemplate {
    pub resource_id: Uuid,
    pub resource_type: ResourceType,
    pub clinic_id: Uuid,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Doctor,
    Room,
    Staff,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Doctor => write!(f, "doctor"),
            EntityType::Room => write!(f, "room"),
            EntityType::Staff => write!(f, "staff"),
        }
    }
}

/// One 15-minute grid cell for one physical resource. A row exists only once
/// something has touched it; absence means free within the template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSlot {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub date: NaiveDate,
    pub time_block: i32,
    pub booked: bool,
    #[serde(default)]
    pub appt_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "SCHEDULED"),
            AppointmentStatus::Cancelled => write!(f, "CANCELLED"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub appt_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub room_id: Uuid,
    #[serde(default)]
    pub staff_id: Option<Uuid>,
    pub clinic_id: Uuid,
    #[serde(default)]
    pub proc_id: Option<i32>,
    #[serde(default)]
    pub procedure_type: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
}
