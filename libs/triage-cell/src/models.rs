use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use scheduling_cell::models::{SlotOption, TieredSlots};
use shared_database::SupabaseError;

// ==============================================================================
// CLOSED ENUMERATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    #[default]
    Low,
    Medium,
    High,
    Emergency,
}

/// What the analyzer believes should happen next. The clinical gate — not the
/// LLM, and not this enum — has the final say on routing; `Route` here only
/// means "clinical content present, hand it to the gate".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Clarify,
    Route,
    Escalate,
    Greeting,
    SmallTalk,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestedAction {
    Orchestrate,
    Escalate,
    #[default]
    Clarify,
    Greeting,
    SmallTalk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Sentiment {
    Anxious,
    #[default]
    Neutral,
    Frustrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    Complete,
    #[default]
    Incomplete,
}

// ==============================================================================
// CLINICAL ISSUE (runtime state, one per concern per turn)
// ==============================================================================

/// Structured features for one dental concern, fused across turns. Everything
/// the gate and classifier consume lives here; free text never reaches them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClinicalIssue {
    // Feature flags extracted from the patient's description.
    #[serde(default)]
    pub has_pain: bool,
    #[serde(default)]
    pub thermal_sensitivity: bool,
    #[serde(default)]
    pub biting_pain: bool,
    #[serde(default)]
    pub swelling: bool,
    #[serde(default)]
    pub visible_swelling: bool,
    #[serde(default)]
    pub airway_compromise: bool,
    #[serde(default)]
    pub trauma: bool,
    #[serde(default)]
    pub bleeding: bool,
    #[serde(default)]
    pub impacted_wisdom: bool,
    #[serde(default)]
    pub requires_sedation: bool,

    // Scalars.
    #[serde(default)]
    pub severity: Option<u8>,
    #[serde(default)]
    pub duration_days: Option<u32>,
    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub reported_symptoms: Vec<String>,

    // Provenance.
    #[serde(default)]
    pub symptom_cluster: String,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub reasoning: String,

    // Gate state, recomputed each turn.
    #[serde(default)]
    pub clinical_profile: BTreeMap<String, bool>,
    #[serde(default)]
    pub missing_clinical_elements: Vec<String>,

    /// Explicit structured answers keyed by stable field key; survives merges.
    #[serde(default)]
    pub field_answers: BTreeMap<String, String>,
}

// ==============================================================================
// ANALYZER OUTPUT
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntentResult {
    #[serde(default)]
    pub issues: Vec<ClinicalIssue>,
    #[serde(default)]
    pub overall_urgency: Urgency,
    #[serde(default)]
    pub requires_clarification: bool,
    #[serde(default)]
    pub clarification_questions: Vec<String>,
    #[serde(default)]
    pub safety_flag: bool,
    #[serde(default)]
    pub action_type: ActionType,
    #[serde(default)]
    pub patient_sentiment: Sentiment,
    #[serde(default)]
    pub completion_status: CompletionStatus,
}

// ==============================================================================
// ORCHESTRATION PLAN (wire-visible)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedIssue {
    pub issue_index: usize,
    pub symptom_cluster: String,
    pub urgency: Urgency,
    pub specialist_type: String,
    #[serde(default)]
    pub procedure_id: Option<i32>,
    pub procedure_name: String,
    pub appointment_type: String,
    pub duration_minutes: u32,
    pub consult_minutes: u32,
    #[serde(default)]
    pub reasoning_triggers: Vec<String>,
    #[serde(default)]
    pub room_capability: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub requires_sedation: bool,
    #[serde(default)]
    pub requires_anesthetist: bool,
    #[serde(default)]
    pub slots: Option<TieredSlots>,
    #[serde(default)]
    pub fallback_tier: u8,
    #[serde(default)]
    pub fallback_note: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationIssue {
    pub issue_id: String,
    pub summary: String,
    pub missing_fields: Vec<String>,
    pub status: String,
    pub missing_elements: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clarification {
    pub issues: Vec<ClarificationIssue>,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrchestrationPlan {
    pub is_emergency: bool,
    pub overall_urgency: Urgency,
    #[serde(default)]
    pub issues: Vec<ClinicalIssue>,
    #[serde(default)]
    pub routed_issues: Vec<RoutedIssue>,
    pub suggested_action: SuggestedAction,
    pub combined_visit_possible: bool,
    pub patient_sentiment: Sentiment,
    #[serde(default)]
    pub clarification_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<Clarification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_slots: Option<SlotOption>,
}

// ==============================================================================
// REQUEST / ERRORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriageRequest {
    pub symptoms: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub structured_answers: HashMap<String, Value>,
    /// Issues from the previous plan, echoed back so multi-turn intake can
    /// fuse state without server-side sessions.
    #[serde(default)]
    pub issues: Vec<ClinicalIssue>,
}

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM extraction failed: {0}")]
    Extraction(String),
}

impl From<SupabaseError> for TriageError {
    fn from(e: SupabaseError) -> Self {
        TriageError::Database(e.to_string())
    }
}

impl From<scheduling_cell::models::SchedulingError> for TriageError {
    fn from(e: scheduling_cell::models::SchedulingError) -> Self {
        TriageError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_orders_low_to_emergency() {
        assert!(Urgency::Emergency > Urgency::High);
        assert!(Urgency::High > Urgency::Medium);
        assert!(Urgency::Medium > Urgency::Low);
    }

    #[test]
    fn action_type_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_value(ActionType::SmallTalk).unwrap(),
            "SMALL_TALK"
        );
        assert_eq!(serde_json::to_value(ActionType::Clarify).unwrap(), "CLARIFY");
    }
}
