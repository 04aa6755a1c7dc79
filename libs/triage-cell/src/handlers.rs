//! Triage surface: runs the orchestration pipeline and renders the
//! patient-facing message. All clinical decisions happen in services; this
//! layer only phrases them, with sentiment-aware tone and no diagnosis words.

use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{OrchestrationPlan, Sentiment, SuggestedAction, TriageRequest};
use crate::services::orchestrator::OrchestrationService;

pub async fn analyze_symptoms(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<TriageRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let service = OrchestrationService::new(&state);

    let plan = service
        .run(
            &request.symptoms,
            &request.history,
            &request.structured_answers,
            request.issues,
            user.tenant_id,
            token,
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let message = compose_message(&plan);

    let mut payload = serde_json::to_value(&plan)
        .map_err(|e| AppError::Internal(format!("plan serialization failed: {}", e)))?;
    if let Some(obj) = payload.as_object_mut() {
        obj.insert("message".to_string(), json!(message));
    }

    Ok(Json(payload))
}

/// Patient-facing copy per plan outcome. Never names a treatment.
pub fn compose_message(plan: &OrchestrationPlan) -> String {
    match plan.suggested_action {
        SuggestedAction::Escalate => {
            let slot_line = if plan.emergency_slots.is_some() {
                "An emergency slot has been reserved."
            } else {
                "Please proceed to the nearest emergency room."
            };
            format!(
                "🚨 **EMERGENCY DETECTED**\n\nYour symptoms indicate a condition requiring immediate attention.\n{}",
                slot_line
            )
        }
        SuggestedAction::Greeting => "👋 Hi! I'm your clinic's scheduling assistant. \
             I can help you book appointments for multiple issues at once.\n\n\
             Please describe your symptoms, for example:\n\
             • \"I have a toothache and also need a cleaning\""
            .to_string(),
        SuggestedAction::SmallTalk => "I am a clinical assistant designed to help triage dental concerns and schedule \
             specialist evaluations. I don't diagnose or prescribe - I help connect you with \
             the right specialist.\n\nHow can I help you today?"
            .to_string(),
        SuggestedAction::Clarify => {
            let intro = match plan.patient_sentiment {
                Sentiment::Anxious => {
                    "I understand this can be concerning. To make sure we connect you with the right specialist, I need a bit more information:\n\n"
                }
                Sentiment::Frustrated => {
                    "I want to help you as quickly as possible. I just need a few more details:\n\n"
                }
                Sentiment::Neutral => "I need a bit more information to help you effectively:\n\n",
            };
            let questions = plan
                .clarification_questions
                .iter()
                .map(|q| format!("• {}", q))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{}{}", intro, questions)
        }
        SuggestedAction::Orchestrate => {
            let summaries = plan
                .routed_issues
                .iter()
                .enumerate()
                .map(|(i, issue)| {
                    let sedation_note = if issue.requires_sedation {
                        " *(sedation available)*"
                    } else {
                        ""
                    };
                    format!(
                        "{}. **{}** → Evaluation by **{}**{}",
                        i + 1,
                        issue.symptom_cluster,
                        issue.specialist_type,
                        sedation_note
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");

            let combo_text = if plan.combined_visit_possible && plan.routed_issues.len() > 1 {
                "\n\n✨ Good news - we may be able to schedule these evaluations during a **single visit**."
            } else {
                ""
            };

            let issue_word = if plan.routed_issues.len() == 1 {
                "concern"
            } else {
                "concerns"
            };
            format!(
                "Based on the information provided, I've identified **{} {}** that warrant specialist evaluation:\n\n{}{}",
                plan.routed_issues.len(),
                issue_word,
                summaries,
                combo_text
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RoutedIssue, Urgency};

    fn routed(symptoms: &str, specialist: &str) -> RoutedIssue {
        RoutedIssue {
            issue_index: 0,
            symptom_cluster: symptoms.to_string(),
            urgency: Urgency::High,
            specialist_type: specialist.to_string(),
            procedure_id: Some(1),
            procedure_name: "Endodontic Evaluation (Microscope)".to_string(),
            appointment_type: "Extended Evaluation Appointment".to_string(),
            duration_minutes: 90,
            consult_minutes: 20,
            reasoning_triggers: vec![],
            room_capability: None,
            requires_sedation: false,
            requires_anesthetist: false,
            slots: None,
            fallback_tier: 1,
            fallback_note: None,
            error: None,
        }
    }

    #[test]
    fn orchestrate_message_names_specialists_not_treatments() {
        let plan = OrchestrationPlan {
            suggested_action: SuggestedAction::Orchestrate,
            routed_issues: vec![routed("severe molar pain", "Endodontist")],
            ..Default::default()
        };
        let message = compose_message(&plan);
        assert!(message.contains("Endodontist"));
        assert!(!message.contains("Root Canal Treatment"));
        assert!(!message.to_lowercase().contains("pulpitis"));
    }

    #[test]
    fn anxious_clarify_gets_the_gentler_intro() {
        let plan = OrchestrationPlan {
            suggested_action: SuggestedAction::Clarify,
            patient_sentiment: Sentiment::Anxious,
            clarification_questions: vec!["Where is the pain?".to_string()],
            ..Default::default()
        };
        let message = compose_message(&plan);
        assert!(message.to_lowercase().contains("concerning"));
        assert!(message.contains("• Where is the pain?"));
    }

    #[test]
    fn escalate_message_reflects_slot_availability() {
        let plan = OrchestrationPlan {
            suggested_action: SuggestedAction::Escalate,
            is_emergency: true,
            ..Default::default()
        };
        assert!(compose_message(&plan).contains("nearest emergency room"));
    }
}
