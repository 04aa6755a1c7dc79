//! Orchestrator: composes analyzer → gate → classifier → resolver → tiered
//! routing into one plan. Phase order is fixed; the gate alone opens the
//! routing phase.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use scheduling_cell::services::emergency::EmergencyFinder;
use scheduling_cell::services::routing::RoutingService;
use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    ActionType, ChatMessage, Clarification, ClarificationIssue, ClinicalIssue, IntentResult,
    OrchestrationPlan, RoutedIssue, SuggestedAction, TriageError, Urgency,
};
use crate::services::classifier::{classify, ConditionKey};
use crate::services::gate;
use crate::services::intent::IntentAnalyzer;
use crate::services::llm::LlmClient;
use crate::services::resolver::{display_name_for, ProcedureResolver};

pub struct OrchestrationService {
    analyzer: IntentAnalyzer,
    resolver: ProcedureResolver,
    routing: RoutingService,
    emergency: EmergencyFinder,
}

impl OrchestrationService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            analyzer: IntentAnalyzer::new(config),
            resolver: ProcedureResolver::new(Arc::clone(&supabase)),
            routing: RoutingService::new(Arc::clone(&supabase)),
            emergency: EmergencyFinder::new(supabase),
        }
    }

    /// Deterministic LLM injection point for tests.
    pub fn with_llm(config: &AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            analyzer: IntentAnalyzer::with_llm(llm),
            resolver: ProcedureResolver::new(Arc::clone(&supabase)),
            routing: RoutingService::new(Arc::clone(&supabase)),
            emergency: EmergencyFinder::new(supabase),
        }
    }

    /// The single entry point: analyze the turn, then orchestrate it.
    pub async fn run(
        &self,
        text: &str,
        history: &[ChatMessage],
        structured_answers: &HashMap<String, Value>,
        prior_issues: Vec<ClinicalIssue>,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<OrchestrationPlan, TriageError> {
        let intent = self
            .analyzer
            .analyze(text, history, structured_answers, prior_issues)
            .await;
        self.orchestrate(intent, tenant_id, auth_token).await
    }

    pub async fn orchestrate(
        &self,
        intent: IntentResult,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<OrchestrationPlan, TriageError> {
        // ── Phase 0: emergency override ─────────────────────────────────
        let gate_escalation = intent.issues.iter().any(gate::must_escalate);
        if intent.safety_flag
            || intent.overall_urgency == Urgency::Emergency
            || intent.action_type == ActionType::Escalate
            || gate_escalation
        {
            // Resolving the emergency procedure validates the tenant's
            // catalog even though the finder itself books a bare triage block.
            if self
                .resolver
                .resolve(ConditionKey::Emergency, tenant_id, auth_token)
                .await?
                .is_none()
            {
                warn!("Tenant {:?} has no Emergency Triage procedure", tenant_id);
            }

            let emergency_slot = match self.emergency.find_earliest(tenant_id, auth_token).await {
                Ok(slot) => slot,
                Err(e) => {
                    warn!("Emergency slot search failed: {}", e);
                    None
                }
            };

            return Ok(OrchestrationPlan {
                is_emergency: true,
                overall_urgency: Urgency::Emergency,
                issues: intent.issues,
                routed_issues: Vec::new(),
                suggested_action: SuggestedAction::Escalate,
                combined_visit_possible: false,
                patient_sentiment: intent.patient_sentiment,
                clarification_questions: Vec::new(),
                clarification: None,
                emergency_slots: emergency_slot,
            });
        }

        // ── Phase 1: non-clinical intents ───────────────────────────────
        if matches!(
            intent.action_type,
            ActionType::Greeting | ActionType::SmallTalk
        ) {
            return Ok(OrchestrationPlan {
                is_emergency: false,
                overall_urgency: Urgency::Low,
                issues: intent.issues,
                suggested_action: if intent.action_type == ActionType::Greeting {
                    SuggestedAction::Greeting
                } else {
                    SuggestedAction::SmallTalk
                },
                patient_sentiment: intent.patient_sentiment,
                ..Default::default()
            });
        }

        // ── Phase 2: the clinical gate ──────────────────────────────────
        let mut issues = intent.issues;
        for issue in &mut issues {
            gate::assess_completeness(issue);
            gate::prune_answered(issue);
        }

        let gate_closed = issues.is_empty()
            || issues.iter().any(|i| !gate::route_permitted(i))
            || intent.requires_clarification;

        if gate_closed {
            let mut questions: Vec<String> = Vec::new();
            for issue in &issues {
                if let Some(q) = gate::next_question(issue) {
                    if !questions.iter().any(|existing| existing == q) {
                        questions.push(q.to_string());
                    }
                }
            }
            if questions.is_empty() {
                questions = intent.clarification_questions.clone();
            }
            if questions.is_empty() {
                questions.push("Could you describe your symptoms in more detail?".to_string());
            }

            let clarification_issues: Vec<ClarificationIssue> = issues
                .iter()
                .enumerate()
                .filter(|(_, i)| !i.missing_clinical_elements.is_empty())
                .map(|(idx, i)| ClarificationIssue {
                    issue_id: format!("issue_{}", idx + 1),
                    summary: i.symptom_cluster.clone(),
                    missing_fields: i.missing_clinical_elements.clone(),
                    status: "Incomplete".to_string(),
                    missing_elements: i.missing_clinical_elements.clone(),
                })
                .collect();

            return Ok(OrchestrationPlan {
                is_emergency: false,
                overall_urgency: intent.overall_urgency,
                issues,
                suggested_action: SuggestedAction::Clarify,
                patient_sentiment: intent.patient_sentiment,
                clarification_questions: questions,
                clarification: Some(Clarification {
                    issues: clarification_issues,
                    mode: "CLINICAL_INTAKE".to_string(),
                }),
                ..Default::default()
            });
        }

        // ── Phase 3: classify → resolve → route, per issue ──────────────
        let mut routed_issues = Vec::with_capacity(issues.len());
        for (idx, issue) in issues.iter().enumerate() {
            let (condition, triggers) = classify(issue);
            info!(
                "Issue {} classified as '{}' (triggers: {:?})",
                idx,
                condition.as_str(),
                triggers
            );

            let procedure = self.resolver.resolve(condition, tenant_id, auth_token).await?;

            let routed = match procedure {
                Some(proc) => {
                    let needs_sedation = issue.requires_sedation || proc.requires_anesthetist;
                    let slots = self
                        .routing
                        .find_with_fallback(&proc, needs_sedation, None, None, tenant_id, auth_token)
                        .await?;
                    let specialist = self
                        .resolver
                        .specialist_type(&proc, condition, auth_token)
                        .await;

                    RoutedIssue {
                        issue_index: idx,
                        symptom_cluster: issue.symptom_cluster.clone(),
                        urgency: issue.urgency,
                        specialist_type: specialist,
                        procedure_id: Some(proc.proc_id),
                        procedure_name: display_name_for(condition).to_string(),
                        appointment_type: if proc.consult_duration_minutes > 0 {
                            "Extended Evaluation Appointment".to_string()
                        } else {
                            "Specialist Consultation".to_string()
                        },
                        duration_minutes: proc.base_duration_minutes,
                        consult_minutes: proc.consult_duration_minutes,
                        reasoning_triggers: triggers,
                        room_capability: proc.required_room_capability.clone(),
                        requires_sedation: needs_sedation,
                        requires_anesthetist: proc.requires_anesthetist,
                        fallback_tier: slots.tier,
                        fallback_note: slots.note.clone(),
                        slots: Some(slots),
                        error: None,
                    }
                }
                None => RoutedIssue {
                    issue_index: idx,
                    symptom_cluster: issue.symptom_cluster.clone(),
                    urgency: issue.urgency,
                    specialist_type: "General Dentist".to_string(),
                    procedure_id: None,
                    procedure_name: display_name_for(condition).to_string(),
                    appointment_type: "Specialist Consultation".to_string(),
                    duration_minutes: 30,
                    consult_minutes: 0,
                    reasoning_triggers: triggers,
                    room_capability: None,
                    requires_sedation: issue.requires_sedation,
                    requires_anesthetist: false,
                    slots: None,
                    fallback_tier: 0,
                    fallback_note: None,
                    error: Some("Procedure resolution failed".to_string()),
                },
            };
            routed_issues.push(routed);
        }

        // ── Phase 4: combiner ───────────────────────────────────────────
        let combined_visit_possible = !routed_issues.is_empty()
            && routed_issues
                .iter()
                .all(|r| r.slots.as_ref().is_some_and(|s| s.has_slots()))
            && {
                let mut shared: Option<HashSet<Uuid>> = None;
                for routed in &routed_issues {
                    let clinics = routed
                        .slots
                        .as_ref()
                        .map(|s| s.clinic_ids())
                        .unwrap_or_default();
                    shared = Some(match shared {
                        Some(acc) => acc.intersection(&clinics).copied().collect(),
                        None => clinics,
                    });
                }
                shared.map(|s| !s.is_empty()).unwrap_or(false)
            };

        // ── Phase 5: deterministic urgency roll-up ──────────────────────
        let overall_urgency = routed_issues
            .iter()
            .map(|r| r.urgency)
            .max()
            .unwrap_or(intent.overall_urgency);

        let all_resolved =
            !routed_issues.is_empty() && routed_issues.iter().all(|r| r.procedure_id.is_some());

        Ok(OrchestrationPlan {
            is_emergency: false,
            overall_urgency,
            issues,
            routed_issues,
            suggested_action: if all_resolved {
                SuggestedAction::Orchestrate
            } else {
                SuggestedAction::Clarify
            },
            combined_visit_possible,
            patient_sentiment: intent.patient_sentiment,
            clarification_questions: Vec::new(),
            clarification: None,
            emergency_slots: None,
        })
    }
}
