//! Intent analyzer: deterministic pre-filters first (red flags, greetings),
//! the LLM feature extractor only for genuinely clinical text, then a
//! deterministic merge of prior turns, structured answers, and new features.
//! The analyzer never decides routing; that belongs to the clinical gate.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::{
    ActionType, ChatMessage, ClinicalIssue, CompletionStatus, IntentResult, Urgency,
};
use crate::services::llm::{
    parse_extraction, ExtractedIssue, GeminiClient, LlmClient, EXTRACTOR_SYSTEM_PROMPT,
};
use crate::services::patterns::{
    is_greeting, is_small_talk, mentions_sedation, red_flag_match, violates_output_safety,
    RedFlagKind,
};

/// Standard intake questions used whenever the extractor is unavailable.
pub const DEFAULT_CLARIFICATION_QUESTIONS: [&str; 4] = [
    "Where exactly is the pain or problem?",
    "How long has it been going on?",
    "How severe is it on a scale of 1-10?",
    "Is there any swelling or bleeding?",
];

const SAFE_REASONING: &str = "Clinical routing criteria met.";
const SAFE_CLARIFY_PROMPT: &str =
    "I'd like to understand your symptoms better so I can connect you with the right specialist. Could you describe what you're experiencing?";

const GREETING_WORD_LIMIT: usize = 10;
const HISTORY_CONTEXT_MESSAGES: usize = 4;

pub struct IntentAnalyzer {
    llm: Option<Arc<dyn LlmClient>>,
}

impl IntentAnalyzer {
    pub fn new(config: &AppConfig) -> Self {
        let llm: Option<Arc<dyn LlmClient>> = if config.is_llm_configured() {
            match GeminiClient::new(config) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!("LLM client unavailable, extractor degraded: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Self { llm }
    }

    pub fn with_llm(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm: Some(llm) }
    }

    pub fn without_llm() -> Self {
        Self { llm: None }
    }

    pub async fn analyze(
        &self,
        text: &str,
        history: &[ChatMessage],
        structured_answers: &HashMap<String, Value>,
        prior_issues: Vec<ClinicalIssue>,
    ) -> IntentResult {
        let trimmed = text.trim();

        // ── S0: empty input ─────────────────────────────────────────────
        if trimmed.is_empty() {
            if prior_issues.is_empty() && structured_answers.is_empty() {
                return IntentResult {
                    requires_clarification: true,
                    clarification_questions: vec![
                        "Please describe your dental concern so I can assist you.".to_string(),
                    ],
                    action_type: ActionType::Unknown,
                    ..Default::default()
                };
            }
            // Merge path: structured answers land on the carried-over issues.
            let mut issues = prior_issues;
            for issue in &mut issues {
                apply_structured_answers(issue, structured_answers);
            }
            return self.result_from_issues(issues, Urgency::Low, Vec::new(), Default::default());
        }

        // ── S1: red-flag escalation, no LLM involved ────────────────────
        if let Some(flag) = red_flag_match(trimmed) {
            let mut issue = ClinicalIssue {
                symptom_cluster: trimmed.chars().take(120).collect(),
                urgency: Urgency::Emergency,
                reasoning: format!("Emergency red flag: {}", flag.label),
                reported_symptoms: vec![flag.label.to_string()],
                ..Default::default()
            };
            match flag.kind {
                RedFlagKind::Airway => issue.airway_compromise = true,
                RedFlagKind::Bleeding => issue.bleeding = true,
                RedFlagKind::Trauma => issue.trauma = true,
                RedFlagKind::Systemic => issue.trauma = true,
            }
            return IntentResult {
                issues: vec![issue],
                overall_urgency: Urgency::Emergency,
                safety_flag: true,
                action_type: ActionType::Escalate,
                completion_status: CompletionStatus::Complete,
                ..Default::default()
            };
        }

        // ── S2: greetings and small talk (short inputs only) ────────────
        if trimmed.split_whitespace().count() < GREETING_WORD_LIMIT {
            if is_greeting(trimmed) {
                return IntentResult {
                    action_type: ActionType::Greeting,
                    ..Default::default()
                };
            }
            if is_small_talk(trimmed) {
                return IntentResult {
                    action_type: ActionType::SmallTalk,
                    ..Default::default()
                };
            }
        }

        // ── S3: LLM feature extraction ──────────────────────────────────
        let extraction = match self.extract(trimmed, history).await {
            Some(extraction) => extraction,
            None => {
                // Deterministic degradation: standard intake questions.
                let mut issues = prior_issues;
                for issue in &mut issues {
                    apply_structured_answers(issue, structured_answers);
                }
                let questions = DEFAULT_CLARIFICATION_QUESTIONS
                    .iter()
                    .map(|q| q.to_string())
                    .collect();
                return IntentResult {
                    issues,
                    overall_urgency: Urgency::Low,
                    requires_clarification: true,
                    clarification_questions: self.suppress_repeats(questions, history),
                    action_type: ActionType::Clarify,
                    ..Default::default()
                };
            }
        };

        let sedation_in_text = mentions_sedation(trimmed);
        let mut new_issues: Vec<ClinicalIssue> = extraction
            .issues
            .into_iter()
            .map(|e| {
                let mut issue = issue_from_extraction(e);
                if sedation_in_text {
                    issue.requires_sedation = true;
                }
                issue
            })
            .collect();

        // ── S3a: post-LLM safety scan ───────────────────────────────────
        let violation = new_issues.iter().any(|i| {
            violates_output_safety(&i.reasoning) || violates_output_safety(&i.symptom_cluster)
        }) || extraction
            .clarification_questions
            .iter()
            .any(|q| violates_output_safety(q));
        if violation {
            warn!("LLM output failed safety scan; reasoning overwritten, forcing clarification");
            for issue in &mut new_issues {
                issue.reasoning = SAFE_REASONING.to_string();
            }
            let mut issues = merge_issues(prior_issues, new_issues);
            for issue in &mut issues {
                apply_structured_answers(issue, structured_answers);
            }
            return IntentResult {
                issues,
                overall_urgency: extraction.overall_urgency.min(Urgency::Medium),
                requires_clarification: true,
                clarification_questions: vec![SAFE_CLARIFY_PROMPT.to_string()],
                action_type: ActionType::Clarify,
                patient_sentiment: extraction.patient_sentiment,
                ..Default::default()
            };
        }

        // ── S4 + S4b: fuse with prior state, ingest structured answers ──
        let mut issues = merge_issues(prior_issues, new_issues);
        for issue in &mut issues {
            apply_structured_answers(issue, structured_answers);
        }

        // ── S5: hand off to the gate ────────────────────────────────────
        let questions =
            self.suppress_repeats(extraction.clarification_questions.clone(), history);
        let requires_clarification =
            (extraction.requires_clarification && !questions.is_empty()) || issues.is_empty();

        let mut result = self.result_from_issues(
            issues,
            extraction.overall_urgency,
            questions,
            extraction.patient_sentiment,
        );
        if requires_clarification {
            result.requires_clarification = true;
            result.action_type = ActionType::Clarify;
        }
        result
    }

    fn result_from_issues(
        &self,
        issues: Vec<ClinicalIssue>,
        floor_urgency: Urgency,
        clarification_questions: Vec<String>,
        patient_sentiment: crate::models::Sentiment,
    ) -> IntentResult {
        let overall_urgency = issues
            .iter()
            .map(|i| i.urgency)
            .max()
            .unwrap_or(floor_urgency)
            .max(floor_urgency);
        let safety_flag = issues.iter().any(|i| i.airway_compromise || i.bleeding);

        IntentResult {
            action_type: if safety_flag {
                ActionType::Escalate
            } else if issues.is_empty() {
                ActionType::Unknown
            } else {
                ActionType::Route
            },
            overall_urgency: if safety_flag {
                Urgency::Emergency
            } else {
                overall_urgency
            },
            safety_flag,
            issues,
            clarification_questions,
            patient_sentiment,
            ..Default::default()
        }
    }

    async fn extract(
        &self,
        text: &str,
        history: &[ChatMessage],
    ) -> Option<crate::services::llm::Extraction> {
        let llm = self.llm.as_ref()?;

        let mut prompt = String::new();
        if !history.is_empty() {
            let recent = history
                .iter()
                .rev()
                .take(HISTORY_CONTEXT_MESSAGES)
                .rev()
                .map(|m| format!("{}: {}", m.role.to_uppercase(), m.content))
                .collect::<Vec<_>>()
                .join("\n");
            prompt.push_str(&format!("CHAT HISTORY:\n{}\n\nCURRENT PATIENT MESSAGE:\n", recent));
        }
        prompt.push_str(text);

        let raw = match llm.generate_json(EXTRACTOR_SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("LLM extraction failed: {}", e);
                return None;
            }
        };

        match parse_extraction(&raw) {
            Ok(extraction) => Some(extraction),
            Err(e) => {
                warn!("LLM returned malformed extraction: {}", e);
                None
            }
        }
    }

    /// Loop prevention: a question the assistant just asked verbatim is
    /// dropped so the gate re-derives the next element instead of repeating.
    fn suppress_repeats(&self, questions: Vec<String>, history: &[ChatMessage]) -> Vec<String> {
        let Some(last_assistant) = history.iter().rev().find(|m| m.role == "assistant") else {
            return questions;
        };
        let repeated = questions
            .iter()
            .any(|q| last_assistant.content.contains(q.as_str()));
        if repeated {
            debug!("Dropping repeated clarification questions");
            Vec::new()
        } else {
            questions
        }
    }
}

fn issue_from_extraction(e: ExtractedIssue) -> ClinicalIssue {
    ClinicalIssue {
        has_pain: e.has_pain,
        thermal_sensitivity: e.thermal_sensitivity,
        biting_pain: e.biting_pain,
        swelling: e.swelling,
        visible_swelling: e.visible_swelling,
        airway_compromise: e.airway_compromise,
        trauma: e.trauma,
        bleeding: e.bleeding,
        impacted_wisdom: e.impacted_wisdom,
        requires_sedation: e.requires_sedation,
        severity: e.severity,
        duration_days: e.duration_days,
        location: e.location,
        reported_symptoms: e.reported_symptoms,
        symptom_cluster: e.symptom_cluster,
        urgency: e.urgency,
        reasoning: e.reasoning,
        ..Default::default()
    }
}

// ==============================================================================
// STATE MERGE (prior ⊕ new)
// ==============================================================================

/// Positional fuse of the previous turn's issues with freshly extracted ones.
/// Booleans OR, scalars prefer the new turn, collections union.
pub fn merge_issues(prior: Vec<ClinicalIssue>, new: Vec<ClinicalIssue>) -> Vec<ClinicalIssue> {
    if prior.is_empty() {
        return new;
    }
    if new.is_empty() {
        return prior;
    }

    let mut merged = Vec::with_capacity(prior.len().max(new.len()));
    let mut prior_iter = prior.into_iter();
    let mut new_iter = new.into_iter();

    loop {
        match (prior_iter.next(), new_iter.next()) {
            (Some(old), Some(fresh)) => merged.push(fuse(old, fresh)),
            (Some(old), None) => merged.push(old),
            (None, Some(fresh)) => merged.push(fresh),
            (None, None) => break,
        }
    }
    merged
}

fn fuse(old: ClinicalIssue, new: ClinicalIssue) -> ClinicalIssue {
    let mut field_answers = old.field_answers;
    field_answers.extend(new.field_answers);

    let mut reported_symptoms = old.reported_symptoms;
    for symptom in new.reported_symptoms {
        if !reported_symptoms.contains(&symptom) {
            reported_symptoms.push(symptom);
        }
    }

    ClinicalIssue {
        has_pain: old.has_pain || new.has_pain,
        thermal_sensitivity: old.thermal_sensitivity || new.thermal_sensitivity,
        biting_pain: old.biting_pain || new.biting_pain,
        swelling: old.swelling || new.swelling,
        visible_swelling: old.visible_swelling || new.visible_swelling,
        airway_compromise: old.airway_compromise || new.airway_compromise,
        trauma: old.trauma || new.trauma,
        bleeding: old.bleeding || new.bleeding,
        impacted_wisdom: old.impacted_wisdom || new.impacted_wisdom,
        requires_sedation: old.requires_sedation || new.requires_sedation,
        severity: new.severity.or(old.severity),
        duration_days: new.duration_days.or(old.duration_days),
        location: new.location.or(old.location),
        reported_symptoms,
        symptom_cluster: if new.symptom_cluster.is_empty() {
            old.symptom_cluster
        } else {
            new.symptom_cluster
        },
        urgency: old.urgency.max(new.urgency),
        reasoning: if new.reasoning.is_empty() {
            old.reasoning
        } else {
            new.reasoning
        },
        // Gate state is recomputed every turn.
        clinical_profile: Default::default(),
        missing_clinical_elements: Vec::new(),
        field_answers,
    }
}

// ==============================================================================
// STRUCTURED-ANSWER INGESTION
// ==============================================================================

/// Write UI-provided answers onto the issue. Keys are normalized to lowercase;
/// every key lands in `field_answers`, recognized keys also update features.
pub fn apply_structured_answers(issue: &mut ClinicalIssue, answers: &HashMap<String, Value>) {
    for (raw_key, raw_value) in answers {
        let key = raw_key.trim().to_lowercase();
        let value = value_to_string(raw_value);
        if value.is_empty() {
            continue;
        }
        let lower_value = value.to_lowercase();

        match key.as_str() {
            "location" | "pain_location" => {
                issue.location = Some(value.clone());
            }
            "pain_severity" | "severity" => {
                if let Some(sev) = parse_severity(raw_value) {
                    issue.severity = Some(sev);
                    issue.has_pain = true;
                }
            }
            "duration" | "duration_days" => {
                if let Some(days) = parse_duration_days(&lower_value) {
                    issue.duration_days = Some(days);
                }
            }
            "thermal_duration" => {
                issue.thermal_sensitivity = true;
            }
            "stimulus" => {
                issue.has_pain = true;
                if contains_any(&lower_value, &["hot", "cold", "thermal"]) {
                    issue.thermal_sensitivity = true;
                }
                if contains_any(&lower_value, &["chew", "biting", "pressure"]) {
                    issue.biting_pain = true;
                }
            }
            "swelling_location" => {
                issue.swelling = true;
                if contains_any(&lower_value, &["face", "cheek", "jaw", "neck", "floor"]) {
                    issue.visible_swelling = true;
                }
            }
            "airway_status" => {
                if contains_any(
                    &lower_value,
                    &["difficulty breathing", "unable", "can't breathe", "cant breathe"],
                ) {
                    issue.airway_compromise = true;
                }
            }
            "hemorrhage_status" => {
                if contains_any(&lower_value, &["uncontrolled", "heavy", "fills mouth"]) {
                    issue.bleeding = true;
                }
            }
            _ => {
                let entry = format!("{}: {}", key, value);
                if !issue.reported_symptoms.contains(&entry) {
                    issue.reported_symptoms.push(entry);
                }
            }
        }

        issue.field_answers.insert(key, value);
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_severity(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().map(|v| v.min(10) as u8),
        Value::String(s) => first_integer(s).map(|v| v.min(10) as u8),
        _ => None,
    }
}

/// Duration grammar: the intake picker's ranges map to representative day
/// counts; anything else falls back to the first integer in the answer.
pub fn parse_duration_days(value: &str) -> Option<u32> {
    let v = value.trim().to_lowercase();
    if v.is_empty() {
        return None;
    }
    if v.contains("less than 24") || v.contains("today") {
        return Some(1);
    }
    if v.contains("more than 2 week") {
        return Some(21);
    }
    if v.contains("1-2 week") {
        return Some(10);
    }
    if v.contains("4-7") {
        return Some(5);
    }
    if v.contains("1-3") {
        return Some(2);
    }
    first_integer(&v)
}

fn first_integer(s: &str) -> Option<u32> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
