//! Pluggable LLM capability. The analyzer only ever sees `LlmClient`; the
//! production implementation talks to Gemini in JSON mode at temperature 0,
//! tests inject a deterministic fake.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;

use crate::models::{Sentiment, Urgency};

/// Extraction contract (spec'd for the feature extractor): the model lists
/// observable features only, never diagnoses, never decides routing, and never
/// escalates unless airway compromise or uncontrolled bleeding is explicit.
pub const EXTRACTOR_SYSTEM_PROMPT: &str = r#"You are a clinical FEATURE EXTRACTOR for a dental appointment system.

You will receive a brief chat history plus the current patient message. Split the content into distinct dental concerns ("issues") and extract ONLY the features listed below.

🚨 HARD RULES:
1. Extract ONLY the listed features. Do not invent symptoms the patient did not state.
2. NEVER diagnose, prescribe, or recommend any treatment or procedure.
3. NEVER decide routing or completeness; another system owns that decision.
4. NEVER set airway_compromise or bleeding unless breathing difficulty or uncontrolled bleeding is EXPLICIT in the patient's words.
5. Use the history to resolve references ("it's the same tooth"), not to invent new issues.

📤 Return ONLY this JSON object, no markdown fences:
{
  "issues": [
    {
      "symptom_cluster": "short factual summary of this concern",
      "reported_symptoms": ["string"],
      "location": "string or null",
      "severity": 1-10 or null,
      "duration_days": integer or null,
      "has_pain": bool,
      "thermal_sensitivity": bool,
      "biting_pain": bool,
      "swelling": bool,
      "visible_swelling": bool,
      "airway_compromise": bool,
      "trauma": bool,
      "bleeding": bool,
      "impacted_wisdom": bool,
      "requires_sedation": bool,
      "urgency": "LOW" | "MEDIUM" | "HIGH" | "EMERGENCY",
      "reasoning": "one factual sentence, no diagnosis words"
    }
  ],
  "overall_urgency": "LOW" | "MEDIUM" | "HIGH" | "EMERGENCY",
  "requires_clarification": bool,
  "clarification_questions": ["string"],
  "patient_sentiment": "Anxious" | "Neutral" | "Frustrated"
}"#;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One JSON-only completion. Implementations must be deterministic at
    /// temperature 0 and honor the request deadline.
    async fn generate_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        if config.gemini_api_key.is_empty() {
            return Err(anyhow!("GEMINI_API_KEY environment variable not set"));
        }
        Ok(Self {
            http_client: Client::new(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            timeout: Duration::from_secs(config.llm_timeout_secs),
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let body = json!({
            "system_instruction": {"parts": [{"text": system_prompt}]},
            "contents": [{"role": "user", "parts": [{"text": user_prompt}]}],
            "generationConfig": {
                "temperature": 0.0,
                "maxOutputTokens": 1500,
                "responseMimeType": "application/json",
            },
        });

        let request = self.http_client.post(&url).json(&body).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| anyhow!("LLM call timed out"))??;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error: {}", error_text));
        }

        let payload: Value = response.json().await?;
        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid LLM response format"))?;

        debug!("LLM extraction returned {} bytes", text.len());
        Ok(text.to_string())
    }
}

// ── Raw extraction payload (deserialized from model output) ─────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExtractedIssue {
    #[serde(default)]
    pub symptom_cluster: String,
    #[serde(default)]
    pub reported_symptoms: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub severity: Option<u8>,
    #[serde(default)]
    pub duration_days: Option<u32>,
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
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Extraction {
    #[serde(default)]
    pub issues: Vec<ExtractedIssue>,
    #[serde(default)]
    pub overall_urgency: Urgency,
    #[serde(default)]
    pub requires_clarification: bool,
    #[serde(default)]
    pub clarification_questions: Vec<String>,
    #[serde(default)]
    pub patient_sentiment: Sentiment,
}

/// Strip optional ```json fences the model sometimes wraps output in.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, then the closing fence.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_extraction(raw: &str) -> Result<Extraction> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned).map_err(|e| anyhow!("malformed extraction JSON: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        let fenced = "```json\n{\"issues\": []}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"issues\": []}");
        assert_eq!(strip_code_fences("{\"issues\": []}"), "{\"issues\": []}");
    }

    #[test]
    fn extraction_defaults_fill_missing_fields() {
        let parsed = parse_extraction(
            r#"{"issues": [{"symptom_cluster": "molar pain", "has_pain": true, "severity": 8, "urgency": "HIGH"}], "overall_urgency": "HIGH"}"#,
        )
        .unwrap();
        assert_eq!(parsed.issues.len(), 1);
        assert!(parsed.issues[0].has_pain);
        assert_eq!(parsed.issues[0].severity, Some(8));
        assert_eq!(parsed.overall_urgency, Urgency::High);
        assert_eq!(parsed.patient_sentiment, Sentiment::Neutral);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_extraction("not json at all").is_err());
    }
}
