//! Condition key → tenant-owned procedure record, plus the patient-facing
//! display names. The cross-tenant fallback is a named, logged function so
//! tenant-isolation exceptions stay auditable.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use shared_database::SupabaseClient;
use shared_models::domain::{Procedure, Specialization};

use crate::models::TriageError;
use crate::services::classifier::ConditionKey;

/// Internal condition key → canonical procedure name in the catalog.
pub fn procedure_name_for(condition: ConditionKey) -> &'static str {
    match condition {
        ConditionKey::RootCanal => "Root Canal Treatment",
        ConditionKey::WisdomExtraction => "Wisdom Tooth Extraction (Sedation)",
        ConditionKey::Emergency => "Emergency Triage",
        ConditionKey::GeneralCheckup => "General Checkup",
        ConditionKey::Filling => "Dental Filling",
        ConditionKey::Crown => "Dental Crown",
    }
}

/// Patient-facing label, deliberately distinct from the internal procedure so
/// the system never phrases a treatment commitment.
pub fn display_name_for(condition: ConditionKey) -> &'static str {
    match condition {
        ConditionKey::RootCanal => "Endodontic Evaluation (Microscope)",
        ConditionKey::WisdomExtraction => "Oral Surgery Consultation (Wisdom)",
        ConditionKey::Filling => "Restorative Assessment",
        ConditionKey::Crown => "Restorative Assessment (Major)",
        ConditionKey::Emergency => "Emergency Triage Assessment",
        ConditionKey::GeneralCheckup => "General Checkup",
    }
}

/// Specialist label used when the specialization record is unavailable.
pub fn fallback_specialist_for(condition: ConditionKey) -> &'static str {
    match condition {
        ConditionKey::RootCanal => "Endodontist",
        ConditionKey::WisdomExtraction => "Oral Surgeon",
        ConditionKey::Filling | ConditionKey::Crown => "General Dentist",
        ConditionKey::Emergency => "General Dentist",
        ConditionKey::GeneralCheckup => "General Dentist",
    }
}

pub struct ProcedureResolver {
    supabase: Arc<SupabaseClient>,
}

impl ProcedureResolver {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Tenant-scoped lookup first; a miss with a tenant set falls through to
    /// the explicit cross-tenant path.
    pub async fn resolve(
        &self,
        condition: ConditionKey,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Option<Procedure>, TriageError> {
        let name = procedure_name_for(condition);

        if let Some(tenant) = tenant_id {
            let path = format!(
                "/rest/v1/procedures?name=eq.{}&tenant_id=eq.{}",
                urlencoding::encode(name),
                tenant
            );
            let rows: Vec<Value> = self
                .supabase
                .request(Method::GET, &path, Some(auth_token), None)
                .await?;
            if let Some(proc) = rows
                .into_iter()
                .next()
                .and_then(|v| serde_json::from_value(v).ok())
            {
                return Ok(Some(proc));
            }
            return self.find_by_name_any_tenant(name, auth_token).await;
        }

        self.find_by_name_any_tenant(name, auth_token).await
    }

    /// Cross-tenant lookup by procedure name; first match wins.
    async fn find_by_name_any_tenant(
        &self,
        name: &str,
        auth_token: &str,
    ) -> Result<Option<Procedure>, TriageError> {
        let path = format!(
            "/rest/v1/procedures?name=eq.{}&limit=1",
            urlencoding::encode(name)
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let proc: Option<Procedure> = rows
            .into_iter()
            .next()
            .and_then(|v| serde_json::from_value(v).ok());
        if let Some(p) = &proc {
            warn!(
                "Cross-tenant procedure fallback used for '{}' (owner tenant {:?})",
                name, p.tenant_id
            );
        }
        Ok(proc)
    }

    /// Human specialist label for a procedure's required specialization.
    pub async fn specialist_type(
        &self,
        procedure: &Procedure,
        condition: ConditionKey,
        auth_token: &str,
    ) -> String {
        let path = format!(
            "/rest/v1/specializations?spec_id=eq.{}",
            procedure.required_spec_id
        );
        let rows: Result<Vec<Value>, _> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await;

        rows.ok()
            .and_then(|rows| rows.into_iter().next())
            .and_then(|v| serde_json::from_value::<Specialization>(v).ok())
            .map(|s| s.name)
            .unwrap_or_else(|| fallback_specialist_for(condition).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_condition_has_procedure_and_display_names() {
        for condition in [
            ConditionKey::RootCanal,
            ConditionKey::WisdomExtraction,
            ConditionKey::Emergency,
            ConditionKey::GeneralCheckup,
            ConditionKey::Filling,
            ConditionKey::Crown,
        ] {
            assert!(!procedure_name_for(condition).is_empty());
            assert!(!display_name_for(condition).is_empty());
            assert!(!fallback_specialist_for(condition).is_empty());
        }
    }

    #[test]
    fn display_names_avoid_treatment_phrasing_for_pulpal_cases() {
        // The user-facing label for a suspected pulpal case must not promise
        // the procedure itself.
        assert_eq!(
            display_name_for(ConditionKey::RootCanal),
            "Endodontic Evaluation (Microscope)"
        );
    }
}
