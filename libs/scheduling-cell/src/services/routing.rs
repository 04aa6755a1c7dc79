//! Tiered fallback around the slot engine:
//! tier 1 primary (preferred clinic), tier 2 any clinic in the tenant,
//! tier 3 palliative General Dentist, tier 0 nothing at all.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::SupabaseClient;
use shared_models::domain::{Procedure, Specialization};

use crate::models::{SchedulingError, SlotType, TieredSlots};
use crate::services::engine::SlotFinderService;
use crate::services::optimizer::optimize_slots;

const SLOTS_PER_TIER: usize = 5;

pub struct RoutingService {
    supabase: Arc<SupabaseClient>,
    finder: SlotFinderService,
}

impl RoutingService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        let finder = SlotFinderService::new(Arc::clone(&supabase));
        Self { supabase, finder }
    }

    pub async fn find_with_fallback(
        &self,
        procedure: &Procedure,
        needs_sedation: bool,
        preferred_clinic_id: Option<Uuid>,
        preferred_doctor_id: Option<Uuid>,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<TieredSlots, SchedulingError> {
        self.find_with_fallback_from(
            procedure,
            needs_sedation,
            preferred_clinic_id,
            preferred_doctor_id,
            tenant_id,
            Utc::now().date_naive(),
            auth_token,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn find_with_fallback_from(
        &self,
        procedure: &Procedure,
        needs_sedation: bool,
        preferred_clinic_id: Option<Uuid>,
        preferred_doctor_id: Option<Uuid>,
        tenant_id: Option<Uuid>,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<TieredSlots, SchedulingError> {
        // Tier 1: honor the clinic preference.
        let primary = self
            .finder
            .find_slots_from(
                procedure,
                needs_sedation,
                preferred_clinic_id,
                tenant_id,
                today,
                auth_token,
            )
            .await?;
        let ranked = optimize_slots(primary, preferred_clinic_id, preferred_doctor_id, today);

        if !ranked.is_empty() {
            return Ok(Self::tiered(1, "Primary Results", ranked));
        }

        // Tier 2: drop the clinic preference, stay inside the tenant.
        let fallback = self
            .finder
            .find_slots_from(procedure, needs_sedation, None, tenant_id, today, auth_token)
            .await?;
        let ranked_fb = optimize_slots(fallback, None, None, today);

        if !ranked_fb.is_empty() {
            return Ok(Self::tiered(2, "Alternative Providers Available", ranked_fb));
        }

        // Tier 3: palliative General Dentist visit for pain management.
        if let Some(gd_proc) = self.palliative_procedure(tenant_id, auth_token).await? {
            let palliative = self
                .finder
                .find_slots_from(&gd_proc, false, None, tenant_id, today, auth_token)
                .await?;
            let ranked_p = optimize_slots(palliative, None, None, today);
            if !ranked_p.is_empty() {
                info!(
                    "Specialist unavailable for '{}', offering palliative tier",
                    procedure.name
                );
                let singles = ranked_p.into_iter().take(SLOTS_PER_TIER).collect::<Vec<_>>();
                let total = singles.len();
                return Ok(TieredSlots {
                    tier: 3,
                    tier_label: "Palliative Care (Specialist Unavailable)".to_string(),
                    combo_slots: Vec::new(),
                    single_slots: singles,
                    total_found: total,
                    note: Some(
                        "No specialist available. Offering General Dentist for pain management."
                            .to_string(),
                    ),
                });
            }
        }

        Ok(TieredSlots::empty())
    }

    fn tiered(tier: u8, label: &str, ranked: Vec<crate::models::SlotOption>) -> TieredSlots {
        let total = ranked.len();
        let (combos, singles): (Vec<_>, Vec<_>) = ranked
            .into_iter()
            .partition(|s| s.slot_type == SlotType::Combo);
        TieredSlots {
            tier,
            tier_label: label.to_string(),
            combo_slots: combos.into_iter().take(SLOTS_PER_TIER).collect(),
            single_slots: singles.into_iter().take(SLOTS_PER_TIER).collect(),
            total_found: total,
            note: None,
        }
    }

    /// A procedure requiring the tenant's "General Dentist" specialization.
    async fn palliative_procedure(
        &self,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Option<Procedure>, SchedulingError> {
        let mut spec_path = format!(
            "/rest/v1/specializations?name=eq.{}",
            urlencoding::encode("General Dentist")
        );
        if let Some(tenant) = tenant_id {
            spec_path.push_str(&format!("&tenant_id=eq.{}", tenant));
        }
        let specs: Vec<Value> = self
            .supabase
            .request(Method::GET, &spec_path, Some(auth_token), None)
            .await?;
        let spec: Option<Specialization> = specs
            .into_iter()
            .next()
            .and_then(|v| serde_json::from_value(v).ok());

        let Some(spec) = spec else {
            debug!("Tenant {:?} has no General Dentist specialization", tenant_id);
            return Ok(None);
        };

        let mut proc_path = format!("/rest/v1/procedures?required_spec_id=eq.{}", spec.spec_id);
        if let Some(tenant) = tenant_id {
            proc_path.push_str(&format!("&tenant_id=eq.{}", tenant));
        }
        let procs: Vec<Value> = self
            .supabase
            .request(Method::GET, &proc_path, Some(auth_token), None)
            .await?;

        Ok(procs
            .into_iter()
            .next()
            .and_then(|v| serde_json::from_value(v).ok()))
    }
}
