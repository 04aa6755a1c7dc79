//! Slot engine: intersects doctor, room, and (when sedation is involved)
//! anesthetist availability over the lookahead horizon and emits every
//! COMBO / CONSULT_ONLY / SINGLE option. Ranking happens in the optimizer.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::{BUFFER_SLOTS, SCHEDULE_LOOKAHEAD_DAYS, SLOT_MINUTES};
use shared_database::SupabaseClient;
use shared_models::domain::{
    AvailabilityTemplate, Doctor, EntityType, Procedure, ResourceType, Room, Staff,
};

use crate::models::{SchedulingError, SlotOption, SlotType};
use crate::services::availability::{
    availability_mask, load_booked_slots, load_templates, room_mask, BookedIndex,
};
use crate::services::grid::{block_to_time, blocks_needed};

pub struct SlotFinderService {
    supabase: Arc<SupabaseClient>,
}

impl SlotFinderService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Search the next `SCHEDULE_LOOKAHEAD_DAYS` (weekends excluded) for every
    /// slot satisfying the procedure's constraints. Returns unranked options;
    /// an unstaffable sedation requirement returns an empty list, not an error.
    pub async fn find_slots(
        &self,
        procedure: &Procedure,
        needs_sedation: bool,
        preferred_clinic_id: Option<Uuid>,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<SlotOption>, SchedulingError> {
        self.find_slots_from(
            procedure,
            needs_sedation,
            preferred_clinic_id,
            tenant_id,
            Utc::now().date_naive(),
            auth_token,
        )
        .await
    }

    /// Same as [`find_slots`] with an explicit search origin.
    pub async fn find_slots_from(
        &self,
        procedure: &Procedure,
        needs_sedation: bool,
        preferred_clinic_id: Option<Uuid>,
        tenant_id: Option<Uuid>,
        today: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<SlotOption>, SchedulingError> {
        let treatment_blocks = blocks_needed(procedure.base_duration_minutes);
        let consult_blocks = if procedure.consult_duration_minutes > 0 {
            blocks_needed(procedure.consult_duration_minutes)
        } else {
            0
        };
        let combo_blocks = if consult_blocks > 0 {
            consult_blocks + BUFFER_SLOTS + treatment_blocks
        } else {
            treatment_blocks
        };
        let single_blocks = if consult_blocks > 0 {
            consult_blocks
        } else {
            treatment_blocks
        };

        let doctors = self
            .candidate_doctors(procedure.required_spec_id, tenant_id, auth_token)
            .await?;
        if doctors.is_empty() {
            debug!(
                "No qualified doctors for spec {} in tenant {:?}",
                procedure.required_spec_id, tenant_id
            );
            return Ok(Vec::new());
        }

        let rooms = self.candidate_rooms(procedure, tenant_id, auth_token).await?;
        if rooms.is_empty() {
            return Ok(Vec::new());
        }

        let anesthetist = if needs_sedation || procedure.requires_anesthetist {
            match self.find_anesthetist(tenant_id, auth_token).await? {
                Some(staff) => Some(staff),
                // Sedation without an anesthetist is a deterministic empty result.
                None => return Ok(Vec::new()),
            }
        } else {
            None
        };

        let doctor_ids: Vec<Uuid> = doctors.iter().map(|d| d.doctor_id).collect();
        let doc_templates =
            load_templates(&self.supabase, auth_token, ResourceType::Doctor, &doctor_ids).await?;
        let anesth_templates = match &anesthetist {
            Some(staff) => {
                load_templates(&self.supabase, auth_token, ResourceType::Staff, &[staff.staff_id])
                    .await?
            }
            None => Vec::new(),
        };

        // One booked-slot query per entity type for the whole horizon.
        let from = today + Duration::days(1);
        let to = today + Duration::days(SCHEDULE_LOOKAHEAD_DAYS);
        let room_ids: Vec<Uuid> = rooms.iter().map(|r| r.room_id).collect();

        let mut booked = BookedIndex::from_slots(
            load_booked_slots(&self.supabase, auth_token, EntityType::Doctor, &doctor_ids, from, to)
                .await?,
        );
        booked.extend(
            load_booked_slots(&self.supabase, auth_token, EntityType::Room, &room_ids, from, to)
                .await?,
        );
        if let Some(staff) = &anesthetist {
            booked.extend(
                load_booked_slots(
                    &self.supabase,
                    auth_token,
                    EntityType::Staff,
                    &[staff.staff_id],
                    from,
                    to,
                )
                .await?,
            );
        }

        let mut results = Vec::new();

        for day_offset in 1..=SCHEDULE_LOOKAHEAD_DAYS {
            let target = today + Duration::days(day_offset);
            if target.weekday().num_days_from_monday() >= 5 {
                continue;
            }
            let dow = target.weekday().num_days_from_monday() as u8;

            for doc in &doctors {
                let templates: Vec<&AvailabilityTemplate> = doc_templates
                    .iter()
                    .filter(|t| t.resource_id == doc.doctor_id)
                    .collect();
                if templates.is_empty() {
                    continue;
                }

                // The clinics this doctor works at on this weekday.
                let doc_clinics: BTreeSet<Uuid> = templates
                    .iter()
                    .filter(|t| t.day_of_week == dow)
                    .map(|t| t.clinic_id)
                    .filter(|c| preferred_clinic_id.map_or(true, |p| p == *c))
                    .collect();

                for clinic_id in doc_clinics {
                    let local_rooms: Vec<&Room> =
                        rooms.iter().filter(|r| r.clinic_id == clinic_id).collect();
                    if local_rooms.is_empty() {
                        continue;
                    }

                    let clinic_templates: Vec<AvailabilityTemplate> = templates
                        .iter()
                        .filter(|t| t.clinic_id == clinic_id)
                        .map(|t| (*t).clone())
                        .collect();
                    let doc_mask = availability_mask(
                        &clinic_templates,
                        target,
                        booked.booked_blocks(EntityType::Doctor, doc.doctor_id, target),
                    );

                    // Anesthetist must be at the same clinic on this weekday.
                    let anesth_mask = match &anesthetist {
                        Some(staff) => {
                            let local: Vec<AvailabilityTemplate> = anesth_templates
                                .iter()
                                .filter(|t| t.clinic_id == clinic_id)
                                .cloned()
                                .collect();
                            if local.is_empty() {
                                continue;
                            }
                            Some(availability_mask(
                                &local,
                                target,
                                booked.booked_blocks(EntityType::Staff, staff.staff_id, target),
                            ))
                        }
                        None => None,
                    };

                    for room in &local_rooms {
                        let mut combined = doc_mask.intersect(room_mask(
                            booked.booked_blocks(EntityType::Room, room.room_id, target),
                        ));
                        if let Some(anesth) = anesth_mask {
                            combined = combined.intersect(anesth);
                        }

                        // COMBO first (one-stop consult + buffer + treatment).
                        if procedure.allow_same_day_combo && consult_blocks > 0 {
                            for start in combined.find_contiguous(combo_blocks) {
                                let consult_end = start + consult_blocks;
                                let treat_start = consult_end + BUFFER_SLOTS;
                                results.push(self.slot_option(
                                    SlotType::Combo,
                                    target,
                                    start,
                                    combo_blocks,
                                    doc,
                                    room,
                                    clinic_id,
                                    anesthetist.as_ref(),
                                    procedure,
                                    Some(consult_end),
                                    Some(treat_start),
                                    100.0,
                                ));
                            }
                        }

                        let single_type = if consult_blocks > 0 {
                            SlotType::ConsultOnly
                        } else {
                            SlotType::Single
                        };
                        for start in combined.find_contiguous(single_blocks) {
                            results.push(self.slot_option(
                                single_type,
                                target,
                                start,
                                single_blocks,
                                doc,
                                room,
                                clinic_id,
                                anesthetist.as_ref(),
                                procedure,
                                None,
                                None,
                                50.0,
                            ));
                        }
                    }
                }
            }
        }

        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    fn slot_option(
        &self,
        slot_type: SlotType,
        date: NaiveDate,
        start: usize,
        num_blocks: usize,
        doc: &Doctor,
        room: &Room,
        clinic_id: Uuid,
        anesthetist: Option<&Staff>,
        procedure: &Procedure,
        consult_end: Option<usize>,
        treat_start: Option<usize>,
        score: f64,
    ) -> SlotOption {
        SlotOption {
            slot_type,
            date,
            time: block_to_time(start),
            end_time: block_to_time(start + num_blocks),
            time_block: start as i32,
            duration_minutes: num_blocks as u32 * SLOT_MINUTES,
            doctor_id: doc.doctor_id,
            doctor_name: doc.name.clone(),
            room_id: room.room_id,
            room_name: room.name.clone(),
            clinic_id,
            staff_id: anesthetist.map(|s| s.staff_id),
            staff_name: anesthetist.map(|s| s.name.clone()),
            procedure: procedure.name.clone(),
            consult_end_time: consult_end.map(block_to_time),
            treatment_start_time: treat_start.map(block_to_time),
            score,
        }
    }

    /// Active doctors linked to the required specialization, tenant-scoped.
    async fn candidate_doctors(
        &self,
        spec_id: i32,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Doctor>, SchedulingError> {
        let link_path = format!(
            "/rest/v1/doctor_specializations?spec_id=eq.{}&select=doctor_id",
            spec_id
        );
        let links: Vec<Value> = self
            .supabase
            .request(Method::GET, &link_path, Some(auth_token), None)
            .await?;

        let ids: Vec<String> = links
            .into_iter()
            .filter_map(|v| v["doctor_id"].as_str().map(String::from))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut path = format!(
            "/rest/v1/doctors?doctor_id=in.({})&active=eq.true",
            ids.join(",")
        );
        if let Some(tenant) = tenant_id {
            path.push_str(&format!("&tenant_id=eq.{}", tenant));
        }

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    /// Active rooms satisfying the procedure's capability requirements.
    async fn candidate_rooms(
        &self,
        procedure: &Procedure,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Room>, SchedulingError> {
        let mut path = "/rest/v1/rooms?status=eq.active".to_string();
        if let Some(tenant) = tenant_id {
            path.push_str(&format!("&clinic_id=eq.{}", tenant));
        }

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        let rooms: Vec<Room> = rows
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();

        Ok(match &procedure.required_room_capability {
            Some(required) if !required.is_empty() => rooms
                .into_iter()
                .filter(|r| r.satisfies(required))
                .collect(),
            _ => rooms,
        })
    }

    async fn find_anesthetist(
        &self,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Option<Staff>, SchedulingError> {
        let mut path = "/rest/v1/staff?role=eq.Anesthetist&limit=1".to_string();
        if let Some(tenant) = tenant_id {
            path.push_str(&format!("&tenant_id=eq.{}", tenant));
        }

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|v| serde_json::from_value(v).ok()))
    }
}
