//! Emergency finder: the absolute earliest free 15-minute block with any
//! active General Dentist in an operatory, today through the next three days.
//! Ignores preferences, combo logic, and the weekday rule.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::{DAY_START_HOUR, EMERGENCY_LOOKAHEAD_DAYS, SLOTS_PER_DAY, SLOT_MINUTES};
use shared_database::SupabaseClient;
use shared_models::domain::{
    AvailabilityTemplate, Doctor, EntityType, ResourceType, Room, Specialization,
};

use crate::models::{SchedulingError, SlotOption, SlotType};
use crate::services::availability::{load_booked_slots, load_templates, BookedIndex};
use crate::services::grid::{block_to_time, template_blocks};

pub struct EmergencyFinder {
    supabase: Arc<SupabaseClient>,
}

impl EmergencyFinder {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn find_earliest(
        &self,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Option<SlotOption>, SchedulingError> {
        self.find_earliest_at(tenant_id, Utc::now(), auth_token).await
    }

    /// Scan from `now`: today's past blocks are skipped, later days start at
    /// the template opening. Returns the first free (doctor, room) pairing.
    pub async fn find_earliest_at(
        &self,
        tenant_id: Option<Uuid>,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Option<SlotOption>, SchedulingError> {
        let Some(spec) = self.general_dentist_spec(tenant_id, auth_token).await? else {
            return Ok(None);
        };

        let doctors = self
            .general_dentists(spec.spec_id, tenant_id, auth_token)
            .await?;
        if doctors.is_empty() {
            return Ok(None);
        }

        let doctor_ids: Vec<Uuid> = doctors.iter().map(|d| d.doctor_id).collect();
        let templates =
            load_templates(&self.supabase, auth_token, ResourceType::Doctor, &doctor_ids).await?;
        let rooms = self.operatories(tenant_id, auth_token).await?;
        if rooms.is_empty() {
            return Ok(None);
        }

        let today = now.date_naive();
        let to = today + Duration::days(EMERGENCY_LOOKAHEAD_DAYS - 1);
        let room_ids: Vec<Uuid> = rooms.iter().map(|r| r.room_id).collect();
        let mut booked = BookedIndex::from_slots(
            load_booked_slots(&self.supabase, auth_token, EntityType::Doctor, &doctor_ids, today, to)
                .await?,
        );
        booked.extend(
            load_booked_slots(&self.supabase, auth_token, EntityType::Room, &room_ids, today, to)
                .await?,
        );

        for day_offset in 0..EMERGENCY_LOOKAHEAD_DAYS {
            let check_date = today + Duration::days(day_offset);
            let dow = check_date.weekday().num_days_from_monday() as u8;

            for doc in &doctors {
                let day_templates: Vec<&AvailabilityTemplate> = templates
                    .iter()
                    .filter(|t| t.resource_id == doc.doctor_id && t.day_of_week == dow)
                    .collect();

                for tmpl in day_templates {
                    let Some(room) = rooms.iter().find(|r| r.clinic_id == tmpl.clinic_id) else {
                        // No operatory at this clinic; keep scanning.
                        continue;
                    };

                    let (mut start_block, end_block) =
                        template_blocks(tmpl.start_time, tmpl.end_time);

                    if check_date == today {
                        start_block =
                            start_block.max(current_block(now).saturating_add(1).max(0) as usize);
                    }

                    if let Some(block) = self.first_free_block(
                        &booked,
                        doc.doctor_id,
                        room.room_id,
                        check_date,
                        start_block,
                        end_block,
                    ) {
                        debug!(
                            "Emergency slot: {} block {} with {}",
                            check_date, block, doc.name
                        );
                        return Ok(Some(SlotOption {
                            slot_type: SlotType::Emergency,
                            date: check_date,
                            time: block_to_time(block),
                            end_time: block_to_time(block + 1),
                            time_block: block as i32,
                            duration_minutes: SLOT_MINUTES,
                            doctor_id: doc.doctor_id,
                            doctor_name: doc.name.clone(),
                            room_id: room.room_id,
                            room_name: room.name.clone(),
                            clinic_id: tmpl.clinic_id,
                            staff_id: None,
                            staff_name: None,
                            procedure: "Emergency Triage".to_string(),
                            consult_end_time: None,
                            treatment_start_time: None,
                            score: 1000.0,
                        }));
                    }
                }
            }
        }

        Ok(None)
    }

    fn first_free_block(
        &self,
        booked: &BookedIndex,
        doctor_id: Uuid,
        room_id: Uuid,
        date: NaiveDate,
        start_block: usize,
        end_block: usize,
    ) -> Option<usize> {
        let doc_booked = booked.booked_blocks(EntityType::Doctor, doctor_id, date);
        let room_booked = booked.booked_blocks(EntityType::Room, room_id, date);

        (start_block..end_block.min(SLOTS_PER_DAY)).find(|&block| {
            !doc_booked.contains(&(block as i32)) && !room_booked.contains(&(block as i32))
        })
    }

    async fn general_dentist_spec(
        &self,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Option<Specialization>, SchedulingError> {
        let mut path = format!(
            "/rest/v1/specializations?name=eq.{}",
            urlencoding::encode("General Dentist")
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
            .next()
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    async fn general_dentists(
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

    async fn operatories(
        &self,
        tenant_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Room>, SchedulingError> {
        let mut path = "/rest/v1/rooms?status=eq.active&type=eq.operatory".to_string();
        if let Some(tenant) = tenant_id {
            path.push_str(&format!("&clinic_id=eq.{}", tenant));
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
}

/// Grid index of the block containing `now`; negative before opening.
fn current_block(now: DateTime<Utc>) -> i64 {
    (now.hour() as i64 - DAY_START_HOUR as i64) * (60 / SLOT_MINUTES as i64)
        + now.minute() as i64 / SLOT_MINUTES as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn current_block_tracks_the_grid() {
        let at = |h, m| Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap();
        assert_eq!(current_block(at(9, 0)), 0);
        assert_eq!(current_block(at(9, 14)), 0);
        assert_eq!(current_block(at(9, 15)), 1);
        assert_eq!(current_block(at(13, 10)), 16);
        assert!(current_block(at(8, 0)) < 0);
    }
}
