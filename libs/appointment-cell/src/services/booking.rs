//! Two-phase slot lock. Phase one re-validates that no covered block is
//! booked for the doctor, the room, or the anesthetist; phase two creates the
//! appointment and claims every block with one atomic bulk insert. The insert
//! requests no conflict resolution, so the unique index on (entity_type,
//! entity_id, date, time_block) is the arbiter under concurrency: the loser's
//! 409 rolls the appointment back and surfaces as `SlotUnavailable`.
//! Cancellation deletes the claimed rows, keeping the key space clean for a
//! later re-booking of the same blocks.

use std::sync::Arc;

use chrono::{NaiveTime, TimeZone, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use scheduling_cell::services::grid::blocks_needed;
use shared_database::{SupabaseClient, SupabaseError};
use shared_models::domain::{Appointment, EntityType};

use crate::models::{BookSlotRequest, BookingConfirmation, BookingError};

pub struct SlotBookingService {
    supabase: Arc<SupabaseClient>,
}

impl SlotBookingService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn book(
        &self,
        request: BookSlotRequest,
        auth_token: &str,
    ) -> Result<BookingConfirmation, BookingError> {
        let slot = &request.slot;
        let num_blocks = blocks_needed(slot.duration_minutes) as i32;
        let start_block = slot.time_block;

        let mut entities = vec![
            (EntityType::Doctor, slot.doctor_id),
            (EntityType::Room, slot.room_id),
        ];
        if let Some(staff_id) = slot.staff_id {
            entities.push((EntityType::Staff, staff_id));
        }

        // Phase one: every covered block must still be free for every entity.
        for (entity_type, entity_id) in &entities {
            if let Some(block) = self
                .first_conflict(*entity_type, *entity_id, slot, start_block, num_blocks, auth_token)
                .await?
            {
                return Err(BookingError::SlotUnavailable {
                    entity_type: entity_type.to_string(),
                    date: slot.date.to_string(),
                    block,
                });
            }
        }

        let start_time = parse_wall_clock(&slot.time)
            .ok_or_else(|| BookingError::InvalidSlot(format!("bad start time '{}'", slot.time)))?;
        let end_time = parse_wall_clock(&slot.end_time).ok_or_else(|| {
            BookingError::InvalidSlot(format!("bad end time '{}'", slot.end_time))
        })?;

        let start_dt = Utc.from_utc_datetime(&slot.date.and_time(start_time));
        let end_dt = Utc.from_utc_datetime(&slot.date.and_time(end_time));
        if end_dt <= start_dt {
            return Err(BookingError::InvalidSlot(
                "appointment must end after it starts".to_string(),
            ));
        }

        let clinic_id = request.tenant_id.unwrap_or(slot.clinic_id);

        // Phase two: appointment row first, then the slot claim.
        let created: Vec<Appointment> = self
            .supabase
            .insert_returning(
                "/rest/v1/appointments",
                Some(auth_token),
                json!({
                    "patient_id": request.patient_id,
                    "doctor_id": slot.doctor_id,
                    "room_id": slot.room_id,
                    "staff_id": slot.staff_id,
                    "clinic_id": clinic_id,
                    "proc_id": request.proc_id,
                    "procedure_type": slot.procedure,
                    "start_time": start_dt.to_rfc3339(),
                    "end_time": end_dt.to_rfc3339(),
                    "status": "SCHEDULED",
                }),
            )
            .await?;
        let appointment = created
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::Database("appointment insert returned no row".into()))?;

        let mut rows = Vec::new();
        for (entity_type, entity_id) in &entities {
            for block in start_block..start_block + num_blocks {
                rows.push(json!({
                    "tenant_id": request.tenant_id,
                    "entity_type": entity_type.to_string(),
                    "entity_id": entity_id,
                    "date": slot.date,
                    "time_block": block,
                    "booked": true,
                    "appt_id": appointment.appt_id,
                }));
            }
        }

        match self
            .supabase
            .insert_rows("calendar_slots", Some(auth_token), Value::Array(rows))
            .await
        {
            Ok(()) => {}
            Err(SupabaseError::Conflict(_)) => {
                // Someone won the race between validation and claim; undo the
                // appointment row and report the loss.
                warn!(
                    "Slot claim lost race for appointment {}, rolling back",
                    appointment.appt_id
                );
                self.delete_appointment(appointment.appt_id, auth_token).await;
                return Err(BookingError::SlotUnavailable {
                    entity_type: "calendar".to_string(),
                    date: slot.date.to_string(),
                    block: start_block,
                });
            }
            Err(e) => {
                self.delete_appointment(appointment.appt_id, auth_token).await;
                return Err(e.into());
            }
        }

        info!(
            "Booked appointment {} for patient {} ({} blocks from {})",
            appointment.appt_id, request.patient_id, num_blocks, slot.time
        );

        Ok(BookingConfirmation {
            appt_id: appointment.appt_id,
            start_time: start_dt,
            end_time: end_dt,
            doctor: slot.doctor_name.clone(),
            room: slot.room_name.clone(),
            status: "SCHEDULED".to_string(),
        })
    }

    pub async fn get_appointment(
        &self,
        appt_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let path = format!("/rest/v1/appointments?appt_id=eq.{}", appt_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        rows.into_iter()
            .next()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or(BookingError::NotFound)
    }

    /// Cancel the appointment and release every calendar block it held. The
    /// slot rows are deleted outright: a retained row would make the next
    /// optimistic insert on the same key fail for no reason.
    pub async fn cancel(&self, appt_id: Uuid, auth_token: &str) -> Result<(), BookingError> {
        // Existence check doubles as a 404 for unknown ids.
        let _ = self.get_appointment(appt_id, auth_token).await?;

        let appt_path = format!("/rest/v1/appointments?appt_id=eq.{}", appt_id);
        let _: Value = self
            .supabase
            .request(
                Method::PATCH,
                &appt_path,
                Some(auth_token),
                Some(json!({"status": "CANCELLED"})),
            )
            .await?;

        let slots_path = format!("/rest/v1/calendar_slots?appt_id=eq.{}", appt_id);
        let _: Value = self
            .supabase
            .request(Method::DELETE, &slots_path, Some(auth_token), None)
            .await?;

        info!("Cancelled appointment {} and released its slots", appt_id);
        Ok(())
    }

    async fn first_conflict(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        slot: &scheduling_cell::models::SlotOption,
        start_block: i32,
        num_blocks: i32,
        auth_token: &str,
    ) -> Result<Option<i32>, BookingError> {
        let path = format!(
            "/rest/v1/calendar_slots?entity_type=eq.{}&entity_id=eq.{}&date=eq.{}&time_block=gte.{}&time_block=lt.{}&booked=eq.true&limit=1",
            entity_type,
            entity_id,
            slot.date,
            start_block,
            start_block + num_blocks
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(rows
            .first()
            .and_then(|v| v["time_block"].as_i64())
            .map(|b| b as i32))
    }

    async fn delete_appointment(&self, appt_id: Uuid, auth_token: &str) {
        let path = format!("/rest/v1/appointments?appt_id=eq.{}", appt_id);
        if let Err(e) = self
            .supabase
            .request::<Value>(Method::DELETE, &path, Some(auth_token), None)
            .await
        {
            warn!("Failed to roll back appointment {}: {}", appt_id, e);
        }
    }
}

fn parse_wall_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_accepts_both_precision_forms() {
        assert_eq!(
            parse_wall_clock("09:15"),
            NaiveTime::from_hms_opt(9, 15, 0)
        );
        assert_eq!(
            parse_wall_clock("14:30:00"),
            NaiveTime::from_hms_opt(14, 30, 0)
        );
        assert_eq!(parse_wall_clock("25:00"), None);
    }
}
