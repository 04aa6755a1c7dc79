//! Availability mask assembly: weekly templates give the ceiling, booked
//! CalendarSlot rows subtract from it. Booked rows for a whole search window
//! are prefetched in one query per entity type and indexed in memory.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use reqwest::Method;
use serde_json::Value;
use uuid::Uuid;

use shared_database::SupabaseClient;
use shared_models::domain::{AvailabilityTemplate, CalendarSlot, EntityType, ResourceType};

use crate::models::SchedulingError;
use crate::services::grid::{template_blocks, DayMask};

/// Booked blocks keyed by (entity, day), built from a prefetched slot list.
#[derive(Debug, Default)]
pub struct BookedIndex {
    map: HashMap<(EntityType, Uuid, NaiveDate), Vec<i32>>,
}

impl BookedIndex {
    pub fn from_slots(slots: Vec<CalendarSlot>) -> Self {
        let mut map: HashMap<(EntityType, Uuid, NaiveDate), Vec<i32>> = HashMap::new();
        for slot in slots.into_iter().filter(|s| s.booked) {
            map.entry((slot.entity_type, slot.entity_id, slot.date))
                .or_default()
                .push(slot.time_block);
        }
        Self { map }
    }

    pub fn extend(&mut self, slots: Vec<CalendarSlot>) {
        for slot in slots.into_iter().filter(|s| s.booked) {
            self.map
                .entry((slot.entity_type, slot.entity_id, slot.date))
                .or_default()
                .push(slot.time_block);
        }
    }

    pub fn booked_blocks(&self, entity_type: EntityType, entity_id: Uuid, date: NaiveDate) -> &[i32] {
        self.map
            .get(&(entity_type, entity_id, date))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Build the day mask for one resource: template windows on, booked blocks off.
/// Weekend suppression is the scheduler's job, not the mask's.
pub fn availability_mask(
    templates: &[AvailabilityTemplate],
    date: NaiveDate,
    booked: &[i32],
) -> DayMask {
    let dow = date.weekday().num_days_from_monday() as u8;

    let mut mask = DayMask::EMPTY;
    for tmpl in templates.iter().filter(|t| t.day_of_week == dow) {
        let (start, end) = template_blocks(tmpl.start_time, tmpl.end_time);
        mask.set_range(start, end);
    }

    for &block in booked {
        if block >= 0 {
            mask.clear(block as usize);
        }
    }

    mask
}

/// Rooms have no weekly template: free all day minus bookings.
pub fn room_mask(booked: &[i32]) -> DayMask {
    let mut mask = DayMask::full();
    for &block in booked {
        if block >= 0 {
            mask.clear(block as usize);
        }
    }
    mask
}

/// Fetch every booked slot for the given entities over `[from, to]`.
pub async fn load_booked_slots(
    supabase: &SupabaseClient,
    auth_token: &str,
    entity_type: EntityType,
    entity_ids: &[Uuid],
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<CalendarSlot>, SchedulingError> {
    if entity_ids.is_empty() {
        return Ok(Vec::new());
    }

    let ids = entity_ids
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let path = format!(
        "/rest/v1/calendar_slots?entity_type=eq.{}&entity_id=in.({})&date=gte.{}&date=lte.{}&booked=eq.true",
        entity_type, ids, from, to
    );

    let rows: Vec<Value> = supabase
        .request(Method::GET, &path, Some(auth_token), None)
        .await?;

    let slots = rows
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    Ok(slots)
}

/// Fetch all weekly templates for a set of resources.
pub async fn load_templates(
    supabase: &SupabaseClient,
    auth_token: &str,
    resource_type: ResourceType,
    resource_ids: &[Uuid],
) -> Result<Vec<AvailabilityTemplate>, SchedulingError> {
    if resource_ids.is_empty() {
        return Ok(Vec::new());
    }

    let type_str = match resource_type {
        ResourceType::Doctor => "DOCTOR",
        ResourceType::Staff => "STAFF",
    };
    let ids = resource_ids
        .iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let path = format!(
        "/rest/v1/availability_templates?resource_type=eq.{}&resource_id=in.({})",
        type_str, ids
    );

    let rows: Vec<Value> = supabase
        .request(Method::GET, &path, Some(auth_token), None)
        .await?;

    let templates = rows
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use shared_config::SLOTS_PER_DAY;

    fn template(dow: u8, start: (u32, u32), end: (u32, u32)) -> AvailabilityTemplate {
        AvailabilityTemplate {
            resource_id: Uuid::new_v4(),
            resource_type: ResourceType::Doctor,
            clinic_id: Uuid::new_v4(),
            day_of_week: dow,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
        }
    }

    #[test]
    fn full_day_template_yields_all_blocks_before_bookings() {
        // 2026-03-02 is a Monday (dow 0).
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mask = availability_mask(&[template(0, (9, 0), (17, 0))], date, &[]);
        assert_eq!(mask.count_free() as usize, SLOTS_PER_DAY);
    }

    #[test]
    fn bookings_subtract_from_template() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mask = availability_mask(&[template(0, (9, 0), (17, 0))], date, &[0, 1, 31]);
        assert_eq!(mask.count_free() as usize, SLOTS_PER_DAY - 3);
        assert!(!mask.is_free(0));
        assert!(!mask.is_free(31));
        assert!(mask.is_free(2));
    }

    #[test]
    fn templates_for_other_weekdays_are_ignored() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(); // Monday
        let mask = availability_mask(&[template(2, (9, 0), (17, 0))], date, &[]);
        assert_eq!(mask, DayMask::EMPTY);
    }

    #[test]
    fn split_shift_templates_union() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mask = availability_mask(
            &[template(0, (9, 0), (12, 0)), template(0, (14, 0), (17, 0))],
            date,
            &[],
        );
        assert!(mask.is_free(0));
        assert!(mask.is_free(11)); // 11:45
        assert!(!mask.is_free(12)); // 12:00 gap
        assert!(!mask.is_free(19)); // 13:45 gap
        assert!(mask.is_free(20)); // 14:00
    }

    #[test]
    fn booked_index_groups_by_entity_and_day() {
        let doctor = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let index = BookedIndex::from_slots(vec![
            CalendarSlot {
                tenant_id: None,
                entity_type: EntityType::Doctor,
                entity_id: doctor,
                date,
                time_block: 4,
                booked: true,
                appt_id: None,
            },
            CalendarSlot {
                tenant_id: None,
                entity_type: EntityType::Doctor,
                entity_id: doctor,
                date,
                time_block: 5,
                booked: false,
                appt_id: None,
            },
        ]);

        assert_eq!(index.booked_blocks(EntityType::Doctor, doctor, date), &[4]);
        assert!(index
            .booked_blocks(EntityType::Room, doctor, date)
            .is_empty());
    }
}
