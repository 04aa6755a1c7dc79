//! Slot ranking: same-day combos first, then preference matches, then the
//! soonest date and earliest hour. Deterministic tie-breaks, top-10 cap.

use std::collections::HashSet;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{SlotOption, SlotType};

const MAX_RANKED_SLOTS: usize = 10;

pub fn optimize_slots(
    mut slots: Vec<SlotOption>,
    preferred_clinic_id: Option<Uuid>,
    preferred_doctor_id: Option<Uuid>,
    today: NaiveDate,
) -> Vec<SlotOption> {
    for slot in &mut slots {
        let mut score = 0.0_f64;

        if slot.slot_type == SlotType::Combo {
            score += 100.0;
        }

        if preferred_clinic_id == Some(slot.clinic_id) {
            score += 30.0;
        }

        if preferred_doctor_id == Some(slot.doctor_id) {
            score += 20.0;
        }

        // Sooner is better, up to 20 points.
        let days_away = (slot.date - today).num_days();
        score += (20 - days_away).max(0) as f64;

        // Earlier in the day is better.
        if let Some(hour) = slot
            .time
            .split(':')
            .next()
            .and_then(|h| h.parse::<i64>().ok())
        {
            score += ((17 - hour).max(0) as f64) * 0.5;
        }

        // Single-visit bonus (COMBO already carries its own).
        if slot.slot_type == SlotType::Single {
            score += 10.0;
        }

        slot.score = score;
    }

    slots.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.time.cmp(&b.time))
    });

    // Deduplicate on (date, time, doctor, type), keep the 10 best.
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for slot in slots {
        let key = (slot.date, slot.time.clone(), slot.doctor_id, slot.slot_type);
        if seen.insert(key) {
            unique.push(slot);
            if unique.len() >= MAX_RANKED_SLOTS {
                break;
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(slot_type: SlotType, date: NaiveDate, time: &str, doctor: Uuid) -> SlotOption {
        SlotOption {
            slot_type,
            date,
            time: time.to_string(),
            end_time: "17:00".to_string(),
            time_block: 0,
            duration_minutes: 30,
            doctor_id: doctor,
            doctor_name: "Dr. Rao".to_string(),
            room_id: Uuid::new_v4(),
            room_name: "Operatory 1".to_string(),
            clinic_id: Uuid::new_v4(),
            staff_id: None,
            staff_name: None,
            procedure: "General Checkup".to_string(),
            consult_end_time: None,
            treatment_start_time: None,
            score: 0.0,
        }
    }

    #[test]
    fn combos_outrank_consults_on_the_same_day() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let date = today + chrono::Duration::days(1);
        let doctor = Uuid::new_v4();

        let ranked = optimize_slots(
            vec![
                slot(SlotType::ConsultOnly, date, "09:00", doctor),
                slot(SlotType::Combo, date, "11:00", doctor),
            ],
            None,
            None,
            today,
        );

        assert_eq!(ranked[0].slot_type, SlotType::Combo);
    }

    #[test]
    fn preference_bonuses_apply() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let date = today + chrono::Duration::days(2);
        let preferred_doctor = Uuid::new_v4();
        let other_doctor = Uuid::new_v4();

        let ranked = optimize_slots(
            vec![
                slot(SlotType::ConsultOnly, date, "09:00", other_doctor),
                slot(SlotType::ConsultOnly, date, "09:00", preferred_doctor),
            ],
            None,
            Some(preferred_doctor),
            today,
        );

        assert_eq!(ranked[0].doctor_id, preferred_doctor);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn sooner_dates_rank_higher() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let doctor = Uuid::new_v4();

        let ranked = optimize_slots(
            vec![
                slot(
                    SlotType::Single,
                    today + chrono::Duration::days(7),
                    "09:00",
                    doctor,
                ),
                slot(
                    SlotType::Single,
                    today + chrono::Duration::days(1),
                    "09:00",
                    doctor,
                ),
            ],
            None,
            None,
            today,
        );

        assert_eq!(ranked[0].date, today + chrono::Duration::days(1));
    }

    #[test]
    fn duplicate_keys_collapse_and_cap_at_ten() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let doctor = Uuid::new_v4();
        let date = today + chrono::Duration::days(1);

        let mut slots = Vec::new();
        // Two identical (date, time, doctor, type) keys in different rooms.
        slots.push(slot(SlotType::Single, date, "09:00", doctor));
        slots.push(slot(SlotType::Single, date, "09:00", doctor));
        for i in 0..15 {
            slots.push(slot(
                SlotType::Single,
                date,
                &format!("{:02}:15", 9 + (i % 8)),
                doctor,
            ));
        }

        let ranked = optimize_slots(slots, None, None, today);
        assert!(ranked.len() <= 10);
        let nine_am = ranked
            .iter()
            .filter(|s| s.time == "09:00" && s.slot_type == SlotType::Single)
            .count();
        assert_eq!(nine_am, 1);
    }
}
