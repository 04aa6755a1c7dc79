// Emergency finder: earliest block semantics, past-block skipping, and the
// weekend exemption.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::models::SlotType;
use scheduling_cell::services::emergency::EmergencyFinder;
use shared_database::SupabaseClient;
use shared_utils::test_utils::TestConfig;

const TENANT: &str = "b7d174e2-4dd6-4a35-b9f3-53a38f4cb7f7";
const GD_DOCTOR: &str = "44444444-4444-4444-8444-444444444444";
const OPERATORY: &str = "55555555-5555-4555-8555-555555555555";

async fn mount_emergency_catalog(
    server: &MockServer,
    templates: serde_json::Value,
    booked: serde_json::Value,
) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/specializations"))
        .and(query_param("name", "eq.General Dentist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "spec_id": 9,
            "tenant_id": TENANT,
            "name": "General Dentist",
        }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_specializations"))
        .and(query_param("spec_id", "eq.9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"doctor_id": GD_DOCTOR}])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "doctor_id": GD_DOCTOR,
            "tenant_id": TENANT,
            "name": "Dr. Kavya Nair",
            "active": true,
        }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/rooms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "room_id": OPERATORY,
            "clinic_id": TENANT,
            "name": "Operatory 1",
            "type": "operatory",
            "capabilities": {},
            "equipment": [],
            "status": "active",
        }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(templates))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/calendar_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(booked))
        .mount(server)
        .await;
}

fn weekday_templates() -> serde_json::Value {
    let rows: Vec<serde_json::Value> = (0..5)
        .map(|dow| {
            json!({
                "resource_id": GD_DOCTOR,
                "resource_type": "DOCTOR",
                "clinic_id": TENANT,
                "day_of_week": dow,
                "start_time": "09:00:00",
                "end_time": "17:00:00",
            })
        })
        .collect();
    json!(rows)
}

#[tokio::test]
async fn skips_past_blocks_when_searching_today() {
    let server = MockServer::start().await;
    mount_emergency_catalog(&server, weekday_templates(), json!([])).await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let finder = EmergencyFinder::new(Arc::new(SupabaseClient::new(&config)));

    // Monday 10:05 sits inside block 4; the offer must start at block 5.
    let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 5, 0).unwrap();
    let slot = finder
        .find_earliest_at(Some(Uuid::parse_str(TENANT).unwrap()), now, "token")
        .await
        .unwrap()
        .expect("an open day must yield a slot");

    assert_eq!(slot.slot_type, SlotType::Emergency);
    assert_eq!(slot.date, now.date_naive());
    assert_eq!(slot.time_block, 5);
    assert_eq!(slot.time, "10:15");
    assert_eq!(slot.duration_minutes, 15);
    assert_eq!(slot.procedure, "Emergency Triage");
    assert_eq!(slot.score, 1000.0);
}

#[tokio::test]
async fn booked_blocks_push_the_offer_later() {
    let server = MockServer::start().await;
    let booked: Vec<serde_json::Value> = (5..8)
        .map(|block| {
            json!({
                "tenant_id": TENANT,
                "entity_type": "doctor",
                "entity_id": GD_DOCTOR,
                "date": "2026-03-02",
                "time_block": block,
                "booked": true,
            })
        })
        .collect();
    mount_emergency_catalog(&server, weekday_templates(), json!(booked)).await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let finder = EmergencyFinder::new(Arc::new(SupabaseClient::new(&config)));

    let now = Utc.with_ymd_and_hms(2026, 3, 2, 10, 5, 0).unwrap();
    let slot = finder
        .find_earliest_at(Some(Uuid::parse_str(TENANT).unwrap()), now, "token")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(slot.time_block, 8);
    assert_eq!(slot.time, "11:00");
}

#[tokio::test]
async fn weekends_are_reachable_for_emergencies() {
    let server = MockServer::start().await;
    // The doctor also covers Saturday mornings (dow 5).
    let mut rows = weekday_templates().as_array().unwrap().clone();
    rows.push(json!({
        "resource_id": GD_DOCTOR,
        "resource_type": "DOCTOR",
        "clinic_id": TENANT,
        "day_of_week": 5,
        "start_time": "09:00:00",
        "end_time": "12:00:00",
    }));
    mount_emergency_catalog(&server, json!(rows), json!([])).await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let finder = EmergencyFinder::new(Arc::new(SupabaseClient::new(&config)));

    // Friday 16:50: block 31 has passed, so today is exhausted and the next
    // template day is Saturday.
    let now = Utc.with_ymd_and_hms(2026, 3, 6, 16, 50, 0).unwrap();
    let slot = finder
        .find_earliest_at(Some(Uuid::parse_str(TENANT).unwrap()), now, "token")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(slot.date.to_string(), "2026-03-07");
    assert_eq!(slot.time, "09:00");
}

#[tokio::test]
async fn tenant_without_general_dentist_yields_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/specializations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    let finder = EmergencyFinder::new(Arc::new(SupabaseClient::new(&config)));

    let slot = finder
        .find_earliest(Some(Uuid::parse_str(TENANT).unwrap()), "token")
        .await
        .unwrap();
    assert!(slot.is_none());
}
