// Two-phase booking against a mocked PostgREST backend: the happy path, the
// pre-validation conflict, the lost race on the unique index, and release on
// cancellation.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{BookSlotRequest, BookingError};
use appointment_cell::services::booking::SlotBookingService;
use scheduling_cell::models::{SlotOption, SlotType};
use shared_database::SupabaseClient;
use shared_utils::test_utils::TestConfig;

const TENANT: &str = "b7d174e2-4dd6-4a35-b9f3-53a38f4cb7f7";
const DOCTOR: &str = "11111111-1111-4111-8111-111111111111";
const ROOM: &str = "22222222-2222-4222-8222-222222222222";
const PATIENT: &str = "66666666-6666-4666-8666-666666666666";
const APPT: &str = "77777777-7777-4777-8777-777777777777";

fn consult_slot() -> SlotOption {
    SlotOption {
        slot_type: SlotType::ConsultOnly,
        date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        time: "09:00".to_string(),
        end_time: "09:30".to_string(),
        time_block: 0,
        duration_minutes: 30,
        doctor_id: Uuid::parse_str(DOCTOR).unwrap(),
        doctor_name: "Dr. Meera Rao".to_string(),
        room_id: Uuid::parse_str(ROOM).unwrap(),
        room_name: "Endo Suite".to_string(),
        clinic_id: Uuid::parse_str(TENANT).unwrap(),
        staff_id: None,
        staff_name: None,
        procedure: "Root Canal Treatment".to_string(),
        consult_end_time: None,
        treatment_start_time: None,
        score: 50.0,
    }
}

fn request() -> BookSlotRequest {
    BookSlotRequest {
        slot: consult_slot(),
        patient_id: Uuid::parse_str(PATIENT).unwrap(),
        proc_id: Some(1),
        tenant_id: Some(Uuid::parse_str(TENANT).unwrap()),
    }
}

fn appointment_row() -> serde_json::Value {
    json!([{
        "appt_id": APPT,
        "patient_id": PATIENT,
        "doctor_id": DOCTOR,
        "room_id": ROOM,
        "staff_id": null,
        "clinic_id": TENANT,
        "proc_id": 1,
        "procedure_type": "Root Canal Treatment",
        "start_time": "2026-03-02T09:00:00+00:00",
        "end_time": "2026-03-02T09:30:00+00:00",
        "status": "SCHEDULED",
    }])
}

async fn service(server: &MockServer) -> SlotBookingService {
    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    SlotBookingService::new(Arc::new(SupabaseClient::new(&config)))
}

#[tokio::test]
async fn booking_claims_every_block_for_every_entity() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/calendar_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(appointment_row()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/calendar_slots"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let confirmation = service(&server).await.book(request(), "token").await.unwrap();

    assert_eq!(confirmation.appt_id.to_string(), APPT);
    assert_eq!(confirmation.status, "SCHEDULED");
    assert_eq!(confirmation.doctor, "Dr. Meera Rao");

    // 30 minutes = 2 blocks, for doctor + room = 4 slot rows in one insert.
    let requests = server.received_requests().await.unwrap();
    let claim = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path() == "/rest/v1/calendar_slots")
        .expect("slot claim must happen");
    let rows: serde_json::Value = serde_json::from_slice(&claim.body).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r["booked"] == json!(true)));
    assert!(rows.iter().all(|r| r["appt_id"] == json!(APPT)));
    let doctor_blocks: Vec<i64> = rows
        .iter()
        .filter(|r| r["entity_type"] == json!("doctor"))
        .map(|r| r["time_block"].as_i64().unwrap())
        .collect();
    assert_eq!(doctor_blocks, vec![0, 1]);
}

#[tokio::test]
async fn validation_conflict_fails_before_any_write() {
    let server = MockServer::start().await;

    // The doctor's block 1 is already booked.
    Mock::given(method("GET"))
        .and(path("/rest/v1/calendar_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "tenant_id": TENANT,
            "entity_type": "doctor",
            "entity_id": DOCTOR,
            "date": "2026-03-02",
            "time_block": 1,
            "booked": true,
        }])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(appointment_row()))
        .expect(0)
        .mount(&server)
        .await;

    let err = service(&server).await.book(request(), "token").await.unwrap_err();
    assert!(matches!(err, BookingError::SlotUnavailable { block: 1, .. }));
}

#[tokio::test]
async fn lost_race_rolls_the_appointment_back() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/calendar_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(appointment_row()))
        .expect(1)
        .mount(&server)
        .await;

    // The unique index rejects the claim: someone else won.
    Mock::given(method("POST"))
        .and(path("/rest/v1/calendar_slots"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "duplicate key value violates unique constraint"
        })))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let err = service(&server).await.book(request(), "token").await.unwrap_err();
    assert!(matches!(err, BookingError::SlotUnavailable { .. }));
}

#[tokio::test]
async fn cancellation_deletes_the_calendar_rows() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(appointment_row()))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({"status": "CANCELLED"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    // Rows are removed, not flipped, so a later insert on the same
    // (entity, date, block) key cannot trip over them.
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/calendar_slots"))
        .and(query_param("appt_id", format!("eq.{}", APPT)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let appt_id = Uuid::parse_str(APPT).unwrap();
    service(&server).await.cancel(appt_id, "token").await.unwrap();
}

#[tokio::test]
async fn unknown_appointment_cancellation_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = service(&server)
        .await
        .cancel(Uuid::new_v4(), "token")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound));
}
