// libs/booking-cell/tests/booking_service_test.rs
//
// BookingService against a mocked Supabase REST API and a pinned clock.

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, query_param};

use availability_cell::models::AppointmentStatus;
use availability_cell::services::FixedClock;
use booking_cell::models::{BookAppointmentRequest, BookingError, CancelAppointmentRequest};
use booking_cell::services::BookingService;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

const TOKEN: &str = "user-token";

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap()
}

fn booking_service(mock_server: &MockServer, now: DateTime<Utc>) -> BookingService {
    let config = TestConfig::with_supabase_url(mock_server.uri()).to_app_config();
    BookingService::with_clock(&config, Arc::new(FixedClock(now)))
}

fn appointment_json(id: Uuid, client_id: &str, start: &str, end: &str, status: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "client_id": client_id,
        "service_id": Uuid::new_v4(),
        "appointment_date": "2025-06-16",
        "start_time": start,
        "end_time": end,
        "status": status,
        "payment_status": "pending",
        "payment_intent_id": null,
        "notes": null,
        "created_at": created_at,
        "updated_at": created_at
    })
}

fn request(service_id: Uuid, start: NaiveTime) -> BookAppointmentRequest {
    BookAppointmentRequest {
        service_id,
        appointment_date: monday(),
        start_time: start,
        notes: Some("Lower back".to_string()),
    }
}

/// Service catalogue, Monday 09:00-17:00, no buffer and no blocks.
async fn setup_availability(mock_server: &MockServer, service_id: Uuid, existing: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::service_row(&service_id.to_string(), "Deep tissue", 60)
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/business_hours"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::business_hours_row(1, "09:00:00", "17:00:00", true)
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::settings_row(0, 0, 60)
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("order", "start_time.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(existing))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(mock_server)
        .await;
}

async fn setup_same_day_read(mock_server: &MockServer, rows: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("order", "created_at.asc,id.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(mock_server)
        .await;
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn test_book_free_window() {
    let mock_server = MockServer::start().await;
    let service_id = Uuid::new_v4();
    let ours = appointment_json(Uuid::new_v4(), "client-1", "10:00:00", "11:00:00", "scheduled", "2025-06-15T08:00:00Z");

    setup_availability(&mock_server, service_id, json!([])).await;
    setup_same_day_read(&mock_server, json!([ours.clone()])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([ours])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let appointment = booking_service(&mock_server, at(15, 8))
        .book_appointment("client-1", request(service_id, time(10, 0)), TOKEN)
        .await
        .unwrap();

    assert_eq!(appointment.start_time, time(10, 0));
    assert_eq!(appointment.end_time, time(11, 0));
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn test_booking_taken_window_is_rejected_before_insert() {
    let mock_server = MockServer::start().await;
    let service_id = Uuid::new_v4();
    let existing = json!([
        MockSupabaseResponses::appointment_row("client-2", "2025-06-16", "10:30:00", "11:30:00", "confirmed")
    ]);

    setup_availability(&mock_server, service_id, existing).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = booking_service(&mock_server, at(15, 8))
        .book_appointment("client-1", request(service_id, time(10, 0)), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::SlotNotAvailable(_)));
}

#[tokio::test]
async fn test_booking_outside_business_hours_is_rejected() {
    let mock_server = MockServer::start().await;
    let service_id = Uuid::new_v4();
    setup_availability(&mock_server, service_id, json!([])).await;

    let result = booking_service(&mock_server, at(15, 8))
        .book_appointment("client-1", request(service_id, time(16, 30)), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::SlotNotAvailable(_)));
}

#[tokio::test]
async fn test_booking_unknown_service() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = booking_service(&mock_server, at(15, 8))
        .book_appointment("client-1", request(Uuid::new_v4(), time(10, 0)), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::ServiceNotFound));
}

#[tokio::test]
async fn test_losing_concurrent_booking_is_removed() {
    let mock_server = MockServer::start().await;
    let service_id = Uuid::new_v4();
    let ours_id = Uuid::new_v4();
    let ours = appointment_json(ours_id, "client-1", "10:00:00", "11:00:00", "scheduled", "2025-06-15T08:00:01Z");
    let theirs = appointment_json(Uuid::new_v4(), "client-2", "10:00:00", "11:00:00", "scheduled", "2025-06-15T08:00:00Z");

    setup_availability(&mock_server, service_id, json!([])).await;
    setup_same_day_read(&mock_server, json!([theirs, ours.clone()])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([ours])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", ours_id)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = booking_service(&mock_server, at(15, 8))
        .book_appointment("client-1", request(service_id, time(10, 0)), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::SlotNotAvailable(_)));
}

#[tokio::test]
async fn test_losing_booking_delete_is_retried() {
    let mock_server = MockServer::start().await;
    let service_id = Uuid::new_v4();
    let ours_id = Uuid::new_v4();
    let ours = appointment_json(ours_id, "client-1", "10:00:00", "11:00:00", "scheduled", "2025-06-15T08:00:01Z");
    let theirs = appointment_json(Uuid::new_v4(), "client-2", "10:00:00", "11:00:00", "scheduled", "2025-06-15T08:00:00Z");

    setup_availability(&mock_server, service_id, json!([])).await;
    setup_same_day_read(&mock_server, json!([theirs, ours.clone()])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([ours])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", ours_id)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", ours_id)))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = booking_service(&mock_server, at(15, 8))
        .book_appointment("client-1", request(service_id, time(10, 0)), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::SlotNotAvailable(_)));
}

#[tokio::test]
async fn test_losing_booking_that_cannot_be_removed_fails() {
    let mock_server = MockServer::start().await;
    let service_id = Uuid::new_v4();
    let ours_id = Uuid::new_v4();
    let ours = appointment_json(ours_id, "client-1", "10:00:00", "11:00:00", "scheduled", "2025-06-15T08:00:01Z");
    let theirs = appointment_json(Uuid::new_v4(), "client-2", "10:00:00", "11:00:00", "scheduled", "2025-06-15T08:00:00Z");

    setup_availability(&mock_server, service_id, json!([])).await;
    setup_same_day_read(&mock_server, json!([theirs, ours.clone()])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([ours])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", ours_id)))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("database unavailable", "XX000"),
        ))
        .expect(3)
        .mount(&mock_server)
        .await;

    let result = booking_service(&mock_server, at(15, 8))
        .book_appointment("client-1", request(service_id, time(10, 0)), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::Store(_)));
}

#[tokio::test]
async fn test_winning_concurrent_booking_is_kept() {
    let mock_server = MockServer::start().await;
    let service_id = Uuid::new_v4();
    let ours = appointment_json(Uuid::new_v4(), "client-1", "10:00:00", "11:00:00", "scheduled", "2025-06-15T08:00:00Z");
    let later = appointment_json(Uuid::new_v4(), "client-2", "10:30:00", "11:30:00", "scheduled", "2025-06-15T08:00:05Z");

    setup_availability(&mock_server, service_id, json!([])).await;
    setup_same_day_read(&mock_server, json!([ours.clone(), later])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([ours])))
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = booking_service(&mock_server, at(15, 8))
        .book_appointment("client-1", request(service_id, time(10, 0)), TOKEN)
        .await;

    assert!(result.is_ok());
}

// ==============================================================================
// CANCELLATION
// ==============================================================================

async fn setup_cancellation(mock_server: &MockServer, appointment_id: Uuid, client_id: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_json(appointment_id, client_id, "10:00:00", "11:00:00", status, "2025-06-01T00:00:00Z")
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::settings_row(0, 0, 60)
        ])))
        .mount(mock_server)
        .await;

    let mut cancelled = appointment_json(appointment_id, client_id, "10:00:00", "11:00:00", "cancelled", "2025-06-01T00:00:00Z");
    cancelled["cancellation_reason"] = json!("Feeling unwell");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .mount(mock_server)
        .await;
}

fn reason() -> CancelAppointmentRequest {
    CancelAppointmentRequest {
        reason: Some("Feeling unwell".to_string()),
    }
}

#[tokio::test]
async fn test_client_cancels_before_cutoff() {
    let mock_server = MockServer::start().await;
    let client = TestUser::client("client@example.com");
    let appointment_id = Uuid::new_v4();
    setup_cancellation(&mock_server, appointment_id, &client.id, "scheduled").await;

    // 26 hours ahead of a 24 hour cutoff
    let cancelled = booking_service(&mock_server, at(15, 8))
        .cancel_appointment(&client.to_user(), appointment_id, reason(), TOKEN)
        .await
        .unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Feeling unwell"));
}

#[tokio::test]
async fn test_client_cannot_cancel_inside_cutoff() {
    let mock_server = MockServer::start().await;
    let client = TestUser::client("client@example.com");
    let appointment_id = Uuid::new_v4();
    setup_cancellation(&mock_server, appointment_id, &client.id, "confirmed").await;

    let result = booking_service(&mock_server, at(15, 12))
        .cancel_appointment(&client.to_user(), appointment_id, reason(), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::CancellationWindowClosed(24)));
}

#[tokio::test]
async fn test_admin_cancels_inside_cutoff() {
    let mock_server = MockServer::start().await;
    let admin = TestUser::admin("owner@example.com");
    let appointment_id = Uuid::new_v4();
    setup_cancellation(&mock_server, appointment_id, "client-1", "confirmed").await;

    let result = booking_service(&mock_server, at(16, 9))
        .cancel_appointment(&admin.to_user(), appointment_id, reason(), TOKEN)
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cancelled_appointment_cannot_be_cancelled_again() {
    let mock_server = MockServer::start().await;
    let client = TestUser::client("client@example.com");
    let appointment_id = Uuid::new_v4();
    setup_cancellation(&mock_server, appointment_id, &client.id, "cancelled").await;

    let result = booking_service(&mock_server, at(15, 8))
        .cancel_appointment(&client.to_user(), appointment_id, reason(), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::InvalidStatusTransition(AppointmentStatus::Cancelled)));
}

#[tokio::test]
async fn test_other_client_cannot_cancel() {
    let mock_server = MockServer::start().await;
    let stranger = TestUser::client("stranger@example.com");
    let appointment_id = Uuid::new_v4();
    setup_cancellation(&mock_server, appointment_id, "client-1", "scheduled").await;

    let result = booking_service(&mock_server, at(15, 8))
        .cancel_appointment(&stranger.to_user(), appointment_id, reason(), TOKEN)
        .await;

    assert_matches!(result, Err(BookingError::Unauthorized));
}
