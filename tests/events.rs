mod common;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde_json::json;

use crate::common::{
    Action, Flow, setup_server, setup_test_db, signin_action, signin_admin_action, signup_action,
};

/// Admin creates a member event with a one-seat schedule tomorrow.
fn seed_event(flow: Flow) -> Flow {
    flow.step(signin_admin_action())
        .step(
            Action::new("event_create", "POST", "/api/v1/events/")
                .with_body(json!({ "title": "Kickoff", "description": "Monthly kickoff" }))
                .with_expect(StatusCode::CREATED)
                .with_save_as("event"),
        )
        .step(
            Action::new("schedule_create", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/{}/schedules", ctx.str_at("event", "/id")))
                .with_dyn_body(|_| {
                    let starts_at = Utc::now() + Duration::days(1);
                    json!({
                        "starts_at": starts_at.to_rfc3339(),
                        "ends_at": (starts_at + Duration::hours(2)).to_rfc3339(),
                        "location": "Main hall",
                        "capacity": 1,
                    })
                })
                .with_expect(StatusCode::CREATED)
                .with_save_as("schedule"),
        )
}

#[tokio::test]
async fn route_schedule_validation_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seed_event(Flow::new())
        .step(
            Action::new("schedule_invalid", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/{}/schedules", ctx.str_at("event", "/id")))
                .with_dyn_body(|_| {
                    let starts_at = Utc::now() + Duration::days(1);
                    json!({
                        "starts_at": starts_at.to_rfc3339(),
                        "ends_at": starts_at.to_rfc3339(),
                        "location": "",
                        "capacity": 0,
                    })
                })
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_json(|body| assert_eq!(body["errors"].as_array().map(Vec::len), Some(3))),
        )
        .step(signup_action("member@example.com", "membermember").with_clear_cookies(true))
        .step(
            Action::new("event_create_member", "POST", "/api/v1/events/")
                .with_body(json!({ "title": "Mine", "description": "" }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_register_capacity_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seed_event(Flow::new())
        .step(signup_action("first@example.com", "firstfirst").with_clear_cookies(true))
        .step(
            Action::new("register", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .assert_json(|body| assert_eq!(body["status"], "registered")),
        )
        .step(
            Action::new("register_twice", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .with_expect(StatusCode::CONFLICT),
        )
        .step(
            Action::new("event_get", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/{}", ctx.str_at("event", "/id")))
                .assert_json(|body| assert_eq!(body["schedules"][0]["registered"], 1)),
        )
        .step(signup_action("second@example.com", "secondsecond").with_clear_cookies(true))
        .step(
            Action::new("register_full", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .with_expect(StatusCode::CONFLICT)
                .assert_body(|body| assert!(body.contains("full"))),
        )
        .step(
            Action::new("cancel_not_registered", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .with_expect(StatusCode::NOT_FOUND),
        )
        // first member frees the seat
        .step(signin_action("first@example.com", "firstfirst").with_clear_cookies(true))
        .step(
            Action::new("cancel", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .assert_json(|body| assert_eq!(body["status"], "cancelled")),
        )
        .step(signin_action("second@example.com", "secondsecond").with_clear_cookies(true))
        .step(
            Action::new("register_freed", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .with_save_as("registration"),
        )
        .step(
            Action::new("mine", "GET", "/api/v1/registrations/mine")
                .assert_json(|body| assert_eq!(body.as_array().map(Vec::len), Some(1))),
        )
        .step(signin_admin_action().with_clear_cookies(true))
        .step(
            Action::new("roster", "GET", "dynamic")
                .with_dyn_path(|ctx| {
                    format!("/api/v1/events/schedules/{}/registrations", ctx.str_at("schedule", "/id"))
                })
                .assert_json(|body| assert_eq!(body.as_array().map(Vec::len), Some(2))),
        )
        .step(
            Action::new("attendance", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    format!(
                        "/api/v1/registrations/{}/attendance",
                        ctx.str_at("registration", "/registration/id")
                    )
                })
                .with_body(json!({ "video_watched": true, "survey_completed": true }))
                .assert_json(|body| assert_eq!(body["status"], "completed")),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_registration_mail_test() {
    let pool = setup_test_db().await;
    let mut app = setup_server(&pool).await;
    let mailer = app.mailer.clone();

    seed_event(Flow::new())
        .step(signup_action("mail@example.com", "mailmailmail").with_clear_cookies(true))
        .step(
            Action::new("register", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id"))),
        )
        .run(&mut app, pool)
        .await;

    let sent = mailer.sent();
    let confirmation = sent
        .iter()
        .find(|m| m.to == "mail@example.com" && m.subject.contains("Kickoff"))
        .expect("registration mail missing");
    assert!(confirmation.body.contains("Main hall"));
}

#[tokio::test]
async fn route_event_role_gate_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signin_admin_action())
        .step(
            Action::new("event_create", "POST", "/api/v1/events/")
                .with_body(json!({
                    "title": "Manager summit",
                    "description": "",
                    "required_role": "manager",
                }))
                .with_expect(StatusCode::CREATED)
                .with_save_as("event"),
        )
        .step(
            Action::new("schedule_create", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/{}/schedules", ctx.str_at("event", "/id")))
                .with_dyn_body(|_| {
                    let starts_at = Utc::now() + Duration::days(3);
                    json!({
                        "starts_at": starts_at.to_rfc3339(),
                        "ends_at": (starts_at + Duration::hours(1)).to_rfc3339(),
                        "location": "Board room",
                        "capacity": 10,
                    })
                })
                .with_expect(StatusCode::CREATED)
                .with_save_as("schedule"),
        )
        .step(signup_action("member@example.com", "membermember").with_clear_cookies(true))
        .step(
            Action::new("event_list", "GET", "/api/v1/events/")
                .assert_json(|body| assert_eq!(body["total"], 0)),
        )
        .step(
            Action::new("event_get", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/{}", ctx.str_at("event", "/id")))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("register", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_register_again_after_cancel_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seed_event(Flow::new())
        .step(signup_action("return@example.com", "returnreturn").with_clear_cookies(true))
        .step(
            Action::new("register", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .with_save_as("first"),
        )
        .step(
            Action::new("cancel", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .assert_json(|body| assert_eq!(body["status"], "cancelled")),
        )
        .step(
            Action::new("attendance_cancelled", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    format!("/api/v1/registrations/{}/attendance", ctx.str_at("first", "/registration/id"))
                })
                .with_body(json!({ "video_watched": true }))
                .with_expect(StatusCode::CONFLICT),
        )
        .step(
            Action::new("register_again", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .assert_json(|body| {
                    assert_eq!(body["status"], "registered");
                    assert!(body["registration"]["cancelled_at"].is_null());
                })
                .with_save_as("second"),
        )
        // the same row comes back instead of a second seat
        .step(
            Action::new("mine", "GET", "/api/v1/registrations/mine").assert_json(|body| {
                assert_eq!(body.as_array().map(Vec::len), Some(1));
            }),
        )
        .step(
            Action::new("event_get", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/{}", ctx.str_at("event", "/id")))
                .assert_json(|body| assert_eq!(body["schedules"][0]["registered"], 1)),
        )
        .step(signup_action("stranger@example.com", "strangerpass").with_clear_cookies(true))
        .step(
            Action::new("attendance_foreign", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    format!("/api/v1/registrations/{}/attendance", ctx.str_at("second", "/registration/id"))
                })
                .with_body(json!({ "video_watched": true, "survey_completed": true }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_cancel_after_start_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    let ctx = Flow::new()
        .step(signin_admin_action())
        .step(
            Action::new("event_create", "POST", "/api/v1/events/")
                .with_body(json!({ "title": "Running", "description": "" }))
                .with_expect(StatusCode::CREATED)
                .with_save_as("event"),
        )
        .step(
            Action::new("schedule_started", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/{}/schedules", ctx.str_at("event", "/id")))
                .with_dyn_body(|_| {
                    let starts_at = Utc::now() - Duration::days(1);
                    json!({
                        "starts_at": starts_at.to_rfc3339(),
                        "ends_at": (starts_at + Duration::days(2)).to_rfc3339(),
                        "location": "Main hall",
                        "capacity": 5,
                    })
                })
                .with_expect(StatusCode::CREATED)
                .with_save_as("schedule"),
        )
        .step(
            signup_action("late@example.com", "latelatelate")
                .with_clear_cookies(true)
                .with_save_as("late"),
        )
        .step(
            Action::new("register_started", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/events/schedules/{}/register", ctx.str_at("schedule", "/id")))
                .with_expect(StatusCode::CONFLICT),
        )
        .run_on(&mut server, &pool)
        .await;

    // a seat taken before the schedule began
    let schedule_id: uuid::Uuid = ctx.str_at("schedule", "/id").parse().unwrap();
    let user_id: uuid::Uuid = ctx.str_at("late", "/id").parse().unwrap();
    sqlx::query("INSERT INTO event_registrations (id, schedule_id, user_id) VALUES ($1, $2, $3)")
        .bind(uuid::Uuid::new_v4())
        .bind(schedule_id)
        .bind(user_id)
        .execute(pool.pool())
        .await
        .unwrap();

    Flow::new()
        .step(signin_action("late@example.com", "latelatelate").with_clear_cookies(true))
        .step(
            Action::new("cancel_started", "DELETE", &format!("/api/v1/events/schedules/{schedule_id}/register"))
                .with_expect(StatusCode::CONFLICT)
                .assert_body(|body| assert!(body.contains("started"))),
        )
        .step(
            Action::new("mine", "GET", "/api/v1/registrations/mine").assert_json(|body| {
                assert_eq!(body.as_array().map(Vec::len), Some(1));
                assert!(body[0]["cancelled_at"].is_null());
            }),
        )
        .run(&mut server, pool)
        .await;
}
