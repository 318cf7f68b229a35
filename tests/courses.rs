mod common;
use reqwest::StatusCode;
use serde_json::json;

use crate::common::{
    Action, Flow, setup_server, setup_test_db, signin_action, signin_admin_action, signup_action,
    subscribe_action,
};

/// Admin builds a member course with two lessons and an empty manager-tier course.
fn seed_courses(flow: Flow) -> Flow {
    flow.step(signin_admin_action())
        .step(
            Action::new("course_create", "POST", "/api/v1/courses/")
                .with_body(json!({
                    "title": "Foundations",
                    "description": "Start here",
                    "order_index": 1,
                }))
                .with_expect(StatusCode::CREATED)
                .with_save_as("course"),
        )
        .step(
            Action::new("course_create_manager", "POST", "/api/v1/courses/")
                .with_body(json!({
                    "title": "Leading a team",
                    "description": "For managers",
                    "required_role": "manager",
                    "order_index": 2,
                }))
                .with_expect(StatusCode::CREATED)
                .with_save_as("manager_course"),
        )
        .step(
            Action::new("lesson_create", "POST", "/api/v1/lessons/")
                .with_dyn_body(|ctx| {
                    json!({
                        "course_id": ctx.str_at("course", "/id"),
                        "title": "Welcome",
                        "content": "# Welcome",
                        "order_index": 1,
                    })
                })
                .with_expect(StatusCode::CREATED)
                .with_save_as("lesson_one"),
        )
        .step(
            Action::new("lesson_create", "POST", "/api/v1/lessons/")
                .with_dyn_body(|ctx| {
                    json!({
                        "course_id": ctx.str_at("course", "/id"),
                        "title": "Second steps",
                        "content": "more",
                        "order_index": 2,
                    })
                })
                .with_expect(StatusCode::CREATED)
                .with_save_as("lesson_two"),
        )
}

#[tokio::test]
async fn route_course_admin_only_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("student@example.com", "studentpass"))
        .step(
            Action::new("course_create_member", "POST", "/api/v1/courses/")
                .with_body(json!({ "title": "Nope", "description": "" }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signin_admin_action().with_clear_cookies(true))
        .step(
            Action::new("course_create_untitled", "POST", "/api/v1/courses/")
                .with_body(json!({ "title": "  ", "description": "" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("lesson_create_unknown_course", "POST", "/api/v1/lessons/")
                .with_body(json!({
                    "course_id": uuid::Uuid::new_v4(),
                    "title": "Orphan",
                    "content": "",
                }))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_course_visibility_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seed_courses(Flow::new())
        .step(signup_action("viewer@example.com", "viewerpass").with_clear_cookies(true))
        .step(
            Action::new("course_list", "GET", "/api/v1/courses/").assert_json(|body| {
                let courses = body.as_array().expect("list expected");
                assert_eq!(courses.len(), 1);
                assert_eq!(courses[0]["title"], "Foundations");
                assert_eq!(courses[0]["lessons"].as_array().map(Vec::len), Some(2));
            }),
        )
        .step(
            Action::new("course_get_hidden", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/courses/{}", ctx.str_at("manager_course", "/id")))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_lesson_requires_subscription_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seed_courses(Flow::new())
        .step(
            signup_action("learner@example.com", "learnerpass")
                .with_clear_cookies(true)
                .with_save_as("learner"),
        )
        .step(
            Action::new("lesson_unpaid", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}", ctx.str_at("lesson_one", "/id")))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(subscribe_action("learner"))
        .step(
            Action::new("me_subscribed", "GET", "/api/v1/account/me")
                .assert_json(|body| assert_eq!(body["subscription_active"], true)),
        )
        .step(
            Action::new("lesson_get", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}", ctx.str_at("lesson_one", "/id")))
                .assert_json(|body| {
                    assert_eq!(body["title"], "Welcome");
                    assert_eq!(body["status"], false);
                    assert_eq!(body["has_material"], false);
                }),
        )
        .step(
            Action::new("lesson_done", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}/done", ctx.str_at("lesson_one", "/id"))),
        )
        // marking twice is harmless
        .step(
            Action::new("lesson_done_again", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}/done", ctx.str_at("lesson_one", "/id"))),
        )
        .step(
            Action::new("lesson_get_done", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}", ctx.str_at("lesson_one", "/id")))
                .assert_json(|body| assert_eq!(body["status"], true)),
        )
        .step(
            Action::new("progress", "GET", "/api/v1/progress/").assert_json(|body| {
                assert_eq!(body["total_lessons"], 2);
                assert_eq!(body["completed_lessons"], 1);
                assert_eq!(body["display_name"], "learner");
            }),
        )
        .step(
            Action::new("material_missing", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}/material", ctx.str_at("lesson_one", "/id")))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_lesson_next_points_to_uncompleted_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seed_courses(Flow::new())
        .step(
            signup_action("next@example.com", "nextnextnext")
                .with_clear_cookies(true)
                .with_save_as("learner"),
        )
        .step(subscribe_action("learner"))
        .step(
            Action::new("lesson_get", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}", ctx.str_at("lesson_one", "/id")))
                .with_save_as("fetched"),
        )
        .step(
            Action::new("lesson_next", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}", ctx.str_at("fetched", "/next_lesson_id")))
                .assert_json(|body| {
                    assert_eq!(body["title"], "Second steps");
                    assert!(body["next_lesson_id"].is_null());
                }),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_lesson_material_signed_link_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    let name = format!("test-material-{}.txt", uuid::Uuid::new_v4().simple());
    let dir = memberdeck::utils::uploads::get_uploads_dir().unwrap().join("lessons");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(&name), "lesson notes").unwrap();
    let material_path = format!("lessons/{name}");

    let body_path = material_path.clone();
    seed_courses(Flow::new())
        .step(
            Action::new("lesson_with_material", "POST", "/api/v1/lessons/")
                .with_dyn_body(move |ctx| {
                    json!({
                        "course_id": ctx.str_at("course", "/id"),
                        "title": "Handout",
                        "content": "",
                        "material_path": body_path,
                        "order_index": 3,
                    })
                })
                .with_expect(StatusCode::CREATED)
                .with_save_as("handout"),
        )
        .step(
            Action::new("lesson_escaping_material", "POST", "/api/v1/lessons/")
                .with_dyn_body(|ctx| {
                    json!({
                        "course_id": ctx.str_at("course", "/id"),
                        "title": "Bad",
                        "content": "",
                        "material_path": "../secrets.txt",
                    })
                })
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("material_link", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}/material", ctx.str_at("handout", "/id")))
                .with_save_as("link"),
        )
        .step(
            Action::new("file_download", "GET", "dynamic")
                .with_clear_cookies(true)
                .with_dyn_path(|ctx| ctx.str_at("link", "/url")),
        )
        .step(
            Action::new("file_tampered", "GET", "dynamic")
                .with_dyn_path(|ctx| ctx.str_at("link", "/url").replace("signature=", "signature=00"))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .run(&mut server, pool)
        .await;

    let _ = std::fs::remove_file(dir.join(&name));
}

#[tokio::test]
async fn route_material_name_needs_escaping_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    let name = format!("week 1 notes #{}?.txt", uuid::Uuid::new_v4().simple());
    let dir = memberdeck::utils::uploads::get_uploads_dir().unwrap().join("lessons");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(&name), "escaped notes").unwrap();

    let body_path = format!("./lessons/./{name}");
    let stored = format!("lessons/{name}");
    seed_courses(Flow::new())
        .step(
            Action::new("lesson_with_material", "POST", "/api/v1/lessons/")
                .with_dyn_body(move |ctx| {
                    json!({
                        "course_id": ctx.str_at("course", "/id"),
                        "title": "Handout",
                        "content": "",
                        "material_path": body_path,
                        "order_index": 3,
                    })
                })
                .with_expect(StatusCode::CREATED)
                .assert_json(move |body| assert_eq!(body["material_path"], stored))
                .with_save_as("handout"),
        )
        .step(
            Action::new("material_link", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}/material", ctx.str_at("handout", "/id")))
                .assert_json(|body| {
                    let url = body["url"].as_str().expect("url missing");
                    assert!(url.starts_with("/api/v1/files/lessons/week%201%20notes%20%23"), "{url}");
                    assert_eq!(url.matches('?').count(), 1, "{url}");
                })
                .with_save_as("link"),
        )
        .step(
            Action::new("file_download", "GET", "dynamic")
                .with_clear_cookies(true)
                .with_dyn_path(|ctx| ctx.str_at("link", "/url"))
                .assert_body(|body| assert_eq!(body, "escaped notes")),
        )
        .run(&mut server, pool)
        .await;

    let _ = std::fs::remove_file(dir.join(&name));
}

#[tokio::test]
async fn route_progress_ignores_unpublished_course_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seed_courses(Flow::new())
        .step(
            signup_action("drafted@example.com", "draftedpass")
                .with_clear_cookies(true)
                .with_save_as("learner"),
        )
        .step(subscribe_action("learner"))
        .step(
            Action::new("lesson_done", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}/done", ctx.str_at("lesson_one", "/id"))),
        )
        .step(
            Action::new("progress", "GET", "/api/v1/progress/").assert_json(|body| {
                assert_eq!(body["total_lessons"], 2);
                assert_eq!(body["completed_lessons"], 1);
            }),
        )
        .step(signin_admin_action().with_clear_cookies(true))
        .step(
            Action::new("course_unpublish", "PUT", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/courses/{}", ctx.str_at("course", "/id")))
                .with_body(json!({ "title": "Foundations", "description": "Start here", "published": false }))
                .assert_json(|body| assert_eq!(body["published"], false)),
        )
        .step(signin_action("drafted@example.com", "draftedpass").with_clear_cookies(true))
        // completions inside a hidden course drop out with its lessons
        .step(
            Action::new("progress_hidden", "GET", "/api/v1/progress/").assert_json(|body| {
                assert_eq!(body["total_lessons"], 0);
                assert_eq!(body["completed_lessons"], 0);
            }),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_manager_skips_subscription_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seed_courses(Flow::new())
        .step(
            signup_action("boss@example.com", "bossbossboss")
                .with_save_cookies(false)
                .with_save_as("boss"),
        )
        .step(
            Action::new("promote", "PUT", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/account/{}/role", ctx.str_at("boss", "/id")))
                .with_body(json!({ "role": "manager" })),
        )
        .step(signin_action("boss@example.com", "bossbossboss").with_clear_cookies(true))
        .step(
            Action::new("lesson_get", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/lessons/{}", ctx.str_at("lesson_two", "/id"))),
        )
        .step(
            Action::new("course_list", "GET", "/api/v1/courses/")
                .assert_json(|body| assert_eq!(body.as_array().map(Vec::len), Some(2))),
        )
        .run(&mut server, pool)
        .await;
}
