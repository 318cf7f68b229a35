mod common;
use reqwest::StatusCode;
use serde_json::json;

use crate::common::{
    ADMIN_EMAIL, Action, CRON_SECRET, Flow, setup_server, setup_test_db, signin_action,
    signin_admin_action, signup_action,
};

#[tokio::test]
async fn route_import_users_test() {
    let pool = setup_test_db().await;
    let mut app = setup_server(&pool).await;
    let mailer = app.mailer.clone();

    let upload = format!(
        "email,display_name,role\n{ADMIN_EMAIL},Admin again,admin\nnew.fp@example.com,\"Fp, New\",fp\n"
    );

    Flow::new()
        .step(signup_action("plain@example.com", "plainplain"))
        .step(
            Action::new("import_member", "POST", "/api/v1/admin/import/users")
                .with_text(&upload)
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signin_admin_action().with_clear_cookies(true))
        .step(
            Action::new("import_malformed", "POST", "/api/v1/admin/import/users")
                .with_text("email,display_name,role\nnot-an-email,,wizard\nok@example.com,Ok,member\n")
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_json(|body| {
                    let errors = body["errors"].as_array().expect("errors missing");
                    assert!(errors.iter().any(|e| e.as_str().is_some_and(|e| e.contains("line 2"))));
                }),
        )
        // nothing from the rejected file was stored
        .step(
            Action::new("users_after_reject", "GET", "/api/v1/account/page")
                .assert_json(|body| assert_eq!(body["total"], 2)),
        )
        .step(
            Action::new("import", "POST", "/api/v1/admin/import/users")
                .with_text(&upload)
                .assert_json(|body| {
                    assert_eq!(body["imported"], 1);
                    let skipped = body["skipped"].as_array().expect("skipped missing");
                    assert_eq!(skipped.len(), 1);
                    assert!(skipped[0].as_str().is_some_and(|s| s.contains(ADMIN_EMAIL)));
                }),
        )
        .step(
            Action::new("import_header_wrong", "POST", "/api/v1/admin/import/users")
                .with_text("mail,name\nx@example.com,X\n")
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .run(&mut app, pool)
        .await;

    let sent = mailer.sent();
    let invite = sent
        .iter()
        .find(|m| m.to == "new.fp@example.com")
        .expect("invite mail missing");
    assert_eq!(invite.subject, "Set your password");
    assert!(invite.body.contains("token="));
}

#[tokio::test]
async fn route_import_contracts_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("member@example.com", "membermember"))
        .step(signin_admin_action().with_clear_cookies(true))
        .step(
            Action::new("import_users", "POST", "/api/v1/admin/import/users")
                .with_text("email,display_name,role\nseller@example.com,Seller,fp\n"),
        )
        .step(
            Action::new("import_for_member", "POST", "/api/v1/admin/import/contracts")
                .with_text(
                    "fp_email,customer_name,amount,contracted_on\nseller@example.com,Acme,1000,2026-03-02\nmember@example.com,Acme,1000,2026-03-02\n",
                )
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_json(|body| {
                    assert_eq!(body["errors"].as_array().map(Vec::len), Some(1));
                }),
        )
        .step(
            Action::new("import_bad_amount", "POST", "/api/v1/admin/import/contracts")
                .with_text("fp_email,customer_name,amount,contracted_on\nseller@example.com,Acme,-5,03/02/2026\n")
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_json(|body| assert_eq!(body["errors"].as_array().map(Vec::len), Some(2))),
        )
        .step(
            Action::new("import_contracts", "POST", "/api/v1/admin/import/contracts")
                .with_text(
                    "fp_email,customer_name,amount,contracted_on\nseller@example.com,Acme,1000,2026-03-02\nSELLER@example.com,Globex,2500,2026-03-20\n",
                )
                .assert_json(|body| assert_eq!(body["imported"], 2)),
        )
        .step(
            Action::new("contracts_page", "GET", "/api/v1/contracts/")
                .assert_json(|body| assert_eq!(body["total"], 2)),
        )
        .step(
            Action::new("generate", "POST", "/api/v1/compensations/generate")
                .with_body(json!({ "year": 2026, "month": 3 }))
                .assert_json(|body| assert_eq!(body["written"], 1)),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_cron_secret_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            Action::new("cron_without_secret", "POST", "/api/v1/cron/monthly")
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(
            Action::new("cron_wrong_secret", "POST", "/api/v1/cron/monthly")
                .with_header("x-cron-secret", "guess")
                .with_expect(StatusCode::FORBIDDEN),
        )
        // a signed-in admin still needs the secret
        .step(signin_admin_action())
        .step(
            Action::new("cron_admin_cookie", "POST", "/api/v1/cron/monthly")
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(
            Action::new("cron", "POST", "/api/v1/cron/monthly")
                .with_header("x-cron-secret", CRON_SECRET)
                .assert_json(|body| {
                    assert!(body["compensations"]["period_start"].is_string());
                    assert_eq!(body["compensations"]["written"], 0);
                    assert!(body["expired_tokens_removed"].is_number());
                }),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_notification_broadcast_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("reader@example.com", "readerpass").with_save_as("reader"))
        .step(
            Action::new("broadcast_member", "POST", "/api/v1/notifications/")
                .with_body(json!({ "title": "Hi", "body": "", "role": "member" }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signup_action("other@example.com", "otherother").with_clear_cookies(true))
        .step(signin_admin_action().with_clear_cookies(true))
        .step(
            Action::new("broadcast_no_target", "POST", "/api/v1/notifications/")
                .with_body(json!({ "title": "Hi", "body": "" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("broadcast_two_targets", "POST", "/api/v1/notifications/")
                .with_dyn_body(|ctx| {
                    json!({
                        "title": "Hi",
                        "body": "",
                        "role": "member",
                        "user_id": ctx.str_at("reader", "/id"),
                    })
                })
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("broadcast_unknown_user", "POST", "/api/v1/notifications/")
                .with_body(json!({ "title": "Hi", "body": "", "user_id": uuid::Uuid::new_v4() }))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("broadcast_members", "POST", "/api/v1/notifications/")
                .with_body(json!({ "title": "Welcome week", "body": "Events all week", "role": "member" }))
                .assert_json(|body| assert_eq!(body["delivered"], 2)),
        )
        .step(
            Action::new("broadcast_one", "POST", "/api/v1/notifications/")
                .with_dyn_body(|ctx| {
                    json!({ "title": "Just you", "body": "", "user_id": ctx.str_at("reader", "/id") })
                })
                .assert_json(|body| assert_eq!(body["delivered"], 1)),
        )
        .step(signin_action("reader@example.com", "readerpass").with_clear_cookies(true))
        .step(
            Action::new("inbox", "GET", "/api/v1/notifications/")
                .assert_json(|body| assert_eq!(body.as_array().map(Vec::len), Some(2)))
                .with_save_as("inbox"),
        )
        .step(
            Action::new("read", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/notifications/{}/read", ctx.str_at("inbox", "/0/id")))
                .assert_json(|body| assert!(body["read_at"].is_string())),
        )
        .step(
            Action::new("unread", "GET", "/api/v1/notifications/")
                .with_param("unread_only", "true")
                .assert_json(|body| assert_eq!(body.as_array().map(Vec::len), Some(1))),
        )
        .step(signin_action("other@example.com", "otherother").with_clear_cookies(true))
        .step(
            Action::new("read_foreign", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/notifications/{}/read", ctx.str_at("inbox", "/0/id")))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .run(&mut server, pool)
        .await;
}
