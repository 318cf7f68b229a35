mod common;
use memberdeck::model::entity::UserEntity;
use memberdeck::web::middlewares::AUTH_TOKEN;
use reqwest::StatusCode;
use serde_json::json;
use tower_cookies::cookie::SameSite;

use crate::common::{
    Action, Flow, setup_server, setup_test_db, signin_action, signin_admin_action, signup_action,
    signup_referred_action,
};

#[tokio::test]
async fn route_signup_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            signup_action("foo@example.com", "foobazbaz")
                .assert_cookie(AUTH_TOKEN, |cookie| {
                    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
                    assert_eq!(cookie.path(), Some("/"));
                    assert_eq!(cookie.http_only(), Some(true));
                })
                .assert_body(|body| {
                    let ent: UserEntity = serde_json::from_str(body).expect("Invalid body format");
                    assert_eq!(ent.email(), "foo@example.com");
                    assert_eq!(ent.display_name(), "foo");
                    assert_eq!(ent.role().to_string(), "member");
                    assert!(!ent.email_verified());
                    assert_eq!(ent.referral_code().len(), 8);
                })
                .with_expect(StatusCode::OK),
        )
        // try to signup twice, email comparison ignores case
        .step(signup_action("FOO@example.com", "foobazbaz").with_expect(StatusCode::CONFLICT))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_signup_validation_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            Action::new("signup_invalid", "POST", "/api/v1/account/signup")
                .with_body(json!({
                    "email": "not-an-email",
                    "password": "short",
                    "display_name": "  ",
                }))
                .with_save_cookies(false)
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_json(|body| {
                    let errors = body["errors"].as_array().expect("errors missing");
                    assert_eq!(errors.len(), 3);
                }),
        )
        .step(
            signup_referred_action("bar@example.com", "barbarbar", "NOPE1234")
                .with_save_cookies(false)
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_signin_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("signin@example.com", "signintest").with_save_cookies(false))
        .step(
            signin_action("signin@example.com", "signintest")
                .assert_cookie(AUTH_TOKEN, |cookie| {
                    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
                    assert_eq!(cookie.path(), Some("/"));
                    assert_eq!(cookie.http_only(), Some(true));
                })
                .assert_body(|body| {
                    let ent: UserEntity = serde_json::from_str(body).expect("Invalid JSON format");
                    assert_eq!(ent.email(), "signin@example.com");
                })
                .with_expect(StatusCode::OK)
                .with_clear_cookies(true),
        )
        // wrong credentials
        .step(
            signin_action("signin@example.com", "WRONGPASSWORD")
                .with_save_cookies(false)
                .with_clear_cookies(true)
                .assert_body(|body| {
                    assert!(body.contains("Authentication error"));
                })
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        // non-existing account
        .step(
            signin_action("nobody@example.com", "nevermind")
                .with_expect(StatusCode::UNAUTHORIZED)
                .assert_body(|body| assert!(body.contains("Authentication error"))),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_me_and_signout_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(Action::new("me_anonymous", "GET", "/api/v1/account/me").with_expect(StatusCode::UNAUTHORIZED))
        .step(signup_action("me@example.com", "mememememe"))
        .step(
            Action::new("me", "GET", "/api/v1/account/me").assert_json(|body| {
                assert_eq!(body["user"]["email"], "me@example.com");
                assert_eq!(body["subscription_active"], false);
                assert!(body["subscription"].is_null());
            }),
        )
        .step(Action::new("verify", "GET", "/api/v1/account/verify"))
        .step(
            Action::new("signout", "POST", "/api/v1/account/signout")
                .assert_cookie(AUTH_TOKEN, |cookie| assert_eq!(cookie.value(), "")),
        )
        .step(
            Action::new("verify_anonymous", "GET", "/api/v1/account/verify")
                .with_clear_cookies(true)
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_verify_email_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("verify@example.com", "verifyverify"))
        .step(
            Action::new("verify_email", "GET", "dynamic")
                .with_dyn_path(|ctx| {
                    format!(
                        "/api/v1/account/verify-email?token={}",
                        ctx.mailed_token("verify@example.com")
                    )
                })
                .assert_json(|body| assert_eq!(body["email_verified"], true)),
        )
        // tokens are single-use
        .step(
            Action::new("verify_email_again", "GET", "dynamic")
                .with_dyn_path(|ctx| {
                    format!(
                        "/api/v1/account/verify-email?token={}",
                        ctx.mailed_token("verify@example.com")
                    )
                })
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("resend_verified", "POST", "/api/v1/account/verify-email/resend")
                .with_expect(StatusCode::CONFLICT),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_password_reset_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("reset@example.com", "oldpassword").with_save_cookies(false))
        // unknown addresses get the same answer
        .step(
            Action::new("reset_unknown", "POST", "/api/v1/account/password-reset")
                .with_body(json!({ "email": "ghost@example.com" })),
        )
        .step(
            Action::new("reset", "POST", "/api/v1/account/password-reset")
                .with_body(json!({ "email": "reset@example.com" })),
        )
        .step(
            Action::new("reset_confirm_short", "POST", "/api/v1/account/password-reset/confirm")
                .with_dyn_body(|ctx| json!({ "token": ctx.mailed_token("reset@example.com"), "password": "short" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("reset_confirm", "POST", "/api/v1/account/password-reset/confirm")
                .with_dyn_body(|ctx| json!({ "token": ctx.mailed_token("reset@example.com"), "password": "newpassword" })),
        )
        .step(
            signin_action("reset@example.com", "oldpassword")
                .with_save_cookies(false)
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .step(signin_action("reset@example.com", "newpassword").with_save_cookies(false))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_list_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("list@example.com", "listlistlist").with_save_cookies(true))
        // try to request without admin perms
        .step(
            Action::new("user_list", "GET", "/api/v1/account/page")
                .assert_body(|body| {
                    assert!(body.contains("role `admin`"));
                })
                .with_param("limit", "5")
                .with_param("offset", "0")
                .with_expect(StatusCode::FORBIDDEN)
                .with_save_cookies(true),
        )
        // acquire admin account
        .step(signin_admin_action())
        .step(
            Action::new("user_list", "GET", "/api/v1/account/page")
                .with_param("limit", "5")
                .with_param("offset", "0")
                .assert_json(|body| {
                    assert_eq!(body["total"], 2);
                    assert_eq!(body["items"].as_array().map(Vec::len), Some(2));
                })
                .with_expect(StatusCode::OK),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_update_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            signup_action("first@example.com", "firstfirst")
                .with_save_cookies(false)
                .with_save_as("first_user"),
        )
        .step(
            signup_action("second@example.com", "secondsecond")
                .with_save_cookies(true)
                .with_save_as("second_user"),
        )
        // try to update `first_user` without permissions
        .step(
            Action::new("user_update", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("first_user");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_body(json!({ "display_name": "should fail" }))
                .with_expect(StatusCode::FORBIDDEN)
                .assert_body(|body| {
                    assert!(body.contains("forbidden"));
                }),
        )
        // try to update self, this one should work
        .step(
            Action::new("user_update", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("second_user");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_expect(StatusCode::OK)
                .with_body(json!({ "display_name": "Second Renamed" }))
                .assert_body(|body| {
                    assert!(body.contains("Second Renamed"));
                }),
        )
        .step(
            Action::new("user_update_empty", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("second_user");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_body(json!({ "display_name": "   " }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        // login as admin to test admin perms
        .step(
            signin_admin_action()
                .with_save_cookies(true)
                .with_clear_cookies(true),
        )
        .step(
            Action::new("user_update", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("first_user");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_body(json!({ "display_name": "Renamed By Admin" }))
                .with_expect(StatusCode::OK)
                .assert_body(|body| {
                    assert!(body.contains("Renamed By Admin"));
                }),
        )
        .step(
            Action::new("user_set_role", "PUT", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("first_user");
                    format!("/api/v1/account/{}/role", user.id())
                })
                .with_body(json!({ "role": "fp" }))
                .assert_json(|body| assert_eq!(body["role"], "fp")),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_delete_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(signup_action("keep@example.com", "keepkeepkeep").with_save_cookies(false).with_save_as("keep"))
        .step(signup_action("leave@example.com", "leaveleave").with_save_cookies(true).with_save_as("leave"))
        // we can't allow everybody to delete anybody
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("keep");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_expect(StatusCode::FORBIDDEN)
        )
        // self deletion is allowed
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("leave");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_expect(StatusCode::OK)
        )
        .step(signin_admin_action())
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("leave");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_expect(StatusCode::NOT_FOUND)
        )
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| {
                    let user = ctx.get_json::<UserEntity>("keep");
                    format!("/api/v1/account/{}", user.id())
                })
                .with_expect(StatusCode::OK)
        )
        .run(&mut server, pool)
        .await;
}
