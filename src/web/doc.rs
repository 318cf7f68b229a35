use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::web::middlewares::AUTH_TOKEN;

pub struct CookieAuthModifier;

impl Modify for CookieAuthModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(schema) = openapi.components.as_mut() {
            schema.add_security_scheme(
                "cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    AUTH_TOKEN,
                    "JWT token for current user",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "memberdeck"),
    paths(
        crate::web::routes::admin::admin_import_users_handler,
        crate::web::routes::admin::admin_import_contracts_handler,
        crate::web::routes::billing::billing_checkout_handler,
        crate::web::routes::billing::billing_subscription_handler,
        crate::web::routes::billing::billing_cancel_handler,
        crate::web::routes::billing::billing_refund_handler,
        crate::web::routes::billing::billing_promotion_code_handler,
        crate::web::routes::compensations::compensations_me_handler,
        crate::web::routes::compensations::compensations_page_handler,
        crate::web::routes::compensations::compensations_generate_handler,
        crate::web::routes::compensations::compensations_mark_paid_handler,
        crate::web::routes::contracts::contracts_create_handler,
        crate::web::routes::contracts::contracts_page_handler,
        crate::web::routes::courses::courses_list_handler,
        crate::web::routes::courses::courses_get_handler,
        crate::web::routes::courses::courses_create_handler,
        crate::web::routes::courses::courses_update_handler,
        crate::web::routes::courses::courses_delete_handler,
        crate::web::routes::cron::cron_monthly_handler,
        crate::web::routes::events::events_list_handler,
        crate::web::routes::events::events_get_handler,
        crate::web::routes::events::events_create_handler,
        crate::web::routes::events::events_add_schedule_handler,
        crate::web::routes::events::events_register_handler,
        crate::web::routes::events::events_cancel_handler,
        crate::web::routes::events::events_roster_handler,
        crate::web::routes::files::files_get_handler,
        crate::web::routes::lessons::lessons_get_handler,
        crate::web::routes::lessons::lessons_mark_done_handler,
        crate::web::routes::lessons::lessons_material_handler,
        crate::web::routes::lessons::lessons_create_handler,
        crate::web::routes::lessons::lessons_update_handler,
        crate::web::routes::lessons::lessons_delete_handler,
        crate::web::routes::notifications::notifications_list_handler,
        crate::web::routes::notifications::notifications_read_handler,
        crate::web::routes::notifications::notifications_broadcast_handler,
        crate::web::routes::progress::progress_get_handler,
        crate::web::routes::promotions::promotions_request_handler,
        crate::web::routes::promotions::promotions_mine_handler,
        crate::web::routes::promotions::promotions_page_handler,
        crate::web::routes::promotions::promotions_checklist_handler,
        crate::web::routes::promotions::promotions_approve_handler,
        crate::web::routes::promotions::promotions_reject_handler,
        crate::web::routes::referrals::referrals_me_handler,
        crate::web::routes::registrations::registrations_mine_handler,
        crate::web::routes::registrations::registrations_attendance_handler,
        crate::web::routes::user::user_signup_handler,
        crate::web::routes::user::user_signin_handler,
        crate::web::routes::user::user_signout_handler,
        crate::web::routes::user::user_verify_handler,
        crate::web::routes::user::user_me_handler,
        crate::web::routes::user::user_verify_email_handler,
        crate::web::routes::user::user_resend_verification_handler,
        crate::web::routes::user::user_password_reset_handler,
        crate::web::routes::user::user_password_reset_confirm_handler,
        crate::web::routes::user::user_list_handler,
        crate::web::routes::user::user_update_handler,
        crate::web::routes::user::user_set_role_handler,
        crate::web::routes::user::user_delete_handler,
        crate::web::routes::webhooks::webhooks_stripe_handler,
    ),
    modifiers(&CookieAuthModifier),
)]
pub struct ApiDoc;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_resource_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/account/signup",
            "/api/v1/billing/checkout",
            "/api/v1/webhooks/stripe",
            "/api/v1/events/schedules/{id}/register",
            "/api/v1/compensations/generate",
            "/api/v1/cron/monthly",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert!(
            doc.components
                .as_ref()
                .is_some_and(|c| c.security_schemes.contains_key("cookie"))
        );
    }
}
