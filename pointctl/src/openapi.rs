use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::api;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "X-Pointctl-User".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Pointctl-User"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/admin/api/v1", description = "Admin API server")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::reviews::submit_reviews,
        api::handlers::reviews::list_place_reviews,
        api::handlers::reviews::get_review,
        api::handlers::reviews::approve_review,
        api::handlers::reviews::reject_review,
        api::handlers::reviews::cancel_review,
        api::handlers::reviews::resubmit_review,
        api::handlers::reviews::register_review_url,
        api::handlers::reviews::check_review_url,
        api::handlers::reviews::create_delete_request,
        api::handlers::reviews::approve_delete_request,
        api::handlers::reviews::reject_delete_request,
        api::handlers::balances::get_balance,
        api::handlers::transactions::create_adjustment,
        api::handlers::transactions::get_transaction,
        api::handlers::transactions::list_transactions,
        api::handlers::sweeps::run_auto_refund,
    ),
    components(
        schemas(
            api::models::users::Role,
            api::models::users::UserResponse,
            api::models::users::CurrentUser,
            api::models::reviews::ReviewDraft,
            api::models::reviews::ReviewBatchCreate,
            api::models::reviews::ReviewBatchResponse,
            api::models::reviews::ReviewResponse,
            api::models::reviews::ReviewReject,
            api::models::reviews::ReviewUrlRegister,
            api::models::reviews::UrlCheckResponse,
            api::models::reviews::DeleteRequestCreate,
            api::models::reviews::DeleteRequestReject,
            api::models::balances::PointBalanceResponse,
            api::models::transactions::PointAdjustmentCreate,
            api::models::transactions::PointTransactionResponse,
            api::models::transactions::PointAdjustmentResponse,
            crate::db::models::points::TransactionKind,
            crate::db::models::reviews::PointStatus,
            crate::db::models::reviews::ReviewStatus,
            crate::sweep::SweepReport,
        )
    ),
    tags(
        (name = "reviews", description = "Review work item lifecycle"),
        (name = "balances", description = "Point balance lookup"),
        (name = "transactions", description = "Point ledger API"),
        (name = "sweeps", description = "Background maintenance"),
    ),
    info(
        title = "Pointctl API",
        version = "0.1.0",
        description = "API for the points ledger and the review approval workflow",
    ),
)]
pub struct ApiDoc;
