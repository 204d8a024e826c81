use crate::{
    auth::permissions::{operation, resource, RequiresPermission},
    errors::Result,
    sweep::{self, SweepReport},
    AppState,
};
use axum::{extract::State, response::Json};

/// Trigger the auto-refund sweep
#[utoipa::path(
    post,
    path = "/sweeps/auto-refund",
    tag = "sweeps",
    summary = "Run the auto-refund sweep now",
    description = "Refund pending reviews whose grace period has expired, one transaction per item. The same pass the background daemon runs on its interval.",
    responses(
        (status = 200, description = "Sweep report", body = SweepReport),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - sweep access required"),
        (status = 500, description = "Grace period setting missing or sweep failure"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn run_auto_refund(
    State(state): State<AppState>,
    _perm: RequiresPermission<resource::Sweeps, operation::CreateAll>,
) -> Result<Json<SweepReport>> {
    let report = sweep::run_auto_refund_sweep(&state.db, state.config.sweep.batch_size).await?;
    Ok(Json(report))
}
