use warp::{Rejection, Reply};
use tracing::info;

use super::{reject, AppState};
use crate::models::TripRequest;

/// Plans one destination synchronously and returns the full result,
/// failed or not.
pub async fn handle_plan(request: TripRequest, state: AppState) -> Result<impl Reply, Rejection> {
    info!("Planning single trip from {}", request.origin);

    let result = state.coordinator.plan_single(request).await.map_err(reject)?;
    Ok(warp::reply::json(&result))
}
