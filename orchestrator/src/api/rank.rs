use warp::{Rejection, Reply};
use tracing::info;

use super::{reject, AppState};
use crate::models::{RankRequest, RankResponse, DEFAULT_SELECTION_SIZE};
use crate::ranking::default_selection;

pub async fn handle_rank(request: RankRequest, state: AppState) -> Result<impl Reply, Rejection> {
    info!("Ranking {} destinations", request.trip.destinations.len());

    let candidates = state.coordinator.rank(&request.trip).await.map_err(reject)?;
    let default_selection = default_selection(&candidates, DEFAULT_SELECTION_SIZE);

    Ok(warp::reply::json(&RankResponse {
        candidates,
        default_selection,
    }))
}
