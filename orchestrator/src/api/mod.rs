use std::sync::Arc;

use warp::{Filter, Rejection, Reply};

use crate::batch::BatchCoordinator;
use crate::error::ApiError;
use crate::redis_client::RedisClient;

mod batches;
mod plan;
mod rank;

pub use batches::BatchRegistry;

/// Everything a handler needs. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<BatchCoordinator>,
    pub batches: BatchRegistry,
    pub redis: Option<RedisClient>,
}

impl AppState {
    pub fn new(coordinator: BatchCoordinator, redis: Option<RedisClient>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            batches: BatchRegistry::default(),
            redis,
        }
    }
}

pub fn routes(
    state: AppState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let api = warp::path("api").and(warp::path("v1"));

    let rank_route = api
        .and(warp::path("rank"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(rank::handle_rank);

    let plan_route = api
        .and(warp::path("plan"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(plan::handle_plan);

    let start_batch_route = api
        .and(warp::path("batches"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(batches::handle_start);

    let get_batch_route = api
        .and(warp::path("batches"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(batches::handle_get);

    let cancel_batch_route = api
        .and(warp::path("batches"))
        .and(warp::path::param())
        .and(warp::path("cancel"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state))
        .and_then(batches::handle_cancel);

    rank_route
        .or(plan_route)
        .or(start_batch_route)
        .or(get_batch_route)
        .or(cancel_batch_route)
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn reject(err: impl Into<ApiError>) -> Rejection {
    warp::reject::custom(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::handle_rejection;
    use crate::llm::mock::MockLanguageModel;
    use crate::models::BatchState;
    use crate::pipeline::PipelineExecutor;
    use crate::ranking::Ranker;
    use crate::test_support::local_sink;
    use crate::tools::Toolbox;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tempfile::tempdir;
    use warp::http::StatusCode;

    fn state(dir: &std::path::Path) -> AppState {
        let pipeline = PipelineExecutor::new(
            Arc::new(MockLanguageModel::cooperative()),
            Toolbox::mock(),
            local_sink(dir),
        );
        AppState::new(BatchCoordinator::new(pipeline, Ranker::default()), None)
    }

    fn trip_json(destinations: &[&str]) -> Value {
        json!({
            "origin": "San Mateo, CA",
            "destinations": destinations,
            "start_date": "2027-01-10",
            "end_date": "2027-01-16",
            "interests": "food",
            "passengers": 2
        })
    }

    #[tokio::test]
    async fn rank_returns_candidates_and_default_selection() {
        let temp = tempdir().unwrap();
        let api = routes(state(temp.path())).recover(handle_rejection);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/v1/rank")
            .json(&json!({ "trip": trip_json(&["Bali, Indonesia", "Tokyo, Japan"]) }))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["candidates"].as_array().unwrap().len(), 2);
        assert_eq!(body["candidates"][0]["rank"], 1);
        assert_eq!(body["default_selection"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn plan_rejects_multiple_destinations() {
        let temp = tempdir().unwrap();
        let api = routes(state(temp.path())).recover(handle_rejection);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/v1/plan")
            .json(&trip_json(&["Bali, Indonesia", "Tokyo, Japan"]))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_batch_is_not_found() {
        let temp = tempdir().unwrap();
        let api = routes(state(temp.path())).recover(handle_rejection);

        let resp = warp::test::request()
            .method("GET")
            .path(&format!("/api/v1/batches/{}", uuid::Uuid::new_v4()))
            .reply(&api)
            .await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn started_batch_runs_to_completion() {
        let temp = tempdir().unwrap();
        let api = routes(state(temp.path())).recover(handle_rejection);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/v1/batches")
            .json(&json!({
                "trip": trip_json(&["Bali, Indonesia", "Tokyo, Japan", "Paris, France"]),
                "mode": { "mode": "selected", "destinations": ["Tokyo, Japan", "Bali, Indonesia"] }
            }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let accepted: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(accepted["destinations"], json!(["Bali, Indonesia", "Tokyo, Japan"]));
        let path = format!("/api/v1/batches/{}", accepted["run_id"].as_str().unwrap());

        let mut run: Value = Value::Null;
        for _ in 0..200 {
            let resp = warp::test::request().method("GET").path(&path).reply(&api).await;
            assert_eq!(resp.status(), StatusCode::OK);
            run = serde_json::from_slice(resp.body()).unwrap();
            if run["state"]["state"] == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let finished: crate::models::BatchRun = serde_json::from_value(run).unwrap();
        assert_eq!(finished.state, BatchState::Completed);
        assert_eq!(finished.results.len(), 2);
        assert_eq!(finished.counters.succeeded, 2);
    }
}
