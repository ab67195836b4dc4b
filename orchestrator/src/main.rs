use std::sync::Arc;
use std::time::Duration;

use warp::Filter;
use tracing::{info, warn};

use trip_orchestrator::api::{self, AppState};
use trip_orchestrator::batch::BatchCoordinator;
use trip_orchestrator::config::Config;
use trip_orchestrator::error::handle_rejection;
use trip_orchestrator::llm::ChatCompletionsClient;
use trip_orchestrator::metrics;
use trip_orchestrator::middleware;
use trip_orchestrator::pipeline::PipelineExecutor;
use trip_orchestrator::ranking::Ranker;
use trip_orchestrator::redis_client::RedisClient;
use trip_orchestrator::telemetry::TelemetrySink;
use trip_orchestrator::tools::Toolbox;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level))
        )
        .json()
        .init();

    info!("Starting trip planning orchestrator");

    let http = reqwest::Client::builder()
        .user_agent(concat!("trip-orchestrator/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let telemetry = Arc::new(TelemetrySink::from_config(&config, http.clone()));
    info!(session_id = telemetry.session_id(), "Telemetry sink ready");

    let tools = Toolbox::from_config(&config, http.clone());
    let llm = Arc::new(ChatCompletionsClient::new(&config, http));

    // A step covers one model call plus at most one tool call.
    let step_timeout = config.llm_timeout() + config.tool_timeout() + Duration::from_secs(5);
    let pipeline = PipelineExecutor::new(llm, tools, telemetry).with_step_timeout(step_timeout);
    let coordinator = BatchCoordinator::new(pipeline, Ranker::new(config.comfort_band()));

    // Redis is optional: without it batches are only visible to this process.
    let redis = match &config.redis_url {
        Some(url) => match RedisClient::new(url).await {
            Ok(client) => {
                info!("Redis connection established");
                Some(client)
            }
            Err(e) => {
                warn!("Redis unavailable, continuing without it: {}", e);
                None
            }
        },
        None => None,
    };

    // Build API routes
    let api_routes = api::routes(AppState::new(coordinator, redis));

    // Health check route
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    // Metrics route
    let metrics_route = warp::path("metrics")
        .and(warp::get())
        .map(|| match metrics::render() {
            Ok((body, content_type)) => warp::http::Response::builder()
                .header("Content-Type", content_type)
                .body(body),
            Err(e) => warp::http::Response::builder()
                .status(warp::http::StatusCode::INTERNAL_SERVER_ERROR)
                .body(e.to_string()),
        });

    let routes = health
        .or(metrics_route)
        .or(api_routes)
        .recover(handle_rejection)
        .with(warp::log("api"))
        .with(middleware::cors());

    // Start server
    let addr = ([0, 0, 0, 0], config.port);
    info!("Server listening on {}", addr.1);

    warp::serve(routes)
        .run(addr)
        .await;

    Ok(())
}
