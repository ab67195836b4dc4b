//! Multi-destination planning.
//!
//! Destinations are planned one at a time. A failed destination is recorded
//! and the batch moves on. Cancellation is only observed between
//! destinations, so an in-flight pipeline always runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PlanError;
use crate::metrics;
use crate::models::{
    BatchProgress, BatchRun, DestinationCandidate, EventKind, PlanResult, PlanStatus,
    SelectionMode, TelemetryEvent, TripRequest,
};
use crate::pipeline::PipelineExecutor;
use crate::ranking::{default_selection, RankInput, Ranker};
use crate::telemetry::TelemetrySink;
use crate::tools::WeatherQuery;

/// Cooperative cancellation flag shared between a batch and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live updates for a presentation layer following a batch.
#[derive(Debug, Clone)]
pub enum BatchUpdate {
    Started(BatchProgress),
    Finished(PlanResult),
}

pub struct BatchCoordinator {
    pipeline: PipelineExecutor,
    ranker: Ranker,
    telemetry: Arc<TelemetrySink>,
}

impl BatchCoordinator {
    pub fn new(pipeline: PipelineExecutor, ranker: Ranker) -> Self {
        let telemetry = pipeline.telemetry().clone();
        Self {
            pipeline,
            ranker,
            telemetry,
        }
    }

    /// Looks up weather for every bucket-list entry, in order, and ranks them.
    pub async fn rank(&self, request: &TripRequest) -> Result<Vec<DestinationCandidate>, PlanError> {
        request.validate()?;
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let weather = &self.pipeline.tools().weather;

        let mut inputs = Vec::with_capacity(request.destinations.len());
        for destination in &request.destinations {
            let out = weather.lookup(&WeatherQuery::for_trip(request, destination)).await;
            self.emit(EventKind::ToolCall, run_id, json!({
                "destination": destination,
                "tool": out.tool,
                "is_mock": out.is_mock,
                "fallback": out.fallback,
            }))
            .await;
            // A failed lookup is never scored on its stand-in data.
            inputs.push(RankInput {
                name: destination.clone(),
                weather: (!out.fallback).then_some(out.data),
                is_mock: out.is_mock,
            });
        }

        let ranked = self.ranker.rank(inputs);
        self.emit(EventKind::WeatherAnalysis, run_id, json!({
            "destinations": request.destinations,
            "destinations_count": request.destinations.len(),
            "ranking": ranked.iter().map(|c| &c.name).collect::<Vec<_>>(),
            "unscored": ranked.iter().filter(|c| c.unscored).count(),
            "execution_ms": started.elapsed().as_millis() as u64,
        }))
        .await;

        Ok(ranked)
    }

    /// Turns a bucket list and a selection mode into the ordered destination set.
    pub async fn resolve_destinations(
        &self,
        request: &TripRequest,
        mode: &SelectionMode,
    ) -> Result<Vec<String>, PlanError> {
        request.validate()?;
        let selected = match mode {
            SelectionMode::All => request.destinations.clone(),
            SelectionMode::Selected { destinations } => select_subset(&request.destinations, destinations)?,
            SelectionMode::Recommended { count } => {
                if *count == 0 {
                    return Err(PlanError::InvalidRequest("recommended count must be at least 1".into()));
                }
                let ranked = self.rank(request).await?;
                let picks = default_selection(&ranked, *count);
                if picks.is_empty() {
                    // Nothing could be scored; fall back to rank order.
                    ranked.into_iter().take(*count).map(|c| c.name).collect()
                } else {
                    picks
                }
            }
        };

        Ok(selected)
    }

    /// Validates the request and opens a pending run for the chosen destinations.
    pub async fn prepare(&self, request: TripRequest, mode: &SelectionMode) -> Result<BatchRun, PlanError> {
        let destinations = self.resolve_destinations(&request, mode).await?;
        let run = BatchRun::new(request, destinations);
        let available = run.request.destinations.len();
        self.emit(EventKind::TripRequest, run.id, json!({
            "trip_mode": if run.request.destinations.len() > 1 { "bucket_list" } else { "single" },
            "origin": run.request.origin,
            "destinations": run.request.destinations,
            "date_range": { "start": run.request.start_date, "end": run.request.end_date },
            "interests": run.request.interests,
            "passengers": run.request.passengers,
            "selection": mode.label(),
        }))
        .await;
        self.emit(EventKind::DestinationSelection, run.id, json!({
            "available_destinations": run.request.destinations,
            "selected_destinations": run.destinations,
            "selection_type": mode.label(),
            "available_count": available,
            "selected_count": run.destinations.len(),
            "selection_percentage": run.destinations.len() as f64 / available as f64 * 100.0,
        }))
        .await;
        Ok(run)
    }

    /// Plans a single-destination request.
    pub async fn plan_single(&self, request: TripRequest) -> Result<PlanResult, PlanError> {
        if request.destinations.len() != 1 {
            return Err(PlanError::InvalidRequest(format!(
                "expected exactly one destination, got {}",
                request.destinations.len()
            )));
        }
        let run = self.prepare(request, &SelectionMode::All).await?;
        let mut run = self.drive(run, &CancelHandle::new(), None).await;
        run.results
            .pop()
            .ok_or_else(|| PlanError::InvalidRequest("no destination to plan".into()))
    }

    pub async fn run_batch(&self, request: TripRequest, destinations: Vec<String>) -> Result<BatchRun, PlanError> {
        self.run_batch_with(request, destinations, &CancelHandle::new(), None).await
    }

    pub async fn run_batch_with(
        &self,
        request: TripRequest,
        destinations: Vec<String>,
        cancel: &CancelHandle,
        updates: Option<UnboundedSender<BatchUpdate>>,
    ) -> Result<BatchRun, PlanError> {
        request.validate()?;
        if destinations.iter().any(|d| d.trim().is_empty()) {
            return Err(PlanError::InvalidRequest("destination names must not be blank".into()));
        }
        Ok(self.drive(BatchRun::new(request, destinations), cancel, updates).await)
    }

    /// Advances the run one destination at a time until it completes or a
    /// cancel is observed at a destination boundary.
    pub async fn drive(
        &self,
        mut run: BatchRun,
        cancel: &CancelHandle,
        updates: Option<UnboundedSender<BatchUpdate>>,
    ) -> BatchRun {
        let started = Instant::now();
        let total = run.destinations.len();
        info!(run_id = %run.id, total, "Starting batch");

        while let Some((index, destination)) = run.next_destination() {
            if cancel.is_cancelled() {
                info!(run_id = %run.id, processed = index, total, "Batch cancelled, skipping remaining destinations");
                run.cancel();
                metrics::DESTINATIONS
                    .with_label_values(&["skipped"])
                    .inc_by(run.counters.skipped as u64);
                break;
            }

            run.begin(index);
            let progress = BatchProgress {
                run_id: run.id,
                index: index + 1,
                total,
                destination: destination.clone(),
            };
            info!(run_id = %run.id, "Planning destination {}/{}: {}", index + 1, total, destination);
            self.emit(EventKind::BatchProgress, run.id, json!(&progress)).await;
            notify(&updates, BatchUpdate::Started(progress));

            let result = self.pipeline.run(run.id, &run.request, &destination).await;
            let status = match &result.status {
                PlanStatus::Success => "success",
                PlanStatus::Failed(reason) => {
                    warn!(run_id = %run.id, %destination, %reason, "Destination failed, continuing batch");
                    "failed"
                }
                PlanStatus::Skipped => "skipped",
            };
            metrics::DESTINATIONS.with_label_values(&[status]).inc();
            notify(&updates, BatchUpdate::Finished(result.clone()));
            run.record(result);
        }

        if !run.is_finished() {
            run.complete();
        }

        self.emit(EventKind::BatchComplete, run.id, json!({
            "state": run.state,
            "destinations": run.destinations,
            "destinations_count": total,
            "succeeded": run.counters.succeeded,
            "failed": run.counters.failed,
            "skipped": run.counters.skipped,
            "total_execution_ms": started.elapsed().as_millis() as u64,
        }))
        .await;
        info!(run_id = %run.id, counters = ?run.counters, state = ?run.state, "Batch finished");
        run
    }

    async fn emit(&self, kind: EventKind, run_id: Uuid, payload: serde_json::Value) {
        self.telemetry.emit(TelemetryEvent::new(kind, run_id, payload)).await;
    }
}

fn notify(updates: &Option<UnboundedSender<BatchUpdate>>, update: BatchUpdate) {
    if let Some(tx) = updates {
        // Receiver gone just means nobody is watching anymore.
        let _ = tx.send(update);
    }
}

/// Keeps bucket-list order, matches names case-insensitively and drops repeats.
fn select_subset(bucket: &[String], chosen: &[String]) -> Result<Vec<String>, PlanError> {
    let normalize = |s: &str| s.trim().to_lowercase();
    if chosen.is_empty() {
        return Err(PlanError::InvalidRequest("select at least one destination".into()));
    }
    if let Some(unknown) = chosen
        .iter()
        .find(|c| !bucket.iter().any(|b| normalize(b) == normalize(c)))
    {
        return Err(PlanError::InvalidRequest(format!(
            "'{unknown}' is not in the bucket list"
        )));
    }

    let mut picked: Vec<String> = Vec::new();
    for name in bucket {
        let wanted = chosen.iter().any(|c| normalize(c) == normalize(name));
        if wanted && !picked.iter().any(|p| normalize(p) == normalize(name)) {
            picked.push(name.clone());
        }
    }
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{canned_reply, MockLanguageModel, Reply};
    use crate::models::BatchState;
    use crate::test_support::{local_sink, read_events, trip};
    use crate::models::{Conditions, WeatherSummary};
    use crate::tools::{recover, unavailable, MockFlights, MockSearch, Toolbox, ToolOutput, WeatherLookup};
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    fn coordinator(llm: MockLanguageModel, dir: &std::path::Path) -> BatchCoordinator {
        let pipeline = PipelineExecutor::new(Arc::new(llm), Toolbox::mock(), local_sink(dir));
        BatchCoordinator::new(pipeline, Ranker::default())
    }

    /// Fails every prompt whose trip brief names `destination`.
    fn failing_for(destination: &'static str) -> MockLanguageModel {
        MockLanguageModel::from_fn(move |prompt, _| {
            if prompt.user.contains(&format!("Destination: {destination}")) {
                Reply::Fail(PlanError::Capability("upstream 503".into()))
            } else {
                Reply::Text(canned_reply(prompt))
            }
        })
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_batch() {
        let temp = tempdir().unwrap();
        let coord = coordinator(failing_for("Tokyo, Japan"), temp.path());
        let dests = ["Bali, Indonesia", "Tokyo, Japan", "Paris, France"];

        let run = coord.run_batch(trip(&dests), names(&dests)).await.unwrap();

        assert_eq!(run.state, BatchState::Completed);
        assert_eq!(run.results.len(), 3);
        let order: Vec<&str> = run.results.iter().map(|r| r.destination.as_str()).collect();
        assert_eq!(order, dests);
        assert!(run.results[0].is_success());
        assert!(matches!(run.results[1].status, PlanStatus::Failed(ref r) if r.contains("503")));
        assert!(run.results[2].is_success());
        assert_eq!(run.counters.succeeded, 2);
        assert_eq!(run.counters.failed, 1);
        assert_eq!(run.counters.skipped, 0);
    }

    #[tokio::test]
    async fn cancel_after_k_skips_the_rest() {
        let temp = tempdir().unwrap();
        let cancel = CancelHandle::new();
        let trigger = cancel.clone();
        // Cancel while the second destination's concierge is running.
        let llm = MockLanguageModel::from_fn(move |prompt, _| {
            if prompt.system.contains("travel concierge") && prompt.user.contains("Destination: B") {
                trigger.cancel();
            }
            Reply::Text(canned_reply(prompt))
        });
        let coord = coordinator(llm, temp.path());
        let dests = ["A", "B", "C", "D"];

        let run = coord
            .run_batch_with(trip(&dests), names(&dests), &cancel, None)
            .await
            .unwrap();

        assert_eq!(run.state, BatchState::Cancelled);
        assert_eq!(run.results.len(), 4);
        assert!(run.results[0].is_success());
        // The in-flight destination finished its whole chain.
        assert!(run.results[1].is_success());
        assert_eq!(run.results[1].steps.len(), 4);
        assert_eq!(run.results[2].status, PlanStatus::Skipped);
        assert_eq!(run.results[3].status, PlanStatus::Skipped);
        assert!(run.results[2].steps.is_empty());
        assert_eq!(run.counters.skipped, 2);
        assert_eq!(run.counters.total(), 4);
    }

    #[tokio::test]
    async fn cancel_before_start_skips_everything() {
        let temp = tempdir().unwrap();
        let llm = MockLanguageModel::cooperative();
        let coord = coordinator(llm, temp.path());
        let cancel = CancelHandle::new();
        cancel.cancel();

        let run = coord
            .run_batch_with(trip(&["A", "B"]), names(&["A", "B"]), &cancel, None)
            .await
            .unwrap();

        assert_eq!(run.counters.skipped, 2);
        assert_eq!(run.state, BatchState::Cancelled);
    }

    #[tokio::test]
    async fn progress_updates_follow_processing_order() {
        let temp = tempdir().unwrap();
        let coord = coordinator(MockLanguageModel::cooperative(), temp.path());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dests = ["Bali, Indonesia", "Tokyo, Japan"];

        coord
            .run_batch_with(trip(&dests), names(&dests), &CancelHandle::new(), Some(tx))
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push(match update {
                BatchUpdate::Started(p) => format!("start {}/{} {}", p.index, p.total, p.destination),
                BatchUpdate::Finished(r) => format!("done {}", r.destination),
            });
        }
        assert_eq!(
            seen,
            vec![
                "start 1/2 Bali, Indonesia",
                "done Bali, Indonesia",
                "start 2/2 Tokyo, Japan",
                "done Tokyo, Japan",
            ]
        );

        let events = read_events(temp.path());
        let progress: Vec<u64> = events
            .iter()
            .filter(|e| e["kind"] == "batch-progress")
            .map(|e| e["payload"]["index"].as_u64().unwrap())
            .collect();
        assert_eq!(progress, vec![1, 2]);
        assert_eq!(events.last().unwrap()["kind"], "batch-complete");
    }

    #[tokio::test]
    async fn invalid_request_rejected_before_any_work() {
        let temp = tempdir().unwrap();
        let llm = Arc::new(MockLanguageModel::cooperative());
        let pipeline = PipelineExecutor::new(llm.clone(), Toolbox::mock(), local_sink(temp.path()));
        let coord = BatchCoordinator::new(pipeline, Ranker::default());
        let mut request = trip(&["A"]);
        request.passengers = 0;

        let err = coord.run_batch(request, names(&["A"])).await.unwrap_err();

        assert!(matches!(err, PlanError::InvalidRequest(_)));
        assert_eq!(llm.call_count(), 0);
        assert!(read_events(temp.path()).is_empty());
    }

    #[tokio::test]
    async fn selected_mode_keeps_bucket_order() {
        let temp = tempdir().unwrap();
        let coord = coordinator(MockLanguageModel::cooperative(), temp.path());
        let request = trip(&["Bali, Indonesia", "Tokyo, Japan", "Paris, France"]);
        let mode = SelectionMode::Selected {
            destinations: names(&["paris, france ", "Bali, Indonesia", "PARIS, FRANCE"]),
        };

        let picked = coord.resolve_destinations(&request, &mode).await.unwrap();
        assert_eq!(picked, names(&["Bali, Indonesia", "Paris, France"]));

        let bad = SelectionMode::Selected {
            destinations: names(&["Lima, Peru"]),
        };
        assert!(matches!(
            coord.resolve_destinations(&request, &bad).await,
            Err(PlanError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn recommended_mode_uses_ranking() {
        let temp = tempdir().unwrap();
        let coord = coordinator(MockLanguageModel::cooperative(), temp.path());
        let request = trip(&["Bali, Indonesia", "Tokyo, Japan", "Paris, France", "Dubai, UAE"]);

        let ranked = coord.rank(&request).await.unwrap();
        let picked = coord
            .resolve_destinations(&request, &SelectionMode::Recommended { count: 2 })
            .await
            .unwrap();

        assert_eq!(picked, vec![ranked[0].name.clone(), ranked[1].name.clone()]);
        assert!(ranked.iter().all(|c| c.weather_is_mock));
    }

    /// Live for every destination except "Broken", whose provider is down.
    struct PartlyDownWeather;

    #[async_trait::async_trait]
    impl WeatherLookup for PartlyDownWeather {
        async fn lookup(&self, query: &WeatherQuery) -> ToolOutput<WeatherSummary> {
            let live = if query.destination == "Broken" {
                Err(unavailable("weather_lookup", "HTTP 503"))
            } else {
                Ok(WeatherSummary::complete(12.0, 0.5, Conditions::Cloudy))
            };
            recover("weather_lookup", live, || {
                WeatherSummary::complete(24.0, 0.0, Conditions::Clear)
            })
        }
    }

    #[tokio::test]
    async fn failed_lookup_is_unscored_and_ranked_last() {
        let temp = tempdir().unwrap();
        let tools = Toolbox::new(
            Arc::new(MockFlights),
            Arc::new(PartlyDownWeather),
            Arc::new(MockSearch),
        );
        let pipeline = PipelineExecutor::new(
            Arc::new(MockLanguageModel::cooperative()),
            tools,
            local_sink(temp.path()),
        );
        let coord = BatchCoordinator::new(pipeline, Ranker::default());
        let request = trip(&["Broken", "Real"]);

        let ranked = coord.rank(&request).await.unwrap();

        assert_eq!(ranked[0].name, "Real");
        assert!(ranked[0].score.is_some());
        assert_eq!(ranked[1].name, "Broken");
        assert!(ranked[1].unscored);
        assert_eq!(ranked[1].score, None);
        assert_eq!(ranked[1].rank, 2);
        assert!(ranked[1].weather.is_none());
        assert_eq!(default_selection(&ranked, 3), vec!["Real".to_string()]);

        let picked = coord
            .resolve_destinations(&request, &SelectionMode::Recommended { count: 2 })
            .await
            .unwrap();
        assert_eq!(picked, vec!["Real".to_string()]);
    }

    #[tokio::test]
    async fn single_plan_requires_one_destination() {
        let temp = tempdir().unwrap();
        let coord = coordinator(MockLanguageModel::cooperative(), temp.path());

        let result = coord.plan_single(trip(&["Bali, Indonesia"])).await.unwrap();
        assert!(result.is_success());

        let err = coord.plan_single(trip(&["A", "B"])).await.unwrap_err();
        assert!(matches!(err, PlanError::InvalidRequest(_)));
    }
}
