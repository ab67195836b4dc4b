use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use super::{reject, AppState};
use crate::batch::{BatchUpdate, CancelHandle};
use crate::error::ApiError;
use crate::models::{BatchAccepted, BatchRequest, BatchRun};
use crate::redis_client::{batch_key, RedisClient, PROGRESS_CHANNEL, RUN_TTL_SECS};

/// How long a finished run that never reached redis stays visible here.
const FINISHED_RETENTION_MINUTES: i64 = 60;

struct BatchEntry {
    snapshot: BatchRun,
    cancel: CancelHandle,
}

/// In-process view of every batch started by this server.
#[derive(Clone, Default)]
pub struct BatchRegistry {
    inner: Arc<RwLock<HashMap<Uuid, BatchEntry>>>,
}

impl BatchRegistry {
    pub async fn insert(&self, run: BatchRun, cancel: CancelHandle) {
        let mut guard = self.inner.write().await;
        let cutoff = Utc::now() - Duration::minutes(FINISHED_RETENTION_MINUTES);
        guard.retain(|_, entry| entry.snapshot.finished_at.map_or(true, |at| at > cutoff));
        guard.insert(run.id, BatchEntry { snapshot: run, cancel });
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<BatchRun> {
        self.inner.read().await.get(&id).map(|e| e.snapshot.clone())
    }

    /// Requests cancellation. Returns the current snapshot, or `None` if the
    /// batch is unknown.
    pub async fn cancel(&self, id: Uuid) -> Option<BatchRun> {
        let guard = self.inner.read().await;
        let entry = guard.get(&id)?;
        entry.cancel.cancel();
        Some(entry.snapshot.clone())
    }

    /// Applies a live update unless the final run has already been stored.
    async fn apply(&self, id: Uuid, update: &BatchUpdate) {
        if let Some(entry) = self.inner.write().await.get_mut(&id) {
            if entry.snapshot.is_finished() {
                return;
            }
            match update {
                BatchUpdate::Started(progress) => entry.snapshot.begin(progress.index - 1),
                BatchUpdate::Finished(result) => entry.snapshot.record(result.clone()),
            }
        }
    }

    /// Stores the final run. Once it is cached in redis the entry is dropped
    /// and lookups are served from there.
    async fn finish(&self, run: BatchRun, cached: bool) {
        let mut guard = self.inner.write().await;
        if cached {
            guard.remove(&run.id);
        } else if let Some(entry) = guard.get_mut(&run.id) {
            entry.snapshot = run;
        }
    }
}

pub async fn handle_start(request: BatchRequest, state: AppState) -> Result<impl Reply, Rejection> {
    let run = state
        .coordinator
        .prepare(request.trip, &request.mode)
        .await
        .map_err(reject)?;
    info!("Accepted batch {} with {} destinations", run.id, run.destinations.len());

    let accepted = BatchAccepted {
        run_id: run.id,
        destinations: run.destinations.clone(),
    };
    let cancel = CancelHandle::new();
    state.batches.insert(run.clone(), cancel.clone()).await;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_updates(run.id, rx, state.batches.clone(), state.redis.clone()));

    let coordinator = state.coordinator.clone();
    let batches = state.batches.clone();
    let mut redis = state.redis.clone();
    tokio::spawn(async move {
        let finished = coordinator.drive(run, &cancel, Some(tx)).await;
        let mut cached = false;
        if let Some(redis) = redis.as_mut() {
            match redis
                .set_with_expiry(&batch_key(finished.id), &finished, RUN_TTL_SECS)
                .await
            {
                Ok(()) => cached = true,
                Err(e) => warn!("Failed to cache batch {}: {}", finished.id, e),
            }
        }
        batches.finish(finished, cached).await;
    });

    Ok(warp::reply::with_status(
        warp::reply::json(&accepted),
        StatusCode::ACCEPTED,
    ))
}

/// Mirrors coordinator updates into the registry and onto the progress channel.
async fn forward_updates(
    run_id: Uuid,
    mut rx: mpsc::UnboundedReceiver<BatchUpdate>,
    batches: BatchRegistry,
    mut redis: Option<RedisClient>,
) {
    while let Some(update) = rx.recv().await {
        batches.apply(run_id, &update).await;
        if let (BatchUpdate::Started(progress), Some(redis)) = (&update, redis.as_mut()) {
            if let Err(e) = redis.publish(PROGRESS_CHANNEL, progress).await {
                error!("Failed to publish progress for batch {}: {}", run_id, e);
            }
        }
    }
}

pub async fn handle_get(id: Uuid, state: AppState) -> Result<impl Reply, Rejection> {
    if let Some(run) = state.batches.snapshot(id).await {
        return Ok(warp::reply::json(&run));
    }

    match cached_run(id, &state).await {
        Some(run) => Ok(warp::reply::json(&run)),
        None => Err(reject(ApiError::NotFound(format!("batch {id}")))),
    }
}

/// Finished runs, including ones started by another instance or before a restart.
async fn cached_run(id: Uuid, state: &AppState) -> Option<BatchRun> {
    let mut redis = state.redis.clone()?;
    match redis.get::<BatchRun>(&batch_key(id)).await {
        Ok(run) => run,
        Err(e) => {
            warn!("Redis lookup for batch {} failed: {}", id, e);
            None
        }
    }
}

pub async fn handle_cancel(id: Uuid, state: AppState) -> Result<impl Reply, Rejection> {
    let run = match state.batches.cancel(id).await {
        Some(run) => run,
        None => cached_run(id, &state)
            .await
            .ok_or_else(|| reject(ApiError::NotFound(format!("batch {id}"))))?,
    };
    info!("Cancellation requested for batch {}", id);

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "run_id": id,
            "cancel_requested": !run.is_finished(),
            "state": run.state,
        })),
        StatusCode::ACCEPTED,
    ))
}
