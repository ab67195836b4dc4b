//! Trip-planning orchestrator: tool adapters with mock fallback, a chain of
//! role-specialised agents per destination, weather-based ranking of a
//! bucket list, and a cancellable multi-destination batch coordinator.

pub mod agents;
pub mod api;
pub mod batch;
pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod ranking;
pub mod redis_client;
pub mod telemetry;
pub mod tools;

#[cfg(test)]
mod test_support;
