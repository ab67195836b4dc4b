//! Tool adapters: flight search, weather lookup and web search.
//!
//! Each capability has one live implementation and one mock. The live
//! implementation is only constructed when its credential is configured, and
//! it substitutes mock data whenever the remote call fails. Callers therefore
//! always get a result, and `ToolOutput::is_mock` tells them whether it can be
//! trusted.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::PlanError;
use crate::metrics;

pub mod flights;
pub mod search;
pub mod weather;

pub use flights::{FlightOption, FlightQuery, MockFlights, SerpApiFlights};
pub use search::{MockSearch, SearchHit, SerperSearch};
pub use weather::{MockWeather, OpenWeather, WeatherQuery};

use crate::models::WeatherSummary;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput<T> {
    pub tool: &'static str,
    pub data: T,
    pub is_mock: bool,
    /// Set when a live call failed and the data is a stand-in for it.
    pub fallback: bool,
}

impl<T> ToolOutput<T> {
    pub fn live(tool: &'static str, data: T) -> Self {
        metrics::record_tool_call(tool, false);
        Self {
            tool,
            data,
            is_mock: false,
            fallback: false,
        }
    }

    /// Output of a mock adapter; counts as a mock-sourced call.
    pub fn mock(tool: &'static str, data: T) -> Self {
        metrics::record_tool_call(tool, true);
        Self {
            tool,
            data,
            is_mock: true,
            fallback: false,
        }
    }

    fn fallback(tool: &'static str, data: T) -> Self {
        metrics::record_tool_call(tool, true);
        Self {
            tool,
            data,
            is_mock: true,
            fallback: true,
        }
    }

    pub fn record(&self, query: impl Into<String>) -> ToolCallRecord {
        ToolCallRecord {
            tool: self.tool,
            query: query.into(),
            is_mock: self.is_mock,
        }
    }
}

/// What an agent step reports about each tool it called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallRecord {
    pub tool: &'static str,
    pub query: String,
    pub is_mock: bool,
}

#[async_trait]
pub trait FlightSearch: Send + Sync {
    async fn search(&self, query: &FlightQuery) -> ToolOutput<Vec<FlightOption>>;
}

#[async_trait]
pub trait WeatherLookup: Send + Sync {
    async fn lookup(&self, query: &WeatherQuery) -> ToolOutput<WeatherSummary>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> ToolOutput<Vec<SearchHit>>;
}

/// Resolves a live call, swapping in mock data on `ToolUnavailable`.
pub(crate) fn recover<T>(
    tool: &'static str,
    live: Result<T, PlanError>,
    fallback: impl FnOnce() -> T,
) -> ToolOutput<T> {
    match live {
        Ok(data) => ToolOutput::live(tool, data),
        Err(err) => {
            warn!(tool, error = %err, "Tool unavailable, substituting mock data");
            ToolOutput::fallback(tool, fallback())
        }
    }
}

pub(crate) fn unavailable(tool: &str, reason: impl std::fmt::Display) -> PlanError {
    PlanError::ToolUnavailable {
        tool: tool.to_string(),
        reason: reason.to_string(),
    }
}

/// The fixed set of capabilities handed to agent roles.
#[derive(Clone)]
pub struct Toolbox {
    pub flights: Arc<dyn FlightSearch>,
    pub weather: Arc<dyn WeatherLookup>,
    pub search: Arc<dyn WebSearch>,
}

impl Toolbox {
    pub fn new(
        flights: Arc<dyn FlightSearch>,
        weather: Arc<dyn WeatherLookup>,
        search: Arc<dyn WebSearch>,
    ) -> Self {
        Self {
            flights,
            weather,
            search,
        }
    }

    /// Picks live or mock adapters by credential presence.
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let timeout = config.tool_timeout();

        let flights: Arc<dyn FlightSearch> = match &config.serpapi_api_key {
            Some(key) => Arc::new(SerpApiFlights::new(http.clone(), key.clone(), timeout)),
            None => {
                info!("SERPAPI_API_KEY not set, flight search uses mock data");
                Arc::new(MockFlights)
            }
        };
        let weather: Arc<dyn WeatherLookup> = match &config.openweather_api_key {
            Some(key) => Arc::new(OpenWeather::new(http.clone(), key.clone(), timeout)),
            None => {
                info!("OPENWEATHER_API_KEY not set, weather lookup uses mock data");
                Arc::new(MockWeather)
            }
        };
        let search: Arc<dyn WebSearch> = match &config.serper_api_key {
            Some(key) => Arc::new(SerperSearch::new(http, key.clone(), timeout)),
            None => {
                info!("SERPER_API_KEY not set, web search uses mock data");
                Arc::new(MockSearch)
            }
        };

        Self::new(flights, weather, search)
    }

    pub fn mock() -> Self {
        Self::new(Arc::new(MockFlights), Arc::new(MockWeather), Arc::new(MockSearch))
    }
}

/// Stable pseudo-random seed so mock data is repeatable per destination.
pub(crate) fn seed(text: &str) -> u32 {
    text.trim()
        .to_lowercase()
        .bytes()
        .fold(2166136261u32, |acc, b| (acc ^ b as u32).wrapping_mul(16777619))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::trip;

    #[tokio::test]
    async fn missing_credentials_yield_flagged_mock_results() {
        let config = Config::from_lookup(|_| None).unwrap();
        let tools = Toolbox::from_config(&config, reqwest::Client::new());
        let request = trip(&["Bali, Indonesia"]);

        let flights = tools
            .flights
            .search(&FlightQuery::for_trip(&request, "Bali, Indonesia"))
            .await;
        let weather = tools
            .weather
            .lookup(&WeatherQuery::for_trip(&request, "Bali, Indonesia"))
            .await;
        let hits = tools.search.search("things to do in Bali").await;

        assert!(flights.is_mock && !flights.data.is_empty());
        assert!(weather.is_mock);
        assert!(hits.is_mock && !hits.data.is_empty());
    }

    #[test]
    fn recover_flags_fallback() {
        let out = recover("weather", Err(unavailable("weather", "quota")), || 7);
        assert!(out.is_mock && out.fallback);
        assert_eq!(out.data, 7);

        let out = recover::<u8>("weather", Ok(3), || 7);
        assert!(!out.is_mock && !out.fallback);
        assert_eq!(out.data, 3);
    }

    #[test]
    fn seed_ignores_case_and_padding() {
        assert_eq!(seed("Tokyo, Japan"), seed("  tokyo, japan "));
        assert_ne!(seed("Tokyo, Japan"), seed("Paris, France"));
    }
}
