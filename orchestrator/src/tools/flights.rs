use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{recover, seed, unavailable, FlightSearch, ToolOutput};
use crate::error::PlanError;
use crate::models::TripRequest;

const TOOL: &str = "flight_search";
const SERPAPI_URL: &str = "https://serpapi.com/search.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightQuery {
    pub origin: String,
    pub destination: String,
    pub depart: NaiveDate,
    pub return_date: NaiveDate,
    pub passengers: u32,
}

impl FlightQuery {
    pub fn for_trip(request: &TripRequest, destination: &str) -> Self {
        Self {
            origin: request.origin.clone(),
            destination: destination.to_string(),
            depart: request.start_date,
            return_date: request.end_date,
            passengers: request.passengers,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{} -> {} ({} to {}, {} pax)",
            self.origin, self.destination, self.depart, self.return_date, self.passengers
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightOption {
    pub carrier: String,
    pub price_usd: Option<f64>,
    pub stops: u32,
    pub duration_minutes: Option<u32>,
}

pub struct MockFlights;

impl MockFlights {
    fn options(query: &FlightQuery) -> Vec<FlightOption> {
        let s = seed(&format!("{}|{}", query.origin, query.destination));
        let base = 350.0 + (s % 900) as f64;
        vec![
            FlightOption {
                carrier: "Sample Air".into(),
                price_usd: Some(base * query.passengers as f64),
                stops: 0,
                duration_minutes: Some(300 + s % 600),
            },
            FlightOption {
                carrier: "Example Airways".into(),
                price_usd: Some((base * 0.8).round() * query.passengers as f64),
                stops: 1,
                duration_minutes: Some(480 + s % 600),
            },
        ]
    }
}

#[async_trait]
impl FlightSearch for MockFlights {
    async fn search(&self, query: &FlightQuery) -> ToolOutput<Vec<FlightOption>> {
        ToolOutput::mock(TOOL, Self::options(query))
    }
}

/// Google Flights results through SerpApi.
pub struct SerpApiFlights {
    http: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl SerpApiFlights {
    pub fn new(http: reqwest::Client, api_key: String, timeout: Duration) -> Self {
        Self {
            http,
            api_key,
            timeout,
        }
    }

    async fn fetch(&self, query: &FlightQuery) -> Result<Vec<FlightOption>, PlanError> {
        let depart = query.depart.to_string();
        let ret = query.return_date.to_string();
        let adults = query.passengers.to_string();
        let resp = self
            .http
            .get(SERPAPI_URL)
            .timeout(self.timeout)
            .query(&[
                ("engine", "google_flights"),
                ("departure_id", query.origin.as_str()),
                ("arrival_id", query.destination.as_str()),
                ("outbound_date", depart.as_str()),
                ("return_date", ret.as_str()),
                ("adults", adults.as_str()),
                ("currency", "USD"),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| unavailable(TOOL, e))?;

        if !resp.status().is_success() {
            return Err(unavailable(TOOL, format!("HTTP {}", resp.status())));
        }
        let body: Value = resp.json().await.map_err(|e| unavailable(TOOL, e))?;
        let options = parse_serpapi(&body);
        debug!(count = options.len(), "Parsed flight options");
        if options.is_empty() {
            return Err(unavailable(TOOL, "no flight options returned"));
        }
        Ok(options)
    }
}

fn parse_serpapi(body: &Value) -> Vec<FlightOption> {
    ["best_flights", "other_flights"]
        .iter()
        .filter_map(|key| body[*key].as_array())
        .flatten()
        .take(5)
        .map(|offer| FlightOption {
            carrier: offer["flights"][0]["airline"]
                .as_str()
                .unwrap_or("Unknown carrier")
                .to_string(),
            price_usd: offer["price"].as_f64(),
            stops: offer["layovers"].as_array().map_or(0, |l| l.len() as u32),
            duration_minutes: offer["total_duration"].as_u64().map(|d| d as u32),
        })
        .collect()
}

#[async_trait]
impl FlightSearch for SerpApiFlights {
    async fn search(&self, query: &FlightQuery) -> ToolOutput<Vec<FlightOption>> {
        recover(TOOL, self.fetch(query).await, || MockFlights::options(query))
    }
}
