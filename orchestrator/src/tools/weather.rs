use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use super::{recover, seed, unavailable, ToolOutput, WeatherLookup};
use crate::error::PlanError;
use crate::models::{Conditions, TripRequest, WeatherSummary};

const TOOL: &str = "weather_lookup";
const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherQuery {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl WeatherQuery {
    pub fn for_trip(request: &TripRequest, destination: &str) -> Self {
        Self {
            destination: destination.to_string(),
            start_date: request.start_date,
            end_date: request.end_date,
        }
    }
}

pub struct MockWeather;

impl MockWeather {
    fn summary(query: &WeatherQuery) -> WeatherSummary {
        const CONDITIONS: [Conditions; 5] = [
            Conditions::Clear,
            Conditions::PartlyCloudy,
            Conditions::Cloudy,
            Conditions::Rainy,
            Conditions::Clear,
        ];
        let s = seed(&query.destination);
        WeatherSummary::complete(
            8.0 + (s % 25) as f64,
            ((s / 25) % 80) as f64 / 100.0,
            CONDITIONS[((s / 2000) % CONDITIONS.len() as u32) as usize],
        )
    }
}

#[async_trait]
impl WeatherLookup for MockWeather {
    async fn lookup(&self, query: &WeatherQuery) -> ToolOutput<WeatherSummary> {
        ToolOutput::mock(TOOL, Self::summary(query))
    }
}

/// OpenWeatherMap 5-day / 3-hour forecast, averaged over the returned window.
pub struct OpenWeather {
    http: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl OpenWeather {
    pub fn new(http: reqwest::Client, api_key: String, timeout: Duration) -> Self {
        Self {
            http,
            api_key,
            timeout,
        }
    }

    async fn fetch(&self, query: &WeatherQuery) -> Result<WeatherSummary, PlanError> {
        let resp = self
            .http
            .get(FORECAST_URL)
            .timeout(self.timeout)
            .query(&[
                ("q", query.destination.as_str()),
                ("units", "metric"),
                ("appid", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| unavailable(TOOL, e))?;

        if !resp.status().is_success() {
            return Err(unavailable(TOOL, format!("HTTP {}", resp.status())));
        }
        let body: Value = resp.json().await.map_err(|e| unavailable(TOOL, e))?;
        Ok(summarize_forecast(&body))
    }
}

/// Fields the forecast does not cover stay `None`.
fn summarize_forecast(body: &Value) -> WeatherSummary {
    let Some(entries) = body["list"].as_array() else {
        return WeatherSummary::default();
    };

    let temps: Vec<f64> = entries.iter().filter_map(|e| e["main"]["temp"].as_f64()).collect();
    let pops: Vec<f64> = entries.iter().filter_map(|e| e["pop"].as_f64()).collect();

    let mut tally: HashMap<Conditions, usize> = HashMap::new();
    for entry in entries {
        if let Some(c) = entry["weather"][0]["main"]
            .as_str()
            .and_then(Conditions::from_description)
        {
            *tally.entry(c).or_default() += 1;
        }
    }
    // Most frequent wins; ties go to the better condition.
    let conditions = tally
        .into_iter()
        .max_by(|(ca, na), (cb, nb)| na.cmp(nb).then(ca.bonus().total_cmp(&cb.bonus())))
        .map(|(c, _)| c);

    WeatherSummary {
        avg_temp_c: mean(&temps),
        precipitation_chance: mean(&pops),
        conditions,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[async_trait]
impl WeatherLookup for OpenWeather {
    async fn lookup(&self, query: &WeatherQuery) -> ToolOutput<WeatherSummary> {
        recover(TOOL, self.fetch(query).await, || MockWeather::summary(query))
    }
}
