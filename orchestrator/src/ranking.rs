//! Weather-based ranking of bucket-list destinations.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PlanError;
use crate::models::{DestinationCandidate, WeatherSummary};

/// Degrees outside the comfort band at which the temperature term reaches zero.
const TEMPERATURE_FALLOFF_C: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComfortBand {
    pub min_c: f64,
    pub max_c: f64,
}

impl Default for ComfortBand {
    fn default() -> Self {
        Self {
            min_c: 18.0,
            max_c: 28.0,
        }
    }
}

impl ComfortBand {
    /// 1.0 inside the band, falling linearly to 0.0 at `TEMPERATURE_FALLOFF_C` outside it.
    pub fn closeness(&self, temp_c: f64) -> f64 {
        let distance = if temp_c < self.min_c {
            self.min_c - temp_c
        } else if temp_c > self.max_c {
            temp_c - self.max_c
        } else {
            0.0
        };
        (1.0 - distance / TEMPERATURE_FALLOFF_C).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingWeights {
    pub temperature: f64,
    pub precipitation: f64,
    pub conditions: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            precipitation: 0.35,
            conditions: 0.25,
        }
    }
}

/// Raw weather-tool output for one bucket-list entry. `weather` is `None`
/// when the lookup itself failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RankInput {
    pub name: String,
    pub weather: Option<WeatherSummary>,
    pub is_mock: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Ranker {
    band: ComfortBand,
    weights: RankingWeights,
}

impl Ranker {
    pub fn new(band: ComfortBand) -> Self {
        Self {
            band,
            weights: RankingWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: RankingWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Suitability on a 0-10 scale, rounded to two decimals.
    pub fn score(&self, name: &str, weather: Option<&WeatherSummary>) -> Result<f64, PlanError> {
        let insufficient = || PlanError::InsufficientData(name.to_string());
        let weather = weather.ok_or_else(insufficient)?;
        let temp = weather.avg_temp_c.ok_or_else(insufficient)?;
        let precip = weather.precipitation_chance.ok_or_else(insufficient)?;
        let conditions = weather.conditions.ok_or_else(insufficient)?;

        let raw = self.weights.temperature * self.band.closeness(temp)
            + self.weights.precipitation * (1.0 - precip.clamp(0.0, 1.0))
            + self.weights.conditions * conditions.bonus();
        Ok((raw * 1000.0).round() / 100.0)
    }

    /// Orders candidates best first. Equal scores keep input order, and
    /// candidates that cannot be scored are kept but placed last.
    pub fn rank(&self, inputs: Vec<RankInput>) -> Vec<DestinationCandidate> {
        let mut scored: Vec<(Option<f64>, DestinationCandidate)> = inputs
            .into_iter()
            .map(|input| {
                let (score, reason) = match self.score(&input.name, input.weather.as_ref()) {
                    Ok(score) => (Some(score), None),
                    Err(err) => {
                        warn!(destination = %input.name, error = %err, "Ranking candidate as unscored");
                        (None, Some(err.to_string()))
                    }
                };
                let candidate = DestinationCandidate {
                    name: input.name,
                    weather: input.weather,
                    weather_is_mock: input.is_mock,
                    score,
                    rank: 0,
                    unscored: score.is_none(),
                    unscored_reason: reason,
                };
                (score, candidate)
            })
            .collect();

        // `sort_by` is stable, which is what breaks ties by input order.
        scored.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => b.total_cmp(a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (_, mut candidate))| {
                candidate.rank = i + 1;
                debug!(destination = %candidate.name, rank = candidate.rank, score = ?candidate.score, "Ranked");
                candidate
            })
            .collect()
    }
}

/// Names of the top `count` scored candidates, in rank order.
pub fn default_selection(ranked: &[DestinationCandidate], count: usize) -> Vec<String> {
    ranked
        .iter()
        .filter(|c| !c.unscored)
        .take(count)
        .map(|c| c.name.clone())
        .collect()
}
