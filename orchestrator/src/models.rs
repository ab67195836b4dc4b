use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PlanError;

pub const MAX_PASSENGERS: u32 = 9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    pub origin: String,
    /// Single destination, or the whole bucket list.
    pub destinations: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub interests: String,
    #[serde(default = "default_passengers")]
    pub passengers: u32,
}

fn default_passengers() -> u32 {
    1
}

impl TripRequest {
    /// Rejects requests before any pipeline work starts.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.origin.trim().is_empty() {
            return Err(PlanError::InvalidRequest("origin is required".into()));
        }
        if self.destinations.is_empty() {
            return Err(PlanError::InvalidRequest(
                "at least one destination is required".into(),
            ));
        }
        if self.destinations.iter().any(|d| d.trim().is_empty()) {
            return Err(PlanError::InvalidRequest(
                "destination names must not be blank".into(),
            ));
        }
        if self.end_date < self.start_date {
            return Err(PlanError::InvalidRequest(format!(
                "end date {} is before start date {}",
                self.end_date, self.start_date
            )));
        }
        if self.passengers == 0 || self.passengers > MAX_PASSENGERS {
            return Err(PlanError::InvalidRequest(format!(
                "passenger count must be between 1 and {MAX_PASSENGERS}, got {}",
                self.passengers
            )));
        }
        Ok(())
    }

    pub fn date_range(&self) -> String {
        format!("{} to {}", self.start_date, self.end_date)
    }

    pub fn nights(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conditions {
    Clear,
    PartlyCloudy,
    Cloudy,
    Foggy,
    Rainy,
    Snowy,
    Stormy,
}

impl Conditions {
    /// Ordinal desirability, 1.0 for clear skies down to 0.0 for storms.
    pub fn bonus(self) -> f64 {
        match self {
            Conditions::Clear => 1.0,
            Conditions::PartlyCloudy => 0.8,
            Conditions::Cloudy => 0.6,
            Conditions::Foggy => 0.45,
            Conditions::Rainy => 0.3,
            Conditions::Snowy => 0.2,
            Conditions::Stormy => 0.0,
        }
    }

    /// Maps provider condition groups ("Clear", "Clouds", "Rain", ...) onto the ordinal scale.
    pub fn from_description(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_lowercase();
        let conditions = if lower.contains("thunder") || lower.contains("storm") {
            Conditions::Stormy
        } else if lower.contains("snow") || lower.contains("sleet") {
            Conditions::Snowy
        } else if lower.contains("rain") || lower.contains("drizzle") || lower.contains("shower") {
            Conditions::Rainy
        } else if lower.contains("fog") || lower.contains("mist") || lower.contains("haze") {
            Conditions::Foggy
        } else if lower.contains("few") || lower.contains("scattered") || lower.contains("partly") {
            Conditions::PartlyCloudy
        } else if lower.contains("cloud") || lower.contains("overcast") {
            Conditions::Cloudy
        } else if lower.contains("clear") || lower.contains("sun") {
            Conditions::Clear
        } else {
            return None;
        };
        Some(conditions)
    }
}

/// Weather as reported by the lookup tool. Missing fields mean the provider
/// did not return them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub avg_temp_c: Option<f64>,
    pub precipitation_chance: Option<f64>,
    pub conditions: Option<Conditions>,
}

impl WeatherSummary {
    pub fn complete(avg_temp_c: f64, precipitation_chance: f64, conditions: Conditions) -> Self {
        Self {
            avg_temp_c: Some(avg_temp_c),
            precipitation_chance: Some(precipitation_chance),
            conditions: Some(conditions),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationCandidate {
    pub name: String,
    pub weather: Option<WeatherSummary>,
    pub weather_is_mock: bool,
    pub score: Option<f64>,
    /// 1-based.
    pub rank: usize,
    pub unscored: bool,
    pub unscored_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    FlightScout,
    DestinationAnalyst,
    LocalExpert,
    TravelConcierge,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::FlightScout => "flight_scout",
            AgentRole::DestinationAnalyst => "destination_analyst",
            AgentRole::LocalExpert => "local_expert",
            AgentRole::TravelConcierge => "travel_concierge",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            AgentRole::FlightScout => "Flight Options",
            AgentRole::DestinationAnalyst => "Destination Analysis",
            AgentRole::LocalExpert => "Local Insights",
            AgentRole::TravelConcierge => "Itinerary",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: AgentRole,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    pub role: AgentRole,
    /// Outputs of all prior steps, in the order they ran.
    pub input_context: Vec<ContextEntry>,
    pub output: String,
    pub data: serde_json::Value,
    /// Tools whose results in this step were mock data.
    pub mock_sources: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub destination: String,
    pub markdown: String,
    pub uses_mock_data: bool,
    pub mock_sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum PlanStatus {
    Success,
    Failed(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    pub destination: String,
    pub steps: Vec<AgentStep>,
    pub itinerary: Option<Itinerary>,
    pub status: PlanStatus,
    pub elapsed_ms: u64,
}

impl PlanResult {
    /// Derives the status from the steps: any failed step makes the plan failed.
    pub fn finalize(
        destination: impl Into<String>,
        steps: Vec<AgentStep>,
        itinerary: Option<Itinerary>,
        elapsed_ms: u64,
    ) -> Self {
        let failure = steps
            .iter()
            .find(|s| !s.success)
            .map(|s| s.error.clone().unwrap_or_else(|| format!("{} failed", s.role)));
        let status = match (failure, &itinerary) {
            (Some(reason), _) => PlanStatus::Failed(reason),
            (None, Some(_)) => PlanStatus::Success,
            (None, None) => PlanStatus::Failed("no itinerary produced".into()),
        };
        Self {
            destination: destination.into(),
            steps,
            itinerary,
            status,
            elapsed_ms,
        }
    }

    pub fn skipped(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            steps: Vec::new(),
            itinerary: None,
            status: PlanStatus::Skipped,
            elapsed_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PlanStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BatchState {
    Pending,
    Running { index: usize },
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchCounters {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// One coordinator run. `results` is append-only and mirrors the order of
/// `destinations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    pub id: Uuid,
    pub request: TripRequest,
    pub destinations: Vec<String>,
    pub results: Vec<PlanResult>,
    pub counters: BatchCounters,
    pub state: BatchState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchRun {
    pub fn new(request: TripRequest, destinations: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            destinations,
            results: Vec::new(),
            counters: BatchCounters::default(),
            state: BatchState::Pending,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// The next unprocessed destination, if the run is still open.
    pub fn next_destination(&self) -> Option<(usize, String)> {
        if self.is_finished() {
            return None;
        }
        let index = self.results.len();
        self.destinations.get(index).map(|d| (index, d.clone()))
    }

    pub fn begin(&mut self, index: usize) {
        self.state = BatchState::Running { index };
    }

    pub fn record(&mut self, result: PlanResult) {
        match result.status {
            PlanStatus::Success => self.counters.succeeded += 1,
            PlanStatus::Failed(_) => self.counters.failed += 1,
            PlanStatus::Skipped => self.counters.skipped += 1,
        }
        self.results.push(result);
    }

    pub fn complete(&mut self) {
        self.state = BatchState::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Marks every unprocessed destination as skipped and closes the run.
    pub fn cancel(&mut self) {
        let remaining: Vec<String> = self.destinations[self.results.len()..].to_vec();
        for destination in remaining {
            self.record(PlanResult::skipped(destination));
        }
        self.state = BatchState::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, BatchState::Completed | BatchState::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub run_id: Uuid,
    /// 1-based position of the destination being planned.
    pub index: usize,
    pub total: usize,
    pub destination: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    All,
    Selected {
        destinations: Vec<String>,
    },
    Recommended {
        #[serde(default = "default_recommended")]
        count: usize,
    },
}

pub const DEFAULT_SELECTION_SIZE: usize = 3;

fn default_recommended() -> usize {
    DEFAULT_SELECTION_SIZE
}

impl SelectionMode {
    pub fn label(&self) -> &'static str {
        match self {
            SelectionMode::All => "all",
            SelectionMode::Selected { .. } => "selected",
            SelectionMode::Recommended { .. } => "recommended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    AgentStart,
    AgentEnd,
    ToolCall,
    BatchProgress,
    Error,
    TripRequest,
    WeatherAnalysis,
    DestinationSelection,
    BatchComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub kind: EventKind,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl TelemetryEvent {
    pub fn new(kind: EventKind, run_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            kind,
            run_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

// API Request/Response models
#[derive(Debug, Deserialize)]
pub struct RankRequest {
    pub trip: TripRequest,
}

#[derive(Debug, Serialize)]
pub struct RankResponse {
    pub candidates: Vec<DestinationCandidate>,
    pub default_selection: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub trip: TripRequest,
    #[serde(default)]
    pub mode: SelectionMode,
}

#[derive(Debug, Serialize)]
pub struct BatchAccepted {
    pub run_id: Uuid,
    pub destinations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::trip;

    #[test]
    fn validate_accepts_well_formed_request() {
        assert!(trip(&["Bali, Indonesia"]).validate().is_ok());
    }

    #[test]
    fn validate_rejects_reversed_dates() {
        let mut request = trip(&["Bali, Indonesia"]);
        request.end_date = NaiveDate::from_ymd_opt(2027, 1, 1).unwrap();
        assert!(matches!(request.validate(), Err(PlanError::InvalidRequest(_))));
    }

    #[test]
    fn validate_rejects_passenger_bounds() {
        let mut request = trip(&["Bali, Indonesia"]);
        request.passengers = 0;
        assert!(request.validate().is_err());
        request.passengers = MAX_PASSENGERS + 1;
        assert!(request.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_destination() {
        assert!(trip(&["Tokyo, Japan", "  "]).validate().is_err());
        assert!(trip(&[]).validate().is_err());
    }

    #[test]
    fn same_day_trip_is_valid() {
        let mut request = trip(&["Tokyo, Japan"]);
        request.end_date = request.start_date;
        assert!(request.validate().is_ok());
        assert_eq!(request.nights(), 0);
    }

    #[test]
    fn conditions_parse_provider_groups() {
        assert_eq!(Conditions::from_description("Clear"), Some(Conditions::Clear));
        assert_eq!(Conditions::from_description("Clouds"), Some(Conditions::Cloudy));
        assert_eq!(Conditions::from_description("few clouds"), Some(Conditions::PartlyCloudy));
        assert_eq!(Conditions::from_description("Drizzle"), Some(Conditions::Rainy));
        assert_eq!(Conditions::from_description("Thunderstorm"), Some(Conditions::Stormy));
        assert_eq!(Conditions::from_description("Mist"), Some(Conditions::Foggy));
        assert_eq!(Conditions::from_description("volcanic ash"), None);
        assert!(Conditions::Clear.bonus() > Conditions::Cloudy.bonus());
        assert!(Conditions::Cloudy.bonus() > Conditions::Rainy.bonus());
    }

    #[test]
    fn cancel_marks_rest_skipped() {
        let mut run = BatchRun::new(trip(&["A", "B", "C"]), vec!["A".into(), "B".into(), "C".into()]);
        run.begin(0);
        run.record(PlanResult::finalize("A", vec![], None, 5));
        run.cancel();

        assert_eq!(run.state, BatchState::Cancelled);
        assert_eq!(run.results.len(), 3);
        assert_eq!(run.counters, BatchCounters { succeeded: 0, failed: 1, skipped: 2 });
        assert_eq!(run.results[2].destination, "C");
        assert!(run.next_destination().is_none());
    }

    #[test]
    fn event_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&EventKind::BatchProgress).unwrap();
        assert_eq!(json, "\"batch-progress\"");
    }

    #[test]
    fn selection_mode_defaults_recommended_count() {
        let mode: SelectionMode = serde_json::from_str(r#"{"mode":"recommended"}"#).unwrap();
        assert_eq!(mode, SelectionMode::Recommended { count: 3 });
    }

    #[test]
    fn batch_request_without_mode_plans_everything() {
        let request: BatchRequest = serde_json::from_str(
            r#"{"trip":{"origin":"SFO","destinations":["Bali"],"start_date":"2027-01-10","end_date":"2027-01-12"}}"#,
        )
        .unwrap();
        assert_eq!(request.mode, SelectionMode::All);
        assert_eq!(SelectionMode::default().label(), "all");
    }
}
