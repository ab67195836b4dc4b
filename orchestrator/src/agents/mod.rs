//! Role-specialised agents that make up one destination's pipeline.
//!
//! Each role sees the trip, the destination and every earlier role's output
//! (in the order those roles ran). Roles may call tool adapters and fold the
//! results into their own prompt.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PlanError;
use crate::llm::{Completion, LanguageModel, Prompt, TokenUsage};
use crate::models::{AgentRole, ContextEntry, TripRequest};
use crate::tools::{ToolCallRecord, ToolOutput, Toolbox};

pub mod analyst;
pub mod concierge;
pub mod flight_scout;
pub mod local_expert;

pub use analyst::DestinationAnalyst;
pub use concierge::TravelConcierge;
pub use flight_scout::FlightScout;
pub use local_expert::LocalExpert;

pub struct StepContext<'a> {
    pub request: &'a TripRequest,
    pub destination: &'a str,
    pub prior: &'a [ContextEntry],
    pub llm: &'a dyn LanguageModel,
    pub tools: &'a Toolbox,
    tool_calls: Mutex<Vec<ToolCallRecord>>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        request: &'a TripRequest,
        destination: &'a str,
        prior: &'a [ContextEntry],
        llm: &'a dyn LanguageModel,
        tools: &'a Toolbox,
    ) -> Self {
        Self {
            request,
            destination,
            prior,
            llm,
            tools,
            tool_calls: Mutex::new(Vec::new()),
        }
    }

    /// Notes a tool call as soon as it returns, so it is reported even if
    /// the rest of the step fails.
    pub fn record_tool<T>(&self, output: &ToolOutput<T>, query: impl Into<String>) {
        self.tool_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(output.record(query));
    }

    pub fn take_tool_calls(&self) -> Vec<ToolCallRecord> {
        std::mem::take(&mut *self.tool_calls.lock().unwrap_or_else(PoisonError::into_inner))
    }
    pub fn trip_brief(&self) -> String {
        let r = self.request;
        format!(
            "Origin: {}\nDestination: {}\nTravel dates: {} ({} nights)\nPassengers: {}\nInterests: {}",
            r.origin,
            self.destination,
            r.date_range(),
            r.nights(),
            r.passengers,
            if r.interests.trim().is_empty() { "not specified" } else { r.interests.trim() },
        )
    }

    /// Prior outputs, verbatim, in insertion order.
    pub fn prior_context(&self) -> String {
        self.prior
            .iter()
            .map(|entry| format!("## {}\n{}\n", entry.role.title(), entry.output.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Calls the model with the task first, then the trip brief, then prior context.
    pub async fn ask(&self, role: AgentRole, system: &str, task: &str) -> Result<Completion, PlanError> {
        let mut user = format!("{task}\n\n# Trip\n{}", self.trip_brief());
        if !self.prior.is_empty() {
            user.push_str("\n\n# Work so far\n");
            user.push_str(&self.prior_context());
        }

        let completion = self
            .llm
            .complete(&Prompt {
                system: system.to_string(),
                user,
            })
            .await?;

        if completion.text.trim().is_empty() {
            return Err(PlanError::malformed(role.as_str(), "empty response"));
        }
        Ok(completion)
    }
}

/// Tells the model that tool data is not real so it does not present it as fact.
pub(crate) fn sample_data_caveat<T>(output: &ToolOutput<T>) -> &'static str {
    if output.is_mock {
        "NOTE: the tool data below is SAMPLE DATA, not live results. Say so explicitly \
         and do not present prices, schedules or forecasts from it as real.\n\n"
    } else {
        ""
    }
}

#[derive(Debug, Clone)]
pub struct StepOutput {
    pub text: String,
    pub data: Value,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn role(&self) -> AgentRole;

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, PlanError>;
}

/// Flights, then destination analysis, then local knowledge, then the itinerary.
pub fn default_chain() -> Vec<Box<dyn Agent>> {
    vec![
        Box::new(FlightScout),
        Box::new(DestinationAnalyst),
        Box::new(LocalExpert),
        Box::new(TravelConcierge),
    ]
}
