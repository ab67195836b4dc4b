// Destination Analyst: weather, season and fit of the destination for the trip

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{sample_data_caveat, Agent, StepContext, StepOutput};
use crate::error::PlanError;
use crate::models::{AgentRole, WeatherSummary};
use crate::tools::WeatherQuery;

const SYSTEM: &str = "You are a destination analyst. Using the weather outlook and the \
    travellers' interests, assess how well the destination suits this trip: season, \
    expected conditions, crowds, and what to pack.";

pub struct DestinationAnalyst;

fn describe_weather(weather: &WeatherSummary) -> String {
    let temp = weather
        .avg_temp_c
        .map_or_else(|| "unknown".to_string(), |t| format!("{t:.1}°C"));
    let precip = weather
        .precipitation_chance
        .map_or_else(|| "unknown".to_string(), |p| format!("{:.0}%", p * 100.0));
    let conditions = weather
        .conditions
        .map_or_else(|| "unknown".to_string(), |c| format!("{c:?}"));
    format!("Average temperature: {temp}\nChance of precipitation: {precip}\nTypical conditions: {conditions}")
}

#[async_trait]
impl Agent for DestinationAnalyst {
    fn role(&self) -> AgentRole {
        AgentRole::DestinationAnalyst
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, PlanError> {
        info!("Analyst: assessing {}", ctx.destination);

        let query = WeatherQuery::for_trip(ctx.request, ctx.destination);
        let weather = ctx.tools.weather.lookup(&query).await;
        ctx.record_tool(&weather, ctx.destination);
        let task = format!(
            "Assess {} as a destination for these dates and interests.\n\n{}Weather outlook:\n{}",
            ctx.destination,
            sample_data_caveat(&weather),
            describe_weather(&weather.data)
        );
        let completion = ctx.ask(self.role(), SYSTEM, &task).await?;

        Ok(StepOutput {
            text: completion.text,
            data: json!({ "weather": weather.data, "is_mock": weather.is_mock }),
            usage: completion.usage,
        })
    }
}
