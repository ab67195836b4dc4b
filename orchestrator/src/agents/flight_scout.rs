// Flight Scout: finds and summarises flight options for the trip dates

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{sample_data_caveat, Agent, StepContext, StepOutput};
use crate::error::PlanError;
use crate::models::AgentRole;
use crate::tools::{FlightOption, FlightQuery};

const SYSTEM: &str = "You are an experienced flight search specialist. You compare \
    routes, prices and layovers and recommend the most practical options for the \
    travellers. Be concise and factual.";

pub struct FlightScout;

fn format_options(options: &[FlightOption]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, o)| {
            let price = o
                .price_usd
                .map_or_else(|| "price unknown".to_string(), |p| format!("${p:.0} total"));
            let duration = o
                .duration_minutes
                .map_or_else(|| "duration unknown".to_string(), |m| format!("{}h{:02}m", m / 60, m % 60));
            format!("{}. {} - {price}, {} stop(s), {duration}", i + 1, o.carrier, o.stops)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Agent for FlightScout {
    fn role(&self) -> AgentRole {
        AgentRole::FlightScout
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, PlanError> {
        let query = FlightQuery::for_trip(ctx.request, ctx.destination);
        info!("Flight scout: searching {}", query.describe());

        let flights = ctx.tools.flights.search(&query).await;
        ctx.record_tool(&flights, query.describe());
        let task = format!(
            "Summarise the best round-trip flight options for this trip and recommend one.\n\n{}Flight options:\n{}",
            sample_data_caveat(&flights),
            format_options(&flights.data)
        );
        let completion = ctx.ask(self.role(), SYSTEM, &task).await?;

        Ok(StepOutput {
            text: completion.text,
            data: json!({ "flights": flights.data, "is_mock": flights.is_mock }),
            usage: completion.usage,
        })
    }
}
