// Local Expert: attractions, customs and insider tips from web search

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{sample_data_caveat, Agent, StepContext, StepOutput};
use crate::error::PlanError;
use crate::models::AgentRole;

const SYSTEM: &str = "You are a knowledgeable local guide. Give an in-depth city guide \
    tailored to the travellers' interests: key attractions, neighbourhoods, food, \
    local customs, and hidden gems. Build on the analysis you are given.";

pub struct LocalExpert;

#[async_trait]
impl Agent for LocalExpert {
    fn role(&self) -> AgentRole {
        AgentRole::LocalExpert
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, PlanError> {
        let interests = ctx.request.interests.trim();
        let query = if interests.is_empty() {
            format!("{} travel guide things to do", ctx.destination)
        } else {
            format!("{} {}", ctx.destination, interests)
        };
        info!("Local expert: searching for: {}", query);

        let hits = ctx.tools.search.search(&query).await;
        ctx.record_tool(&hits, query.as_str());
        let listing = hits
            .data
            .iter()
            .map(|h| format!("- {} ({}): {}", h.title, h.link, h.snippet))
            .collect::<Vec<_>>()
            .join("\n");
        let task = format!(
            "Write a local guide for {}.\n\n{}Search results:\n{}",
            ctx.destination,
            sample_data_caveat(&hits),
            listing
        );
        let completion = ctx.ask(self.role(), SYSTEM, &task).await?;

        Ok(StepOutput {
            text: completion.text,
            data: json!({ "sources": hits.data, "is_mock": hits.is_mock }),
            usage: completion.usage,
        })
    }
}
