// Travel Concierge: turns everything gathered so far into a day-by-day itinerary

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{Agent, StepContext, StepOutput};
use crate::error::PlanError;
use crate::models::AgentRole;

const SYSTEM: &str = "You are an amazing travel concierge. Produce a complete itinerary \
    with a section per day headed 'Day 1', 'Day 2', and so on. Include where to stay, \
    what to do, where to eat, what to pack and a budget breakdown. If any input was \
    marked as sample data, repeat that warning next to the affected details.";

pub struct TravelConcierge;

/// Number of lines that open a `Day N` section, ignoring markdown decoration.
pub fn count_day_headings(text: &str) -> usize {
    text.lines()
        .map(|line| line.trim_start_matches(|c: char| c == '#' || c == '*' || c.is_whitespace()))
        .filter(|line| {
            let lower = line.to_lowercase();
            lower
                .strip_prefix("day")
                .map(|rest| rest.trim_start().starts_with(|c: char| c.is_ascii_digit()))
                .unwrap_or(false)
        })
        .count()
}

#[async_trait]
impl Agent for TravelConcierge {
    fn role(&self) -> AgentRole {
        AgentRole::TravelConcierge
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutput, PlanError> {
        info!("Concierge: writing itinerary for {}", ctx.destination);

        let task = format!(
            "Expand the work so far into a full {}-day itinerary for {}.",
            ctx.request.nights().max(0) + 1,
            ctx.destination
        );
        let completion = ctx.ask(self.role(), SYSTEM, &task).await?;

        let days = count_day_headings(&completion.text);
        if days == 0 {
            return Err(PlanError::malformed(
                self.role().as_str(),
                "itinerary has no 'Day N' sections",
            ));
        }

        Ok(StepOutput {
            text: completion.text,
            data: json!({ "days": days }),
            usage: completion.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_decorated_day_headings() {
        let text = "# Plan\n## Day 1: Arrival\n**Day 2** - Temples\nday3 beach\nDaylight tips\n";
        assert_eq!(count_day_headings(text), 3);
    }

    #[test]
    fn prose_without_days_has_none() {
        assert_eq!(count_day_headings("Enjoy Tokyo! Everyday is great."), 0);
    }
}
