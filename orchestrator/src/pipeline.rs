//! Runs the agent chain for a single destination.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agents::{default_chain, Agent, StepContext};
use crate::error::PlanError;
use crate::llm::LanguageModel;
use crate::metrics;
use crate::models::{AgentStep, ContextEntry, EventKind, Itinerary, PlanResult, TelemetryEvent, TripRequest};
use crate::telemetry::TelemetrySink;
use crate::tools::Toolbox;

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

pub struct PipelineExecutor {
    agents: Vec<Box<dyn Agent>>,
    llm: Arc<dyn LanguageModel>,
    tools: Toolbox,
    telemetry: Arc<TelemetrySink>,
    step_timeout: Duration,
}

impl PipelineExecutor {
    pub fn new(llm: Arc<dyn LanguageModel>, tools: Toolbox, telemetry: Arc<TelemetrySink>) -> Self {
        Self {
            agents: default_chain(),
            llm,
            tools,
            telemetry,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn tools(&self) -> &Toolbox {
        &self.tools
    }

    pub fn telemetry(&self) -> &Arc<TelemetrySink> {
        &self.telemetry
    }

    /// Plans one destination under a fresh run id.
    pub async fn run_pipeline(&self, request: &TripRequest, destination: &str) -> PlanResult {
        self.run(Uuid::new_v4(), request, destination).await
    }

    /// Runs every role in order. The first failed step ends the chain, since
    /// later roles depend on its output.
    #[instrument(skip(self, request))]
    pub async fn run(&self, run_id: Uuid, request: &TripRequest, destination: &str) -> PlanResult {
        let started = Instant::now();
        let mut steps: Vec<AgentStep> = Vec::with_capacity(self.agents.len());
        let mut context: Vec<ContextEntry> = Vec::with_capacity(self.agents.len());
        let mut mock_sources: Vec<String> = Vec::new();

        for (position, agent) in self.agents.iter().enumerate() {
            let role = agent.role();
            self.emit(EventKind::AgentStart, run_id, json!({
                "destination": destination,
                "role": role,
                "position": position,
            }))
            .await;

            let step_started = Utc::now();
            let timer = Instant::now();
            let (outcome, tool_calls) = {
                let ctx = StepContext::new(request, destination, &context, self.llm.as_ref(), &self.tools);
                let outcome = match tokio::time::timeout(self.step_timeout, agent.run(&ctx)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(PlanError::CapabilityTimeout(self.step_timeout)),
                };
                (outcome, ctx.take_tool_calls())
            };
            let elapsed = timer.elapsed();

            // Tool calls are reported whether or not the step went on to succeed.
            let mut step_mocks = Vec::new();
            for call in tool_calls {
                self.emit(EventKind::ToolCall, run_id, json!({
                    "destination": destination,
                    "role": role,
                    "tool": call.tool,
                    "query": call.query,
                    "is_mock": call.is_mock,
                }))
                .await;
                if call.is_mock {
                    step_mocks.push(call.tool.to_string());
                }
            }
            metrics::AGENT_STEP_SECONDS
                .with_label_values(&[role.as_str()])
                .observe(elapsed.as_secs_f64());

            match outcome {
                Ok(output) => {
                    metrics::AGENT_STEPS.with_label_values(&[role.as_str(), "success"]).inc();
                    for tool in &step_mocks {
                        if !mock_sources.contains(tool) {
                            mock_sources.push(tool.clone());
                        }
                    }

                    self.emit(EventKind::AgentEnd, run_id, json!({
                        "destination": destination,
                        "role": role,
                        "elapsed_ms": elapsed.as_millis() as u64,
                        "output_chars": output.text.len(),
                        "prompt_tokens": output.usage.prompt_tokens,
                        "completion_tokens": output.usage.completion_tokens,
                    }))
                    .await;

                    steps.push(AgentStep {
                        role,
                        input_context: context.clone(),
                        output: output.text.clone(),
                        data: output.data,
                        mock_sources: step_mocks,
                        started_at: step_started,
                        ended_at: Utc::now(),
                        success: true,
                        error: None,
                    });
                    context.push(ContextEntry {
                        role,
                        output: output.text,
                    });
                }
                Err(err) => {
                    metrics::AGENT_STEPS.with_label_values(&[role.as_str(), "failure"]).inc();
                    warn!(%destination, %role, error = %err, "Agent step failed, aborting pipeline");
                    self.emit(EventKind::Error, run_id, json!({
                        "destination": destination,
                        "role": role,
                        "error": err.to_string(),
                        "elapsed_ms": elapsed.as_millis() as u64,
                    }))
                    .await;

                    steps.push(AgentStep {
                        role,
                        input_context: context.clone(),
                        output: String::new(),
                        data: serde_json::Value::Null,
                        mock_sources: step_mocks,
                        started_at: step_started,
                        ended_at: Utc::now(),
                        success: false,
                        error: Some(err.to_string()),
                    });
                    break;
                }
            }
        }

        let completed = steps.len() == self.agents.len() && steps.iter().all(|s| s.success);
        let itinerary = match (completed, context.last()) {
            (true, Some(last)) => Some(render_itinerary(request, destination, &last.output, mock_sources)),
            _ => None,
        };

        let result = PlanResult::finalize(destination, steps, itinerary, started.elapsed().as_millis() as u64);
        info!(%destination, status = ?result.status, elapsed_ms = result.elapsed_ms, "Pipeline finished");
        result
    }

    async fn emit(&self, kind: EventKind, run_id: Uuid, payload: serde_json::Value) {
        self.telemetry.emit(TelemetryEvent::new(kind, run_id, payload)).await;
    }
}

/// Final artifact: trip header, the concierge's plan, and a notice whenever
/// any tool in the chain returned sample data.
fn render_itinerary(
    request: &TripRequest,
    destination: &str,
    plan: &str,
    mock_sources: Vec<String>,
) -> Itinerary {
    let mut markdown = format!(
        "# Trip Plan: {destination}\n\n\
         **Origin:** {}\n\
         **Travel Dates:** {}\n\
         **Passengers:** {}\n\
         **Interests:** {}\n\n---\n\n{}\n",
        request.origin,
        request.date_range(),
        request.passengers,
        request.interests,
        plan.trim()
    );

    if !mock_sources.is_empty() {
        markdown.push_str(&format!(
            "\n---\n\n> **Data notice:** parts of this plan are based on SAMPLE DATA because \
             live results were unavailable from: {}. Verify flights, weather and listings \
             before booking.\n",
            mock_sources.join(", ")
        ));
    }

    Itinerary {
        destination: destination.to_string(),
        markdown,
        uses_mock_data: !mock_sources.is_empty(),
        mock_sources,
    }
}
