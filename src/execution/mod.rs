//! Step execution
//!
//! A step executor turns the head task of the plan into a textual result.
//! The default implementation is a bounded function-calling loop: Gemini
//! picks tools from the registry, sees their outputs (or errors) and finally
//! answers in text.

use crate::error::OrchestrationError;
use crate::gemini::{Content, FunctionResponse, GeminiClient};
use crate::models::StepRecord;
use crate::planner::prompt::{executor_prompt, ANALYST_SYSTEM_PROMPT};
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Everything a step needs to know about the turn so far
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub objective: &'a str,
    /// Remaining plan, head first
    pub plan: &'a [String],
    pub history: &'a [StepRecord],
    pub task: &'a str,
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<String>;
}

pub struct ReactStepExecutor {
    client: GeminiClient,
    registry: Arc<ToolRegistry>,
    max_tool_rounds: u32,
}

impl ReactStepExecutor {
    pub fn new(client: GeminiClient, registry: Arc<ToolRegistry>, max_tool_rounds: u32) -> Self {
        Self {
            client,
            registry,
            max_tool_rounds: max_tool_rounds.max(1),
        }
    }

    /// Run every call of one model turn; failures go back as `{"error": ...}`.
    async fn run_calls(&self, reply: &Content) -> Vec<FunctionResponse> {
        let mut responses = Vec::new();

        for call in reply.function_calls() {
            let args = if call.args.is_null() {
                json!({})
            } else {
                call.args.clone()
            };

            let start = Instant::now();
            let response: Value = match self.registry.execute(&call.name, args).await {
                Ok(output) => json!({ "result": output.data }),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool call failed");
                    json!({ "error": e.to_string() })
                }
            };
            debug!(
                tool = %call.name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Tool call finished"
            );

            responses.push(FunctionResponse {
                name: call.name.clone(),
                response,
            });
        }

        responses
    }
}

#[async_trait]
impl StepExecutor for ReactStepExecutor {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<String> {
        let prompt = executor_prompt(ctx.objective, ctx.plan, ctx.history, ctx.task);
        let declarations = self.registry.declarations();
        let mut contents = vec![Content::user(prompt)];

        for round in 0..self.max_tool_rounds {
            let mut reply = self
                .client
                .converse(ANALYST_SYSTEM_PROMPT, &contents, &declarations)
                .await?;

            if reply.function_calls().is_empty() {
                return reply.text().ok_or_else(|| {
                    OrchestrationError::ExecutionError(format!(
                        "Executor returned no text for task '{}'",
                        ctx.task
                    ))
                });
            }

            debug!(round, calls = reply.function_calls().len(), "Executor requested tools");
            let responses = self.run_calls(&reply).await;

            reply.role.get_or_insert_with(|| "model".to_string());
            contents.push(reply);
            contents.push(Content::function_responses(responses));
        }

        Err(OrchestrationError::ExecutionError(format!(
            "Task '{}' did not finish within {} tool rounds",
            ctx.task, self.max_tool_rounds
        )))
    }
}
