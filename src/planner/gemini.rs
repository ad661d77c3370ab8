//! Gemini-powered planner and replanner
//!
//! Asks Gemini for structured JSON and turns it into a [`Plan`] or a
//! [`ReplanAction`]. Shape problems are reported, never patched up.

use crate::error::OrchestrationError;
use crate::gemini::GeminiClient;
use crate::models::{Plan, ReplanAction, StepRecord};
use crate::planner::prompt::{planner_prompt, replanner_prompt, ANALYST_SYSTEM_PROMPT};
use crate::planner::{Planner, Replanner};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

pub struct GeminiPlanner {
    client: GeminiClient,
    tool_names: Vec<String>,
}

impl GeminiPlanner {
    pub fn new(client: GeminiClient, tool_names: Vec<String>) -> Self {
        Self { client, tool_names }
    }
}

#[async_trait]
impl Planner for GeminiPlanner {
    async fn create_plan(&self, objective: &str) -> Result<Plan> {
        let tools: Vec<&str> = self.tool_names.iter().map(String::as_str).collect();
        let prompt = planner_prompt(objective, &tools);

        let response = self
            .client
            .generate_json(ANALYST_SYSTEM_PROMPT, &prompt)
            .await?;

        let plan = parse_plan_response(&response)?;
        info!(step_count = plan.steps.len(), "Gemini plan created");
        Ok(plan)
    }
}

#[async_trait]
impl Replanner for GeminiPlanner {
    async fn replan(
        &self,
        objective: &str,
        plan: &[String],
        history: &[StepRecord],
    ) -> Result<ReplanAction> {
        let prompt = replanner_prompt(objective, plan, history);

        let response = self
            .client
            .generate_json(ANALYST_SYSTEM_PROMPT, &prompt)
            .await?;

        let action = exclude_completed(parse_replan_response(&response)?, history)?;
        debug!(?action, "Gemini replan decision");
        Ok(action)
    }
}

fn strip_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn string_list(value: &Value, field: &str) -> std::result::Result<Vec<String>, String> {
    let Some(items) = value.get(field) else {
        return Ok(Vec::new());
    };

    items
        .as_array()
        .ok_or_else(|| format!("'{}' is not an array", field))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| format!("'{}' contains a non-string entry", field))
        })
        .collect()
}

/// Parse planner output: `{"steps": [...], "ui_steps": [...]}`
pub fn parse_plan_response(response: &str) -> Result<Plan> {
    let json: Value = serde_json::from_str(strip_fences(response)).map_err(|e| {
        OrchestrationError::PlanningError(format!(
            "Failed to parse plan response: {} | raw={}",
            e, response
        ))
    })?;

    if json.get("steps").is_none() {
        return Err(OrchestrationError::PlanningError(
            "No steps in response".to_string(),
        ));
    }

    let steps = string_list(&json, "steps").map_err(OrchestrationError::PlanningError)?;
    let labels = match json.get("ui_labels") {
        Some(_) => string_list(&json, "ui_labels"),
        None => string_list(&json, "ui_steps"),
    }
    .map_err(OrchestrationError::PlanningError)?;

    let plan = Plan::new(steps, labels);
    plan.validate()?;
    Ok(plan)
}

/// Parse replanner output.
///
/// Accepts the action nested under `"action"` or at the top level. A
/// `"response"` (or `"answer"`) key means finish, a `"steps"` key means
/// continue.
pub fn parse_replan_response(response: &str) -> Result<ReplanAction> {
    let json: Value = serde_json::from_str(strip_fences(response)).map_err(|e| {
        OrchestrationError::ReplanError(format!(
            "Failed to parse replan response: {} | raw={}",
            e, response
        ))
    })?;

    let action = json.get("action").unwrap_or(&json);

    if let Some(answer) = action.get("response").or_else(|| action.get("answer")) {
        let answer = answer.as_str().ok_or_else(|| {
            OrchestrationError::ReplanError("Final response is not a string".to_string())
        })?;
        return Ok(ReplanAction::finish(answer));
    }

    if action.get("steps").is_some() {
        let steps = string_list(action, "steps").map_err(OrchestrationError::ReplanError)?;
        let ui_labels = match action.get("ui_labels") {
            Some(_) => string_list(action, "ui_labels"),
            None => string_list(action, "ui_steps"),
        }
        .map_err(OrchestrationError::ReplanError)?;
        return Ok(ReplanAction::Continue { steps, ui_labels });
    }

    Err(OrchestrationError::ReplanError(format!(
        "Replan response has neither a response nor steps | raw={}",
        response
    )))
}

/// Drop steps the model re-issued although history already holds them.
///
/// Labels are kept only when they were aligned with the steps.
pub fn exclude_completed(action: ReplanAction, history: &[StepRecord]) -> Result<ReplanAction> {
    let (steps, ui_labels) = match action {
        ReplanAction::Continue { steps, ui_labels } => (steps, ui_labels),
        finish => return Ok(finish),
    };

    let done = |step: &str| history.iter().any(|r| r.task.trim() == step.trim());
    let aligned = ui_labels.len() == steps.len();
    let requested = steps.len();

    let (steps, ui_labels): (Vec<String>, Vec<String>) = if aligned {
        steps
            .into_iter()
            .zip(ui_labels)
            .filter(|(step, _)| !done(step))
            .unzip()
    } else {
        (steps.into_iter().filter(|step| !done(step)).collect(), Vec::new())
    };

    if steps.is_empty() && requested > 0 {
        return Err(OrchestrationError::ReplanError(
            "Replanner only re-issued completed steps".to_string(),
        ));
    }
    if steps.len() < requested {
        debug!(dropped = requested - steps.len(), "Dropped completed steps from replan");
    }

    Ok(ReplanAction::Continue { steps, ui_labels })
}
