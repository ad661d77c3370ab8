//! Core data models for the plan-and-execute agent

use crate::error::OrchestrationError;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Upper bound on words in a UI-facing step label
pub const MAX_LABEL_WORDS: usize = 5;

//
// ================= Plan =================
//

/// Planner output: ordered task descriptions plus index-aligned UI labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<String>,
    #[serde(default, alias = "ui_steps")]
    pub ui_labels: Vec<String>,
}

impl Plan {
    pub fn new(steps: Vec<String>, ui_labels: Vec<String>) -> Self {
        Self { steps, ui_labels }
    }

    /// Reject plans whose shape the loop cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(OrchestrationError::PlanningError(
                "Plan contains no steps".to_string(),
            ));
        }

        if let Some(idx) = self.steps.iter().position(|s| s.trim().is_empty()) {
            return Err(OrchestrationError::PlanningError(format!(
                "Plan step {} is blank",
                idx + 1
            )));
        }

        if self.ui_labels.len() != self.steps.len() {
            return Err(OrchestrationError::PlanningError(format!(
                "Plan has {} steps but {} UI labels",
                self.steps.len(),
                self.ui_labels.len()
            )));
        }

        Ok(())
    }

    /// Numbered rendering used for progress output and prompts
    pub fn render_numbered(&self) -> String {
        render_numbered(&self.steps)
    }
}

/// "1. first\n2. second"
pub fn render_numbered(steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(idx, step)| format!("{}. {}", idx + 1, step))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Clamp a label to [`MAX_LABEL_WORDS`] words.
pub fn clamp_label(label: &str) -> String {
    label
        .split_whitespace()
        .take(MAX_LABEL_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Label for a task that arrived without one.
pub fn derive_label(task: &str) -> String {
    let label = clamp_label(task);
    if label.is_empty() {
        "Executing step".to_string()
    } else {
        label
    }
}

//
// ================= Replan =================
//

/// Replanner output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplanAction {
    /// Remaining work only; completed steps are excluded.
    Continue {
        steps: Vec<String>,
        #[serde(default, alias = "ui_steps")]
        ui_labels: Vec<String>,
    },
    /// Terminal answer for the user.
    Finish { answer: String },
}

impl ReplanAction {
    pub fn continue_with(steps: Vec<String>) -> Self {
        ReplanAction::Continue {
            steps,
            ui_labels: Vec::new(),
        }
    }

    pub fn finish(answer: impl Into<String>) -> Self {
        ReplanAction::Finish {
            answer: answer.into(),
        }
    }
}

//
// ================= History =================
//

/// One completed step: the task that ran and what it produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepRecord {
    pub task: String,
    pub result: String,
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.task, self.result)
    }
}

/// "task: result" lines, or "None yet" before the first step completes.
pub fn render_history(history: &[StepRecord]) -> String {
    if history.is_empty() {
        return "None yet".to_string();
    }

    history
        .iter()
        .map(|record| record.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

//
// ================= Turn Result =================
//

/// What a successful turn hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub answer: String,
    pub history: Vec<StepRecord>,
    pub iterations: u32,
    pub execution_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plan_validation() {
        let plan = Plan::new(strings(&["Retrieve AAPL price"]), strings(&["Price lookup"]));
        assert!(plan.validate().is_ok());

        let empty = Plan::new(vec![], vec![]);
        assert!(matches!(
            empty.validate(),
            Err(OrchestrationError::PlanningError(_))
        ));

        let misaligned = Plan::new(strings(&["a", "b"]), strings(&["A"]));
        assert!(matches!(
            misaligned.validate(),
            Err(OrchestrationError::PlanningError(_))
        ));

        let blank = Plan::new(strings(&["a", "  "]), strings(&["A", "B"]));
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_plan_accepts_ui_steps_alias() {
        let plan: Plan = serde_json::from_str(
            r#"{"steps": ["Retrieve AAPL price"], "ui_steps": ["Price lookup"]}"#,
        )
        .unwrap();
        assert_eq!(plan.ui_labels, vec!["Price lookup".to_string()]);
    }

    #[test]
    fn test_render_numbered_and_history() {
        let steps = strings(&["Get price", "Compute ratio"]);
        assert_eq!(render_numbered(&steps), "1. Get price\n2. Compute ratio");

        assert_eq!(render_history(&[]), "None yet");
        let history = vec![StepRecord {
            task: "Get price".to_string(),
            result: "$190.12".to_string(),
        }];
        assert_eq!(render_history(&history), "Get price: $190.12");
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            clamp_label("Look up the latest closing price today"),
            "Look up the latest closing"
        );
        assert_eq!(derive_label("   "), "Executing step");
        assert_eq!(derive_label("Retrieve AAPL price"), "Retrieve AAPL price");
    }

    #[test]
    fn test_replan_action_serde() {
        let action: ReplanAction =
            serde_json::from_str(r#"{"type": "finish", "answer": "done"}"#).unwrap();
        assert_eq!(action, ReplanAction::finish("done"));

        let action: ReplanAction =
            serde_json::from_str(r#"{"type": "continue", "steps": ["next"]}"#).unwrap();
        assert_eq!(action, ReplanAction::continue_with(vec!["next".to_string()]));
    }
}
