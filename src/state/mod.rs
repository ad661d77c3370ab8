//! Per-turn execution state and its transition rules
//!
//! The state is owned by exactly one running turn. Every mutation goes
//! through a method here so the plan/label alignment and the append-only
//! history hold at every suspension point.

use crate::error::OrchestrationError;
use crate::models::{clamp_label, derive_label, Plan, ReplanAction, StepRecord};
use crate::Result;
use serde::Serialize;
use tracing::warn;

/// What the loop does after leaving REPLANNING
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Execute,
    Finish,
}

/// The head of the plan, ready to be handed to the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextTask {
    pub task: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionState {
    objective: String,
    plan: Vec<String>,
    ui_labels: Vec<String>,
    history: Vec<StepRecord>,
    final_answer: Option<String>,
}

impl ExecutionState {
    pub fn new(objective: impl Into<String>) -> Result<Self> {
        let objective = objective.into();
        if objective.trim().is_empty() {
            return Err(OrchestrationError::PlanningError(
                "Objective must not be empty".to_string(),
            ));
        }

        Ok(Self {
            objective,
            plan: Vec::new(),
            ui_labels: Vec::new(),
            history: Vec::new(),
            final_answer: None,
        })
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    pub fn plan(&self) -> &[String] {
        &self.plan
    }

    pub fn ui_labels(&self) -> &[String] {
        &self.ui_labels
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn into_history(self) -> Vec<StepRecord> {
        self.history
    }

    /// Install the initial plan produced in PLANNING.
    pub fn apply_plan(&mut self, plan: Plan) -> Result<()> {
        plan.validate()?;

        self.ui_labels = plan
            .ui_labels
            .iter()
            .zip(&plan.steps)
            .map(|(label, step)| {
                let label = clamp_label(label);
                if label.is_empty() {
                    derive_label(step)
                } else {
                    label
                }
            })
            .collect();
        self.plan = plan.steps;

        Ok(())
    }

    pub fn next_task(&self) -> Option<NextTask> {
        let task = self.plan.first()?;
        let label = self
            .ui_labels
            .first()
            .cloned()
            .unwrap_or_else(|| derive_label(task));

        Some(NextTask {
            task: task.clone(),
            label,
        })
    }

    /// Record the result of the head task and drop it from the plan.
    ///
    /// Plan and labels shrink together, so REPLANNING only ever sees work
    /// that has not been attempted.
    pub fn complete_step(&mut self, result: String) -> Result<&StepRecord> {
        if self.final_answer.is_some() {
            return Err(OrchestrationError::ExecutionError(
                "Turn already finished".to_string(),
            ));
        }

        if self.plan.is_empty() {
            return Err(OrchestrationError::ExecutionError(
                "No task left to complete".to_string(),
            ));
        }

        if result.trim().is_empty() {
            return Err(OrchestrationError::ExecutionError(format!(
                "Step '{}' produced an empty result",
                self.plan[0]
            )));
        }

        let task = self.plan.remove(0);
        if !self.ui_labels.is_empty() {
            self.ui_labels.remove(0);
        }

        self.history.push(StepRecord { task, result });
        Ok(&self.history[self.history.len() - 1])
    }

    /// Apply the replanner's decision, then consult [`Self::should_end`].
    pub fn apply_replan(&mut self, action: ReplanAction) -> Result<Transition> {
        match action {
            ReplanAction::Finish { answer } => {
                if answer.trim().is_empty() {
                    return Err(OrchestrationError::ReplanError(
                        "Finish carried an empty answer".to_string(),
                    ));
                }

                if !self.plan.is_empty() {
                    warn!(
                        remaining_steps = self.plan.len(),
                        "Replanner finished with steps still planned; finishing"
                    );
                    self.plan.clear();
                    self.ui_labels.clear();
                }

                self.final_answer = Some(answer);
            }
            ReplanAction::Continue { steps, ui_labels } => {
                let labels_aligned = ui_labels.len() == steps.len();
                let mut plan = Vec::with_capacity(steps.len());
                let mut labels = Vec::with_capacity(steps.len());

                for (idx, step) in steps.into_iter().enumerate() {
                    if step.trim().is_empty() {
                        return Err(OrchestrationError::ReplanError(format!(
                            "Replanned step {} is blank",
                            idx + 1
                        )));
                    }

                    if self.is_completed(&step) {
                        warn!(task = %step, "Replanner re-issued a completed step; running it again");
                    }

                    let label = if labels_aligned {
                        clamp_label(&ui_labels[idx])
                    } else {
                        String::new()
                    };
                    labels.push(if label.is_empty() {
                        derive_label(&step)
                    } else {
                        label
                    });
                    plan.push(step);
                }

                if plan.is_empty() {
                    return Err(OrchestrationError::ReplanError(
                        "Continue carried no steps".to_string(),
                    ));
                }

                self.plan = plan;
                self.ui_labels = labels;
            }
        }

        self.should_end()
    }

    /// Sole authority on termination.
    pub fn should_end(&self) -> Result<Transition> {
        match self.final_answer.as_deref() {
            Some(answer) if !answer.trim().is_empty() => Ok(Transition::Finish),
            _ if !self.plan.is_empty() => Ok(Transition::Execute),
            _ => Err(OrchestrationError::ReplanError(
                "Neither a remaining plan nor a final answer".to_string(),
            )),
        }
    }

    fn is_completed(&self, task: &str) -> bool {
        let task = task.trim();
        self.history.iter().any(|record| record.task.trim() == task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn planned(steps: &[&str], labels: &[&str]) -> ExecutionState {
        let mut state = ExecutionState::new("What is AAPL's current price?").unwrap();
        state
            .apply_plan(Plan::new(strings(steps), strings(labels)))
            .unwrap();
        state
    }

    #[test]
    fn test_empty_objective_rejected() {
        assert!(matches!(
            ExecutionState::new("   "),
            Err(OrchestrationError::PlanningError(_))
        ));
    }

    #[test]
    fn test_complete_step_pops_head_symmetrically() {
        let mut state = planned(&["a", "b"], &["A", "B"]);
        let next = state.next_task().unwrap();
        assert_eq!(next.task, "a");
        assert_eq!(next.label, "A");

        state.complete_step("result a".to_string()).unwrap();

        assert_eq!(state.plan(), &strings(&["b"])[..]);
        assert_eq!(state.ui_labels(), &strings(&["B"])[..]);
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history()[0].task, "a");
    }

    #[test]
    fn test_empty_result_is_execution_error() {
        let mut state = planned(&["a"], &["A"]);
        let err = state.complete_step("  \n".to_string()).unwrap_err();
        assert!(matches!(err, OrchestrationError::ExecutionError(_)));
        assert!(state.history().is_empty());
        assert_eq!(state.plan().len(), 1);
    }

    #[test]
    fn test_long_labels_are_clamped() {
        let state = planned(&["a"], &["one two three four five six seven"]);
        assert_eq!(state.ui_labels()[0], "one two three four five");
    }

    #[test]
    fn test_finish_requires_answer() {
        let mut state = planned(&["a"], &["A"]);
        state.complete_step("done".to_string()).unwrap();

        let err = state.apply_replan(ReplanAction::finish("   ")).unwrap_err();
        assert!(matches!(err, OrchestrationError::ReplanError(_)));
        assert!(state.final_answer().is_none());
    }

    #[test]
    fn test_finish_wins_over_remaining_plan() {
        let mut state = planned(&["a", "b"], &["A", "B"]);
        state.complete_step("done".to_string()).unwrap();

        let transition = state.apply_replan(ReplanAction::finish("answer")).unwrap();
        assert_eq!(transition, Transition::Finish);
        assert!(state.plan().is_empty());
        assert!(state.ui_labels().is_empty());
        assert_eq!(state.final_answer(), Some("answer"));
    }

    #[test]
    fn test_continue_reissued_task_runs_again() {
        let mut state = planned(&["Retrieve AAPL price"], &["Price lookup"]);
        state.complete_step("$190.12".to_string()).unwrap();

        let transition = state
            .apply_replan(ReplanAction::Continue {
                steps: strings(&["Retrieve AAPL price", "Retrieve AAPL financial metrics"]),
                ui_labels: strings(&["Price lookup", "Metrics lookup"]),
            })
            .unwrap();

        assert_eq!(transition, Transition::Execute);
        assert_eq!(
            state.plan(),
            &strings(&["Retrieve AAPL price", "Retrieve AAPL financial metrics"])[..]
        );
        assert_eq!(state.ui_labels(), &strings(&["Price lookup", "Metrics lookup"])[..]);

        state.complete_step("$190.40".to_string()).unwrap();
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.history()[1].task, "Retrieve AAPL price");
    }

    #[test]
    fn test_continue_without_labels_derives_them() {
        let mut state = planned(&["a"], &["A"]);
        state.complete_step("done".to_string()).unwrap();

        state
            .apply_replan(ReplanAction::continue_with(strings(&[
                "Calculate the trailing price to earnings ratio",
            ])))
            .unwrap();

        assert_eq!(state.ui_labels(), &strings(&["Calculate the trailing price to"])[..]);
    }

    #[test]
    fn test_empty_continue_is_replan_error() {
        let mut state = planned(&["a"], &["A"]);
        state.complete_step("done".to_string()).unwrap();

        let err = state
            .apply_replan(ReplanAction::continue_with(vec![]))
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ReplanError(_)));

        let err = state
            .apply_replan(ReplanAction::continue_with(strings(&["a", "  "])))
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ReplanError(_)));
    }

    #[test]
    fn test_should_end_rejects_empty_state() {
        let mut state = planned(&["a"], &["A"]);
        assert_eq!(state.should_end().unwrap(), Transition::Execute);

        state.complete_step("done".to_string()).unwrap();
        assert!(matches!(
            state.should_end(),
            Err(OrchestrationError::ReplanError(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_history_grows_by_one_per_step(
            results in proptest::collection::vec("[a-z]{1,12}", 1..20)
        ) {
            let steps: Vec<String> = (0..results.len()).map(|i| format!("task {}", i)).collect();
            let labels: Vec<String> = (0..results.len()).map(|i| format!("label {}", i)).collect();
            let mut state = ExecutionState::new("objective").unwrap();
            state.apply_plan(Plan::new(steps.clone(), labels)).unwrap();

            for (n, result) in results.iter().enumerate() {
                prop_assert_eq!(state.plan().len(), state.ui_labels().len());
                state.complete_step(result.clone()).unwrap();
                prop_assert_eq!(state.history().len(), n + 1);
                prop_assert_eq!(&state.history()[n].task, &steps[n]);
            }

            prop_assert!(state.plan().is_empty());
            prop_assert!(state.ui_labels().is_empty());
        }

        #[test]
        fn prop_continue_keeps_labels_aligned(
            steps in proptest::collection::vec("[a-z ]{1,30}[a-z]", 1..10),
            labels in proptest::collection::vec("[a-z]{1,8}", 0..10),
        ) {
            let mut state = ExecutionState::new("objective").unwrap();
            state.apply_plan(Plan::new(vec!["seed".to_string()], vec!["Seed".to_string()])).unwrap();
            state.complete_step("ok".to_string()).unwrap();

            if state.apply_replan(ReplanAction::Continue { steps, ui_labels: labels }).is_ok() {
                prop_assert_eq!(state.plan().len(), state.ui_labels().len());
            }
        }
    }
}
