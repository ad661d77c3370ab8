//! Planner and replanner traits
//!
//! Both are LLM-backed in production. The loop only relies on the shape of
//! what they return, so tests substitute deterministic stubs.

use crate::models::{Plan, ReplanAction, StepRecord};
use crate::Result;
use async_trait::async_trait;

pub mod gemini;
pub mod prompt;

pub use gemini::GeminiPlanner;

/// Trait for initial plan generation
#[async_trait]
pub trait Planner: Send + Sync {
    async fn create_plan(&self, objective: &str) -> Result<Plan>;
}

/// Trait for the after-each-step decision: keep going or answer
#[async_trait]
pub trait Replanner: Send + Sync {
    /// `plan` holds only work not yet attempted; `history` every completed step.
    async fn replan(
        &self,
        objective: &str,
        plan: &[String],
        history: &[StepRecord],
    ) -> Result<ReplanAction>;
}
