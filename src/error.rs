//! Error types for the plan-and-execute agent

use std::fmt;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Stage of the control loop an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStage {
    Planning,
    Executing,
    Replanning,
    Done,
}

impl fmt::Display for LoopStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopStage::Planning => "PLANNING",
            LoopStage::Executing => "EXECUTING",
            LoopStage::Replanning => "REPLANNING",
            LoopStage::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Loop Errors
    // =============================

    #[error("Planning error: {0}")]
    PlanningError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Replan error: {0}")]
    ReplanError(String),

    #[error("Recursion limit of {limit} iterations reached")]
    RecursionLimit { limit: u32 },

    #[error("{stage} collaborator call timed out after {timeout_ms} ms")]
    Timeout { stage: LoopStage, timeout_ms: u64 },

    #[error("Turn cancelled during {0}")]
    Cancelled(LoopStage),

    // =============================
    // Collaborator Errors
    // =============================

    #[error("Ingestion error: {0}")]
    IngestionError(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Vector store error: {0}")]
    VectorStoreError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Timeouts are the only errors a caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestrationError::Timeout { .. })
    }

    /// Fold a collaborator error into the error kind owned by `stage`.
    ///
    /// Errors that already belong to the loop taxonomy pass through untouched,
    /// so a failed turn always surfaces exactly one of them.
    pub fn stage_error(stage: LoopStage, err: OrchestrationError) -> OrchestrationError {
        use OrchestrationError::*;

        match (stage, err) {
            (_, e @ (RecursionLimit { .. } | Timeout { .. } | Cancelled(_))) => e,
            (LoopStage::Planning, e @ PlanningError(_)) => e,
            (LoopStage::Executing, e @ ExecutionError(_)) => e,
            (LoopStage::Replanning, e @ ReplanError(_)) => e,
            (LoopStage::Planning, e) => PlanningError(e.to_string()),
            (LoopStage::Executing, e) => ExecutionError(e.to_string()),
            (LoopStage::Replanning, e) => ReplanError(e.to_string()),
            (LoopStage::Done, e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_wraps_foreign_errors() {
        let err = OrchestrationError::stage_error(
            LoopStage::Planning,
            OrchestrationError::LlmError("bad gateway".to_string()),
        );
        assert!(matches!(err, OrchestrationError::PlanningError(ref m) if m.contains("bad gateway")));

        let err = OrchestrationError::stage_error(
            LoopStage::Executing,
            OrchestrationError::ToolError("quota".to_string()),
        );
        assert!(matches!(err, OrchestrationError::ExecutionError(_)));
    }

    #[test]
    fn test_stage_error_keeps_loop_errors() {
        let err = OrchestrationError::stage_error(
            LoopStage::Replanning,
            OrchestrationError::Timeout {
                stage: LoopStage::Replanning,
                timeout_ms: 10,
            },
        );
        assert!(err.is_retryable());

        let err = OrchestrationError::stage_error(
            LoopStage::Replanning,
            OrchestrationError::ReplanError("empty".to_string()),
        );
        assert_eq!(err.to_string(), "Replan error: empty");
    }
}
