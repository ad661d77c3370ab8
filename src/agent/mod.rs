//! Turn orchestrator - implements the plan/execute/replan loop
//!
//! PLANNING → EXECUTING → REPLANNING → (EXECUTING | DONE)
//!
//! Each turn owns its own [`ExecutionState`]. Collaborator calls are the only
//! suspension points; every one is raced against the turn's cancellation
//! token and, when configured, a per-call timeout that is retried once.

use crate::audit::{TurnAuditLog, TurnRecord};
use crate::config::{AgentConfig, DEFAULT_MAX_ITERATIONS};
use crate::error::{LoopStage, OrchestrationError};
use crate::execution::{StepContext, StepExecutor};
use crate::models::{render_numbered, TurnOutcome};
use crate::notify::TurnSinks;
use crate::planner::{Planner, Replanner};
use crate::state::{ExecutionState, Transition};
use crate::Result;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// EXECUTING cycles allowed per turn
    pub max_iterations: u32,
    pub collaborator_timeout: Option<Duration>,
    pub retry_on_timeout: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            collaborator_timeout: None,
            retry_on_timeout: true,
        }
    }
}

impl From<&AgentConfig> for OrchestratorConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            collaborator_timeout: config.collaborator_timeout,
            retry_on_timeout: true,
        }
    }
}

/// Main orchestrator that coordinates the loop
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn StepExecutor>,
    replanner: Arc<dyn Replanner>,
    sinks: TurnSinks,
    audit_log: Option<Arc<TurnAuditLog>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn StepExecutor>,
        replanner: Arc<dyn Replanner>,
        sinks: TurnSinks,
    ) -> Self {
        Self {
            planner,
            executor,
            replanner,
            sinks,
            audit_log: None,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_audit_log(mut self, audit_log: Arc<TurnAuditLog>) -> Self {
        self.audit_log = Some(audit_log);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one turn against the default sinks.
    pub async fn run_turn(&self, user_text: &str) -> Result<TurnOutcome> {
        self.run_turn_with(user_text, &self.sinks, CancellationToken::new())
            .await
    }

    /// Run one turn with per-session sinks and cancellation.
    ///
    /// Returns exactly one of: the final answer, or the single fatal error
    /// that ended the turn. The answer is delivered once, on success only.
    pub async fn run_turn_with(
        &self,
        user_text: &str,
        sinks: &TurnSinks,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        let turn_id = Uuid::new_v4();
        let start = Instant::now();

        info!(%turn_id, objective = %user_text, "Turn started");

        let mut state = match ExecutionState::new(user_text) {
            Ok(state) => state,
            Err(err) => {
                error!(
                    %turn_id,
                    objective = %user_text,
                    stage = %LoopStage::Planning,
                    error = %err,
                    "Turn failed"
                );
                self.audit(TurnRecord::failed(
                    turn_id,
                    user_text,
                    Vec::new(),
                    &err.to_string(),
                    0,
                    elapsed_ms(start),
                ))
                .await;
                return Err(err);
            }
        };

        let mut stage = LoopStage::Planning;
        let mut iterations = 0u32;

        let outcome = self
            .drive(&mut state, sinks, &cancel, &mut stage, &mut iterations)
            .await;

        match outcome {
            Ok(answer) => {
                if let Err(e) = sinks.messages.deliver(&answer).await {
                    warn!(%turn_id, error = %e, "Answer delivery failed");
                }

                let execution_time_ms = elapsed_ms(start);
                info!(%turn_id, iterations, execution_time_ms, "Turn completed");

                self.audit(TurnRecord::completed(
                    turn_id,
                    state.objective(),
                    state.history().to_vec(),
                    &answer,
                    iterations,
                    execution_time_ms,
                ))
                .await;

                Ok(TurnOutcome {
                    turn_id,
                    answer,
                    history: state.into_history(),
                    iterations,
                    execution_time_ms,
                    completed_at: Utc::now(),
                })
            }
            Err(err) => {
                error!(
                    %turn_id,
                    objective = %state.objective(),
                    plan = ?state.plan(),
                    history_len = state.history().len(),
                    %stage,
                    error = %err,
                    "Turn failed"
                );

                self.audit(TurnRecord::failed(
                    turn_id,
                    state.objective(),
                    state.history().to_vec(),
                    &err.to_string(),
                    iterations,
                    elapsed_ms(start),
                ))
                .await;

                Err(err)
            }
        }
    }

    /// Walk the state machine until DONE or the first fatal error.
    async fn drive(
        &self,
        state: &mut ExecutionState,
        sinks: &TurnSinks,
        cancel: &CancellationToken,
        stage: &mut LoopStage,
        iterations: &mut u32,
    ) -> Result<String> {
        // === PLANNING ===
        *stage = LoopStage::Planning;
        ensure_active(cancel, *stage)?;

        let plan = {
            let objective = state.objective();
            self.call(*stage, cancel, move || self.planner.create_plan(objective))
                .await?
        };
        state.apply_plan(plan)?;

        debug!(step_count = state.plan().len(), "Plan accepted");
        notify(sinks, &render_numbered(state.plan()), None).await;

        loop {
            // === EXECUTING ===
            *stage = LoopStage::Executing;
            if *iterations >= self.config.max_iterations {
                return Err(OrchestrationError::RecursionLimit {
                    limit: self.config.max_iterations,
                });
            }
            ensure_active(cancel, *stage)?;

            let next = state.next_task().ok_or_else(|| {
                OrchestrationError::ExecutionError("No task left to execute".to_string())
            })?;
            *iterations += 1;

            info!(step = *iterations, task = %next.task, label = %next.label, "Executing step");

            let result = {
                let ctx = StepContext {
                    objective: state.objective(),
                    plan: state.plan(),
                    history: state.history(),
                    task: &next.task,
                };
                let ctx = &ctx;
                self.call(*stage, cancel, move || self.executor.execute(ctx))
                    .await?
            };
            // a result that lands after cancellation is discarded
            ensure_active(cancel, *stage)?;

            let content = state.complete_step(result)?.result.clone();
            notify(sinks, &content, Some(&next.label)).await;

            // === REPLANNING ===
            *stage = LoopStage::Replanning;
            ensure_active(cancel, *stage)?;

            let action = {
                let (objective, plan, history) = (state.objective(), state.plan(), state.history());
                self.call(*stage, cancel, move || {
                    self.replanner.replan(objective, plan, history)
                })
                .await?
            };
            debug!(?action, "Replan decision");

            match state.apply_replan(action)? {
                Transition::Execute => continue,
                Transition::Finish => {
                    *stage = LoopStage::Done;
                    ensure_active(cancel, *stage)?;

                    return state.final_answer().map(str::to_string).ok_or_else(|| {
                        OrchestrationError::ReplanError("Finished without an answer".to_string())
                    });
                }
            }
        }
    }

    /// One collaborator call: cancellable, optionally time-bounded, a timeout
    /// retried once. Errors come back folded into the stage's error kind.
    async fn call<T, F, Fut>(
        &self,
        stage: LoopStage,
        cancel: &CancellationToken,
        mut make: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1u32;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(OrchestrationError::Cancelled(stage)),
                outcome = self.bounded(stage, make()) => outcome,
            };

            match outcome {
                Err(e) if e.is_retryable() && self.config.retry_on_timeout && attempt == 1 => {
                    warn!(%stage, error = %e, "Collaborator timed out; retrying once");
                    attempt += 1;
                }
                other => return other.map_err(|e| OrchestrationError::stage_error(stage, e)),
            }
        }
    }

    async fn bounded<T>(&self, stage: LoopStage, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.collaborator_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                OrchestrationError::Timeout {
                    stage,
                    timeout_ms: limit.as_millis() as u64,
                }
            })?,
            None => fut.await,
        }
    }

    async fn audit(&self, record: TurnRecord) {
        if let Some(log) = &self.audit_log {
            if let Err(e) = log.record(record).await {
                warn!(error = %e, "Failed to record turn");
            }
        }
    }
}

fn ensure_active(cancel: &CancellationToken, stage: LoopStage) -> Result<()> {
    if cancel.is_cancelled() {
        Err(OrchestrationError::Cancelled(stage))
    } else {
        Ok(())
    }
}

/// Progress is fire-and-forget.
async fn notify(sinks: &TurnSinks, content: &str, label: Option<&str>) {
    if let Err(e) = sinks.progress.notify(content, label).await {
        warn!(label = label.unwrap_or("plan"), error = %e, "Progress notification failed");
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
