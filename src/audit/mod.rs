//! Turn audit trail
//!
//! Every finished turn, completed or failed, leaves a record whose context
//! hash can later be checked against the stored objective and history.

use crate::models::StepRecord;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: Uuid,
    pub objective: String,
    pub history: Vec<StepRecord>,
    pub status: TurnStatus,
    pub answer: Option<String>,
    pub error: Option<String>,
    pub iterations: u32,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
    pub context_hash: String,
}

impl TurnRecord {
    pub fn completed(
        turn_id: Uuid,
        objective: &str,
        history: Vec<StepRecord>,
        answer: &str,
        iterations: u32,
        elapsed_ms: u64,
    ) -> Self {
        Self::build(
            turn_id,
            objective,
            history,
            TurnStatus::Completed,
            Some(answer.to_string()),
            None,
            iterations,
            elapsed_ms,
        )
    }

    pub fn failed(
        turn_id: Uuid,
        objective: &str,
        history: Vec<StepRecord>,
        error: &str,
        iterations: u32,
        elapsed_ms: u64,
    ) -> Self {
        Self::build(
            turn_id,
            objective,
            history,
            TurnStatus::Failed,
            None,
            Some(error.to_string()),
            iterations,
            elapsed_ms,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        turn_id: Uuid,
        objective: &str,
        history: Vec<StepRecord>,
        status: TurnStatus,
        answer: Option<String>,
        error: Option<String>,
        iterations: u32,
        elapsed_ms: u64,
    ) -> Self {
        let context_hash = compute_context_hash(objective, &history);
        Self {
            turn_id,
            objective: objective.to_string(),
            history,
            status,
            answer,
            error,
            iterations,
            elapsed_ms,
            created_at: Utc::now(),
            context_hash,
        }
    }
}

#[derive(Default)]
struct Records {
    by_id: HashMap<Uuid, TurnRecord>,
    order: Vec<Uuid>,
}

/// Audit trail storage
#[derive(Clone, Default)]
pub struct TurnAuditLog {
    records: Arc<RwLock<Records>>,
}

impl TurnAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a turn record
    pub async fn record(&self, record: TurnRecord) -> Result<Uuid> {
        let turn_id = record.turn_id;
        let mut records = self.records.write().await;
        if records.by_id.insert(turn_id, record).is_none() {
            records.order.push(turn_id);
        }
        Ok(turn_id)
    }

    pub async fn get(&self, turn_id: Uuid) -> Result<Option<TurnRecord>> {
        let records = self.records.read().await;
        Ok(records.by_id.get(&turn_id).cloned())
    }

    /// All records, oldest first
    pub async fn list(&self) -> Result<Vec<TurnRecord>> {
        let records = self.records.read().await;
        Ok(records
            .order
            .iter()
            .filter_map(|id| records.by_id.get(id).cloned())
            .collect())
    }

    /// Verify a record's integrity via hash
    pub async fn verify_integrity(&self, turn_id: Uuid) -> Result<bool> {
        let records = self.records.read().await;

        match records.by_id.get(&turn_id) {
            Some(record) => {
                let current = compute_context_hash(&record.objective, &record.history);
                Ok(current == record.context_hash)
            }
            None => Ok(false),
        }
    }
}

/// SHA-256 over the JSON of `(objective, history)`
pub fn compute_context_hash(objective: &str, history: &[StepRecord]) -> String {
    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &(objective, history)).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
