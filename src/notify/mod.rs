//! Progress and answer sinks
//!
//! A turn talks to its front end through two narrow outputs: `notify` for
//! interim progress (the plan, each step result) and `deliver` for the single
//! final answer. Sinks are injected per turn so one orchestrator can serve
//! many channels.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

/// Interim progress output
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// `label` is `None` for the initial plan, the step label otherwise.
    async fn notify(&self, content: &str, label: Option<&str>) -> Result<()>;
}

/// Final answer output
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, answer: &str) -> Result<()>;
}

/// What a streaming front end sees of a turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Progress {
        label: Option<String>,
        content: String,
    },
    Answer {
        answer: String,
    },
    Failed {
        error: String,
    },
}

/// The pair of outputs handed to a turn
#[derive(Clone)]
pub struct TurnSinks {
    pub progress: Arc<dyn ProgressSink>,
    pub messages: Arc<dyn MessageSink>,
}

impl TurnSinks {
    pub fn new(progress: Arc<dyn ProgressSink>, messages: Arc<dyn MessageSink>) -> Self {
        Self { progress, messages }
    }

    /// Both outputs backed by one sink
    pub fn shared<S>(sink: Arc<S>) -> Self
    where
        S: ProgressSink + MessageSink + 'static,
    {
        Self {
            progress: sink.clone(),
            messages: sink,
        }
    }

    /// Log-only outputs
    pub fn tracing() -> Self {
        Self::shared(Arc::new(TracingSink))
    }
}

// ============================================================================
// Implementations
// ============================================================================

/// Writes progress and answers to the log
pub struct TracingSink;

#[async_trait]
impl ProgressSink for TracingSink {
    async fn notify(&self, content: &str, label: Option<&str>) -> Result<()> {
        info!(label = label.unwrap_or("plan"), %content, "Turn progress");
        Ok(())
    }
}

#[async_trait]
impl MessageSink for TracingSink {
    async fn deliver(&self, answer: &str) -> Result<()> {
        info!(%answer, "Turn answer");
        Ok(())
    }
}

/// Forwards events to a channel, e.g. an SSE stream
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TurnEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<TurnEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: TurnEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| {
            OrchestrationError::NotificationError("Event receiver dropped".to_string())
        })
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn notify(&self, content: &str, label: Option<&str>) -> Result<()> {
        self.send(TurnEvent::Progress {
            label: label.map(str::to_string),
            content: content.to_string(),
        })
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn deliver(&self, answer: &str) -> Result<()> {
        self.send(TurnEvent::Answer {
            answer: answer.to_string(),
        })
    }
}

/// Buffers events in memory
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<TurnEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<TurnEvent> {
        self.events.lock().await.clone()
    }

    /// (label, content) of every progress event
    pub async fn progress(&self) -> Vec<(Option<String>, String)> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                TurnEvent::Progress { label, content } => Some((label.clone(), content.clone())),
                _ => None,
            })
            .collect()
    }

    pub async fn answers(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                TurnEvent::Answer { answer } => Some(answer.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProgressSink for CollectingSink {
    async fn notify(&self, content: &str, label: Option<&str>) -> Result<()> {
        self.events.lock().await.push(TurnEvent::Progress {
            label: label.map(str::to_string),
            content: content.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl MessageSink for CollectingSink {
    async fn deliver(&self, answer: &str) -> Result<()> {
        self.events.lock().await.push(TurnEvent::Answer {
            answer: answer.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collecting_sink_keeps_order() {
        let sink = Arc::new(CollectingSink::new());
        let sinks = TurnSinks::shared(sink.clone());

        sinks.progress.notify("1. Get price", None).await.unwrap();
        sinks
            .progress
            .notify("$190.12", Some("Price lookup"))
            .await
            .unwrap();
        sinks.messages.deliver("AAPL is $190.12").await.unwrap();

        assert_eq!(
            sink.progress().await,
            vec![
                (None, "1. Get price".to_string()),
                (Some("Price lookup".to_string()), "$190.12".to_string()),
            ]
        );
        assert_eq!(sink.answers().await, vec!["AAPL is $190.12".to_string()]);
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);

        sink.notify("working", Some("Step")).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(TurnEvent::Progress {
                label: Some("Step".to_string()),
                content: "working".to_string()
            })
        );

        drop(rx);
        let err = sink.deliver("late").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::NotificationError(_)));
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(TurnEvent::Answer {
            answer: "done".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["answer"], "done");
    }
}
