//! Financial Plan-and-Execute Agent
//!
//! A conversational financial analyst that:
//! - Decomposes each user question into an ordered plan of steps
//! - Executes one step at a time with tool access (market data, web search,
//!   document retrieval, a calculator)
//! - Replans after every step: continue with remaining work, or answer
//! - Streams progress to the front end and delivers exactly one answer
//! - Records every turn in a tamper-evident audit log
//!
//! TURN LOOP:
//! PLANNING → EXECUTING → REPLANNING → (EXECUTING | DONE)

pub mod agent;
pub mod api;
pub mod app;
pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod models;
pub mod notify;
pub mod planner;
pub mod rag;
pub mod state;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
