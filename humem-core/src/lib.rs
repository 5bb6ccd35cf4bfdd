//! # humem core library
//!
//! Human-like conversational memory for chat assistants.
//!
//! Every utterance worth keeping is analyzed, routed to one of three
//! persistent tiers and checked against what is already remembered:
//!
//! - **Emotional**: charged or flagged-important statements. Never evicted.
//! - **Long-term**: durable facts about the user.
//! - **Working**: low-importance chatter that fades along an Ebbinghaus curve.
//!
//! A fixed-size short-term buffer holds the most recent turns in process.
//! New statements supersede the old ones they contradict ("我不喜欢吃苹果"
//! removes "我喜欢吃苹果"), so retrieval never surfaces both sides of a
//! changed preference.
//!
//! ## Entry point
//!
//! [`MemoryEngine`] wires the [`analyzer`], [`tiered`] store, [`conflict`]
//! pipeline and [`retrieval`] engine together. It never surfaces storage
//! errors; an engine whose store cannot be opened runs disabled.
//!
//! ## Latency contract
//!
//! - `store`: analysis and conflict scan on the caller's path, index write
//!   in the background.
//! - `retrieve`: bounded by the fan-out deadline (2 s by default).
//! - `shutdown`: drains both queues; nothing submitted before it is lost.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analyzer;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod decay;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod memory;
pub mod metrics;
pub mod retrieval;
pub mod telemetry;
pub mod tiered;
pub mod types;

pub use config::HumemConfig;
pub use engine::{
    DailySummary, MaintenanceReport, MemoryEngine, MemoryStats, SkipReason, StoreOutcome,
    Suppression,
};
pub use error::{HumemError, Result};
pub use memory::{MemoryRecord, RecordMetadata};
pub use types::*;
