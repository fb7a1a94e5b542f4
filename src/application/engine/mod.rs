//! Engine layer (spec §4.11): the per-tick pipeline wiring indicators,
//! regime classification, the mode dispatcher, strategy dispatch, and the
//! risk filter together. [`engine_task::EngineCore`] is the synchronous,
//! directly-testable pipeline; [`engine_task::EngineTask`] is its tokio
//! wrapper.

pub mod engine_task;

pub use engine_task::{EngineCore, EngineEvent, EngineTask, TickOutcome};
