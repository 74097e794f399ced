//! Structured observability for council runs
//!
//! The engine and pipeline publish a `CouncilEvent` at every stage and
//! round boundary. Events are informational only: the values returned by
//! the engine and pipeline are sufficient to reconstruct any run.
//!
//! ```text
//! Pipeline ──┬─ PipelineStarted
//!            ├─ StageStarted ── ResponsesCollected ── RoundCompleted × (N-1)
//!            │                  ── ConsensusReached ── StageCompleted
//!            ├─ StageFailed (stage skipped)
//!            └─ PipelineCompleted
//! ```

pub mod bus;
pub mod types;

pub use bus::{drain, EventBus, SharedEventBus};
pub use types::CouncilEvent;
