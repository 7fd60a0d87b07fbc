//! State module for tracking run progress
//!
//! # Components
//!
//! - `RunState`: lifecycle of one pipeline pass (idle, running, completed, interrupted)
//! - `RunDelta`: outcomes accumulated in memory until the checkpoint commit

mod delta;
mod run_state;

// Re-export main types
pub use delta::RunDelta;
pub use run_state::RunState;
