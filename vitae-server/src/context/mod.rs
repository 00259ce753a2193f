//! Context budgeting: token counting and history pruning.

pub mod prune;
pub mod tokens;

pub use prune::prune_history;
pub use tokens::{TokenCounter, MESSAGE_OVERHEAD_TOKENS};
