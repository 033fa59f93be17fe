//! Conversation turns, bounded history and the clarification state tracker.

pub mod state;
pub mod types;

pub use state::{StateTracker, REPLAYED_TURNS};
pub use types::{ConversationHistory, ConversationTurn, Role};
