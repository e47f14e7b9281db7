pub mod aggregator;
pub mod thread;

pub use aggregator::aggregate_conversations;
pub use thread::{ConversationThread, ThreadPhase};
