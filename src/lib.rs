//! Messaging client for the JobConnect job board.
//!
//! Builds the conversation list from a user's message feed, keeps the open
//! thread ordered while optimistic sends and background polls interleave,
//! and publishes both as `watch` views.

pub mod config;
pub mod conversation;
pub mod errors;
pub mod models;
pub mod service;
pub mod session;
pub mod store;

pub use config::ClientConfig;
pub use conversation::{aggregate_conversations, ConversationThread, ThreadPhase};
pub use errors::MessagingError;
pub use models::{
    ConversationSummary, CorrelationId, Message, MessageId, NewMessage, Participant, UserProfile,
};
pub use service::{ConversationListView, Messenger, PollHandle, ThreadView};
pub use session::{SelectedConversation, Session};
pub use store::{HttpMessageStore, InMemoryMessageStore, MessageStore};
