use crate::conversation::ThreadPhase;
use crate::models::{ConversationSummary, Message};
use crate::session::SelectedConversation;

/// Snapshot of the conversation list, published on every relevant change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationListView {
    pub conversations: Vec<ConversationSummary>,
    pub loading: bool,
    /// Nobody is logged in; the UI should prompt for identity.
    pub identity_missing: bool,
    /// Dismissible message for a failed initial load.
    pub error: Option<String>,
}

impl ConversationListView {
    pub(crate) fn without_identity() -> Self {
        Self { identity_missing: true, ..Self::default() }
    }
}

/// Snapshot of the open thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadView {
    pub current_user_id: Option<String>,
    pub selection: Option<SelectedConversation>,
    pub phase: ThreadPhase,
    pub messages: Vec<Message>,
    /// Entries added by the last poll that found anything new.
    pub new_message_count: usize,
    pub error: Option<String>,
    /// Text of the last failed send, offered for retry.
    pub retry_text: Option<String>,
}

impl ThreadView {
    /// Whether `message` was written by the current user.
    pub fn is_mine(&self, message: &Message) -> bool {
        self.current_user_id
            .as_deref()
            .is_some_and(|me| message.is_sent_by(me))
    }
}
