use std::collections::HashSet;

use crate::models::{ConversationSummary, Message};

/// Builds one summary per counterpart from a user's full message feed.
///
/// The feed is scanned once in server order and the first message seen for
/// a counterpart wins; later messages never overwrite it. Summaries come out
/// in first-encounter order.
///
/// Note: first-wins does not guarantee the summary shows the most recent
/// message. That would need the max `created_at` per counterpart instead.
pub fn aggregate_conversations(
    current_user_id: &str,
    messages: &[Message],
) -> Vec<ConversationSummary> {
    let mut seen = HashSet::new();
    let mut summaries = Vec::new();

    for message in messages {
        let counterpart = message.counterpart_of(current_user_id);
        if !seen.insert(counterpart.id.as_str()) {
            continue;
        }
        summaries.push(ConversationSummary {
            counterpart_id: counterpart.id.clone(),
            counterpart_profile: counterpart.profile.clone(),
            last_message_text: message.text.clone(),
            last_message_at: message.created_at,
        });
    }

    summaries
}
