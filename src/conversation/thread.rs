use std::collections::HashSet;

use tracing::debug;

use crate::models::{CorrelationId, Message, MessageId};

/// Lifecycle of an open conversation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadPhase {
    /// Waiting for the initial fetch.
    #[default]
    Loading,
    /// Loaded and waiting for the next poll.
    Idle,
    /// A background poll is in flight.
    Updating,
    /// The initial fetch failed; polls are skipped until a reload.
    Failed,
}

/// Ordered message history with one counterpart.
///
/// Entries are kept sorted by `created_at` ascending (stable on ties). Only
/// pending entries carry temporary ids, and no confirmed id appears twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationThread {
    messages: Vec<Message>,
    phase: ThreadPhase,
}

impl ConversationThread {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ThreadPhase {
        self.phase
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.pending).count()
    }

    /// Drops everything and goes back to `Loading`.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.phase = ThreadPhase::Loading;
    }

    /// Back to `Loading` for a reload, keeping what is shown meanwhile.
    pub fn begin_load(&mut self) {
        self.phase = ThreadPhase::Loading;
    }

    /// Installs the initial fetch, replacing confirmed entries wholesale.
    /// Pending entries from sends issued while loading are kept.
    pub fn finish_load(&mut self, fetched: Vec<Message>) {
        let pending: Vec<Message> = self.messages.drain(..).filter(|m| m.pending).collect();
        let mut seen = HashSet::new();
        self.messages = fetched
            .into_iter()
            .filter(|m| !m.id.is_temporary() && seen.insert(m.id.clone()))
            .collect();
        self.messages.extend(pending);
        self.sort();
        self.phase = ThreadPhase::Idle;
        debug!(count = self.messages.len(), "thread loaded");
    }

    pub fn fail_load(&mut self) {
        self.phase = ThreadPhase::Failed;
    }

    /// `Idle -> Updating`. Returns false when a poll should not run now.
    pub fn begin_update(&mut self) -> bool {
        if self.phase != ThreadPhase::Idle {
            return false;
        }
        self.phase = ThreadPhase::Updating;
        true
    }

    /// `Updating -> Idle` without merging anything (failed poll).
    pub fn end_update(&mut self) {
        if self.phase == ThreadPhase::Updating {
            self.phase = ThreadPhase::Idle;
        }
    }

    /// Merges a polled fetch and returns how many entries were added.
    ///
    /// A fetched message is added only if its id is neither temporary nor
    /// already held. Pending entries are never touched. When nothing is new
    /// the thread stays exactly as it was.
    pub fn merge_polled(&mut self, fetched: Vec<Message>) -> usize {
        let mut known: HashSet<MessageId> = self
            .messages
            .iter()
            .filter(|m| !m.id.is_temporary())
            .map(|m| m.id.clone())
            .collect();

        let fresh: Vec<Message> = fetched
            .into_iter()
            .filter(|m| !m.id.is_temporary() && known.insert(m.id.clone()))
            .collect();

        self.end_update();
        if fresh.is_empty() {
            return 0;
        }

        let added = fresh.len();
        self.messages.extend(fresh);
        self.sort();
        debug!(added, total = self.messages.len(), "merged polled messages");
        added
    }

    /// Appends an optimistic entry.
    pub fn push_pending(&mut self, message: Message) {
        debug_assert!(message.pending && message.id.is_temporary());
        self.messages.push(message);
        self.sort();
    }

    /// Replaces the pending entry of `correlation` with the confirmed message.
    ///
    /// If a poll already delivered the confirmed id, the pending entry is
    /// simply dropped. Returns false when no such pending entry exists.
    pub fn confirm(&mut self, correlation: &CorrelationId, confirmed: Message) -> bool {
        let temp_id = MessageId::temporary(correlation);
        let Some(index) = self.messages.iter().position(|m| m.id == temp_id) else {
            return false;
        };

        if self.messages.iter().any(|m| m.id == confirmed.id) {
            self.messages.remove(index);
            debug!(id = %confirmed.id, "confirmation already merged by poll");
            return true;
        }

        self.messages[index] = Message { pending: false, ..confirmed };
        self.sort();
        true
    }

    /// Removes the pending entry of a failed send and returns it.
    pub fn fail(&mut self, correlation: &CorrelationId) -> Option<Message> {
        let temp_id = MessageId::temporary(correlation);
        let index = self.messages.iter().position(|m| m.id == temp_id)?;
        Some(self.messages.remove(index))
    }

    /// Replaces a confirmed entry with its edited version.
    pub fn apply_edit(&mut self, edited: Message) -> bool {
        let Some(entry) = self.messages.iter_mut().find(|m| m.id == edited.id) else {
            return false;
        };
        *entry = edited;
        self.sort();
        true
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.messages.iter().position(|m| &m.id == id)?;
        Some(self.messages.remove(index))
    }

    fn sort(&mut self) {
        // `sort_by_key` is stable, so ties keep their relative order.
        self.messages.sort_by_key(|m| m.created_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn msg(id: &str, secs: i64) -> Message {
        Message::new(id, "me", "you", format!("text {id}"), at(secs))
    }

    fn ids(thread: &ConversationThread) -> Vec<&str> {
        thread.messages().iter().map(|m| m.id.as_str()).collect()
    }

    fn assert_ordered(thread: &ConversationThread) {
        assert!(thread
            .messages()
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
    }

    fn loaded(messages: Vec<Message>) -> ConversationThread {
        let mut thread = ConversationThread::new();
        thread.finish_load(messages);
        thread
    }

    #[test]
    fn load_sorts_and_replaces() {
        let mut thread = loaded(vec![msg("old", 0)]);
        thread.finish_load(vec![msg("b", 2), msg("a", 1), msg("c", 3)]);
        assert_eq!(ids(&thread), vec!["a", "b", "c"]);
        assert_eq!(thread.phase(), ThreadPhase::Idle);
    }

    #[test]
    fn load_sort_is_stable_on_ties() {
        let thread = loaded(vec![msg("x", 5), msg("y", 5), msg("w", 1), msg("z", 5)]);
        assert_eq!(ids(&thread), vec!["w", "x", "y", "z"]);
    }

    #[test]
    fn merging_the_same_poll_twice_is_idempotent() {
        let mut thread = loaded(vec![msg("a", 1)]);
        let poll = vec![msg("c", 3), msg("a", 1), msg("b", 2)];

        assert_eq!(thread.merge_polled(poll.clone()), 2);
        let once = thread.clone();
        assert_eq!(thread.merge_polled(poll), 0);

        assert_eq!(thread, once);
        assert_eq!(ids(&thread), vec!["a", "b", "c"]);
    }

    #[test]
    fn duplicate_ids_inside_one_poll_are_added_once() {
        let mut thread = loaded(vec![]);
        assert_eq!(thread.merge_polled(vec![msg("a", 1), msg("a", 1)]), 1);
        assert_eq!(ids(&thread), vec!["a"]);
    }

    #[test]
    fn poll_with_nothing_new_leaves_thread_untouched() {
        let mut thread = loaded(vec![msg("a", 1), msg("b", 2)]);
        let before = thread.clone();
        assert_eq!(thread.merge_polled(vec![msg("b", 2)]), 0);
        assert_eq!(thread, before);
    }

    #[test]
    fn pending_entry_survives_poll_with_other_message() {
        let mut thread = loaded(vec![msg("a", 1)]);
        let correlation = CorrelationId::new();
        thread.push_pending(Message::pending(&correlation, "me", "you", "hello"));

        let added = thread.merge_polled(vec![msg("a", 1), msg("m_99", 2)]);

        assert_eq!(added, 1);
        assert_eq!(thread.len(), 3);
        assert_eq!(thread.pending_count(), 1);
        assert!(thread.messages().iter().any(|m| m.id.as_str() == "m_99"));
    }

    #[test]
    fn temp_ids_in_poll_results_are_ignored() {
        let mut thread = loaded(vec![]);
        let ghost = Message::new("temp_123", "me", "you", "ghost", at(1));
        assert_eq!(thread.merge_polled(vec![ghost]), 0);
        assert!(thread.is_empty());
    }

    #[test]
    fn confirm_replaces_pending_entry() {
        let mut thread = loaded(vec![msg("a", 1)]);
        let correlation = CorrelationId::new();
        thread.push_pending(Message::pending(&correlation, "me", "you", "hello"));
        assert_eq!(thread.pending_count(), 1);

        let confirmed = Message::new("m_55", "me", "you", "hello", Utc::now());
        assert!(thread.confirm(&correlation, confirmed));

        let hellos: Vec<_> = thread.messages().iter().filter(|m| m.text == "hello").collect();
        assert_eq!(hellos.len(), 1);
        assert_eq!(hellos[0].id.as_str(), "m_55");
        assert!(!hellos[0].pending);
        assert_eq!(thread.pending_count(), 0);
        assert_ordered(&thread);
    }

    #[test]
    fn confirm_after_poll_delivered_same_message_leaves_one_copy() {
        let mut thread = loaded(vec![]);
        let correlation = CorrelationId::new();
        thread.push_pending(Message::pending(&correlation, "me", "you", "hello"));

        let confirmed = Message::new("m_55", "me", "you", "hello", Utc::now());
        assert_eq!(thread.merge_polled(vec![confirmed.clone()]), 1);
        assert_eq!(thread.len(), 2);

        assert!(thread.confirm(&correlation, confirmed));
        assert_eq!(ids(&thread), vec!["m_55"]);
    }

    #[test]
    fn concurrent_sends_confirm_by_correlation() {
        let mut thread = loaded(vec![]);
        let first = CorrelationId::new();
        let second = CorrelationId::new();
        thread.push_pending(Message::pending(&first, "me", "you", "one"));
        thread.push_pending(Message::pending(&second, "me", "you", "two"));
        assert_eq!(thread.pending_count(), 2);

        // Second send is confirmed before the first one.
        assert!(thread.confirm(&second, Message::new("m_2", "me", "you", "two", at(20))));
        let still_pending: Vec<_> = thread.messages().iter().filter(|m| m.pending).collect();
        assert_eq!(still_pending.len(), 1);
        assert_eq!(still_pending[0].text, "one");

        assert!(thread.confirm(&first, Message::new("m_1", "me", "you", "one", at(10))));
        assert_eq!(ids(&thread), vec!["m_1", "m_2"]);
    }

    #[test]
    fn failed_send_removes_only_its_entry() {
        let mut thread = loaded(vec![msg("a", 1)]);
        let ok = CorrelationId::new();
        let broken = CorrelationId::new();
        thread.push_pending(Message::pending(&ok, "me", "you", "fine"));
        thread.push_pending(Message::pending(&broken, "me", "you", "doomed"));

        let removed = thread.fail(&broken).unwrap();

        assert_eq!(removed.text, "doomed");
        assert_eq!(thread.len(), 2);
        assert_eq!(thread.pending_count(), 1);
        assert!(thread.fail(&broken).is_none());
    }

    #[test]
    fn confirm_for_unknown_correlation_is_ignored() {
        let mut thread = loaded(vec![msg("a", 1)]);
        let before = thread.clone();
        assert!(!thread.confirm(&CorrelationId::new(), msg("m_1", 2)));
        assert_eq!(thread, before);
    }

    #[test]
    fn order_holds_after_every_mutation() {
        let mut thread = loaded(vec![msg("c", 30), msg("a", 10)]);
        assert_ordered(&thread);
        thread.merge_polled(vec![msg("b", 20), msg("d", 5)]);
        assert_ordered(&thread);
        let correlation = CorrelationId::new();
        thread.push_pending(Message::pending(&correlation, "me", "you", "p"));
        assert_ordered(&thread);
        thread.confirm(&correlation, msg("e", 15));
        assert_ordered(&thread);
        thread.apply_edit(Message::new("b", "me", "you", "edited", at(20)));
        assert_ordered(&thread);
        assert_eq!(ids(&thread), vec!["d", "a", "e", "b", "c"]);
    }

    #[test]
    fn load_keeps_pending_entries() {
        let mut thread = ConversationThread::new();
        let correlation = CorrelationId::new();
        thread.push_pending(Message::pending(&correlation, "me", "you", "early"));

        thread.finish_load(vec![msg("a", 1)]);

        assert_eq!(thread.len(), 2);
        assert_eq!(thread.pending_count(), 1);
    }

    #[test]
    fn polls_only_start_from_idle() {
        let mut thread = ConversationThread::new();
        assert!(!thread.begin_update());
        thread.fail_load();
        assert!(!thread.begin_update());
        thread.finish_load(vec![]);
        assert!(thread.begin_update());
        assert_eq!(thread.phase(), ThreadPhase::Updating);
        assert!(!thread.begin_update());
        thread.end_update();
        assert_eq!(thread.phase(), ThreadPhase::Idle);
    }

    #[test]
    fn remove_and_edit() {
        let mut thread = loaded(vec![msg("a", 1), msg("b", 2)]);
        assert!(thread.apply_edit(Message::new("a", "me", "you", "changed", at(1))));
        assert_eq!(thread.messages()[0].text, "changed");
        assert!(!thread.apply_edit(msg("zzz", 3)));
        assert_eq!(thread.remove(&MessageId::new("b")).unwrap().id.as_str(), "b");
        assert_eq!(ids(&thread), vec!["a"]);
    }
}
