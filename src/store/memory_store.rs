use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::errors::MessagingError;
use crate::models::{Message, MessageId, NewMessage};
use crate::store::MessageStore;

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<Message>,
    next_id: i64,
    offline: bool,
    failing_sends: usize,
    latency: Option<Duration>,
}

/// Process-local `MessageStore`.
///
/// Ids are `m_<n>` and timestamps advance by one second per created message,
/// which keeps ordering deterministic. Failures and latency can be injected.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    inner: Mutex<Inner>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a message as if another client had created it.
    pub fn insert(&self, message: Message) {
        self.inner.lock().messages.push(message);
    }

    /// Creates a message with the next id and timestamp, bypassing failures.
    pub fn insert_new(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
    ) -> Message {
        let mut inner = self.inner.lock();
        let message = Self::mint(&mut inner, sender_id, receiver_id, text);
        inner.messages.push(message.clone());
        message
    }

    /// Makes every call fail with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Makes the next `count` sends fail.
    pub fn fail_next_sends(&self, count: usize) {
        self.inner.lock().failing_sends = count;
    }

    /// Delays every call by `latency` (tokio time, so it honours paused clocks).
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.lock().latency = latency;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mint(inner: &mut Inner, sender_id: &str, receiver_id: &str, text: &str) -> Message {
        inner.next_id += 1;
        let created_at = Self::clock(inner.next_id);
        Message::new(
            format!("m_{}", inner.next_id),
            sender_id,
            receiver_id,
            text,
            created_at,
        )
    }

    fn clock(tick: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0)
            .single()
            .unwrap_or_default()
            + chrono::Duration::seconds(tick)
    }

    async fn enter(&self) -> Result<(), MessagingError> {
        let latency = self.inner.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.inner.lock().offline {
            return Err(MessagingError::unavailable("in-memory store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn send(&self, message: &NewMessage) -> Result<Message, MessagingError> {
        self.enter().await?;
        let mut inner = self.inner.lock();
        if inner.failing_sends > 0 {
            inner.failing_sends -= 1;
            return Err(MessagingError::unavailable("send rejected"));
        }
        let created = Self::mint(&mut inner, &message.sender_id, &message.receiver_id, &message.text);
        inner.messages.push(created.clone());
        Ok(created)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Message>, MessagingError> {
        self.enter().await?;
        Ok(self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.sender_id() == user_id || m.receiver_id() == user_id)
            .cloned()
            .collect())
    }

    async fn list_conversation(
        &self,
        user_id: &str,
        counterpart_id: &str,
    ) -> Result<Vec<Message>, MessagingError> {
        self.enter().await?;
        Ok(self
            .inner
            .lock()
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id() == user_id && m.receiver_id() == counterpart_id)
                    || (m.sender_id() == counterpart_id && m.receiver_id() == user_id)
            })
            .cloned()
            .collect())
    }

    async fn update(&self, message_id: &MessageId, text: &str) -> Result<Message, MessagingError> {
        self.enter().await?;
        let mut inner = self.inner.lock();
        let message = inner
            .messages
            .iter_mut()
            .find(|m| &m.id == message_id)
            .ok_or_else(|| MessagingError::UnexpectedStatus {
                endpoint: format!("/messages/{message_id}"),
                status: 404,
            })?;
        message.text = text.to_string();
        Ok(message.clone())
    }

    async fn delete(&self, message_id: &MessageId) -> Result<(), MessagingError> {
        self.enter().await?;
        let mut inner = self.inner.lock();
        let before = inner.messages.len();
        inner.messages.retain(|m| &m.id != message_id);
        if inner.messages.len() == before {
            return Err(MessagingError::UnexpectedStatus {
                endpoint: format!("/messages/{message_id}"),
                status: 404,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conversation_only_holds_both_parties() {
        let store = InMemoryMessageStore::new();
        store.insert_new("a", "b", "1");
        store.insert_new("b", "a", "2");
        store.insert_new("a", "c", "3");

        let between = store.list_conversation("a", "b").await.unwrap();
        assert_eq!(between.len(), 2);
        assert_eq!(store.list_for_user("a").await.unwrap().len(), 3);
        assert_eq!(store.list_for_user("c").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn injected_send_failure_is_consumed_once() {
        let store = InMemoryMessageStore::new();
        store.fail_next_sends(1);
        let new = NewMessage {
            sender_id: "a".to_string(),
            receiver_id: "b".to_string(),
            text: "hi".to_string(),
        };

        assert!(store.send(&new).await.is_err());
        let sent = store.send(&new).await.unwrap();
        assert_eq!(sent.id.as_str(), "m_1");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = InMemoryMessageStore::new();
        store.set_offline(true);
        let err = store.list_for_user("a").await.unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn minted_messages_advance_id_and_clock() {
        let store = InMemoryMessageStore::new();
        let first = store.insert_new("a", "b", "1");
        let second = store.insert_new("b", "a", "2");

        assert_eq!(first.id.as_str(), "m_1");
        assert_eq!(second.id.as_str(), "m_2");
        assert_eq!(first.created_at.timestamp(), 1_700_000_001);
        assert_eq!((second.created_at - first.created_at).num_seconds(), 1);
    }
}
