pub mod http_store;
pub mod memory_store;

use async_trait::async_trait;

use crate::errors::MessagingError;
use crate::models::{Message, MessageId, NewMessage};

pub use http_store::HttpMessageStore;
pub use memory_store::InMemoryMessageStore;

/// Backend holding the messages. Each call is a single request: no retries,
/// no caching.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Creates a message and returns it as confirmed by the backend.
    async fn send(&self, message: &NewMessage) -> Result<Message, MessagingError>;

    /// Every message the user sent or received, in backend order.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Message>, MessagingError>;

    /// Messages between exactly these two users, unsorted.
    async fn list_conversation(
        &self,
        user_id: &str,
        counterpart_id: &str,
    ) -> Result<Vec<Message>, MessagingError>;

    async fn update(&self, message_id: &MessageId, text: &str) -> Result<Message, MessagingError>;

    async fn delete(&self, message_id: &MessageId) -> Result<(), MessagingError>;
}
