use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::MessagingError;
use crate::models::{CreateMessageBody, Message, MessageId, NewMessage, UpdateMessageBody, WireMessage};
use crate::store::MessageStore;

/// `MessageStore` backed by the JobConnect REST API.
#[derive(Clone)]
pub struct HttpMessageStore {
    client: Client,
    base_url: Url,
}

impl HttpMessageStore {
    pub fn new(config: &ClientConfig) -> Result<Self, MessagingError> {
        let invalid_url = || MessagingError::InvalidConfig {
            key: "JOBCONNECT_API_URL".to_string(),
            value: config.api_base_url.clone(),
        };
        let base_url = Url::parse(&config.api_base_url).map_err(|_| invalid_url())?;
        if base_url.cannot_be_a_base() {
            return Err(invalid_url());
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MessagingError::request_failed(config.api_base_url.clone(), e))?;

        Ok(Self { client, base_url })
    }

    /// Appends percent-encoded path segments to the API base.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn read_body(endpoint: &str, resp: Response) -> Result<String, MessagingError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(MessagingError::UnexpectedStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        resp.text()
            .await
            .map_err(|e| MessagingError::request_failed(endpoint, e))
    }

    fn decode_message(endpoint: &str, body: &str) -> Result<Message, MessagingError> {
        let wire: WireMessage = serde_json::from_str(body).map_err(|source| MessagingError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })?;
        Message::try_from(wire)
    }

    async fn fetch_messages(&self, url: Url) -> Result<Vec<Message>, MessagingError> {
        let endpoint = url.path().to_string();
        debug!(%endpoint, "fetching messages");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MessagingError::request_failed(&endpoint, e))?;
        let body = Self::read_body(&endpoint, resp).await?;

        // Decoded per entry; a bad document only drops itself.
        let entries: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|source| MessagingError::Decode {
                endpoint: endpoint.clone(),
                source,
            })?;

        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                let decoded = serde_json::from_value::<WireMessage>(entry)
                    .map_err(|source| MessagingError::Decode {
                        endpoint: endpoint.clone(),
                        source,
                    })
                    .and_then(Message::try_from);
                match decoded {
                    Ok(m) => Some(m),
                    Err(e) => {
                        warn!(%endpoint, "dropping malformed message: {e}");
                        None
                    }
                }
            })
            .collect())
    }
}

#[async_trait]
impl MessageStore for HttpMessageStore {
    async fn send(&self, message: &NewMessage) -> Result<Message, MessagingError> {
        let url = self.endpoint(&["messages"]);
        let endpoint = url.path().to_string();
        let body = CreateMessageBody {
            sender_id: &message.sender_id,
            receiver_id: &message.receiver_id,
            message_text: &message.text,
        };

        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MessagingError::request_failed(&endpoint, e))?;
        let body = Self::read_body(&endpoint, resp).await?;
        Self::decode_message(&endpoint, &body)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Message>, MessagingError> {
        self.fetch_messages(self.endpoint(&["messages", "user", user_id]))
            .await
    }

    async fn list_conversation(
        &self,
        user_id: &str,
        counterpart_id: &str,
    ) -> Result<Vec<Message>, MessagingError> {
        self.fetch_messages(self.endpoint(&["messages", "conversation", user_id, counterpart_id]))
            .await
    }

    async fn update(&self, message_id: &MessageId, text: &str) -> Result<Message, MessagingError> {
        let url = self.endpoint(&["messages", message_id.as_str()]);
        let endpoint = url.path().to_string();

        let resp = self
            .client
            .put(url)
            .json(&UpdateMessageBody { message_text: text })
            .send()
            .await
            .map_err(|e| MessagingError::request_failed(&endpoint, e))?;
        let body = Self::read_body(&endpoint, resp).await?;
        Self::decode_message(&endpoint, &body)
    }

    async fn delete(&self, message_id: &MessageId) -> Result<(), MessagingError> {
        let url = self.endpoint(&["messages", message_id.as_str()]);
        let endpoint = url.path().to_string();

        let resp = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| MessagingError::request_failed(&endpoint, e))?;
        Self::read_body(&endpoint, resp).await?;
        Ok(())
    }
}
