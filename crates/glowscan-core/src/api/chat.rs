use tracing::debug;

use super::{ApiClient, ApiError};
use crate::models::{ChatReply, ChatRequest};

/// Client for the skincare chat bot.
#[derive(Clone)]
pub struct ChatClient {
    api: ApiClient,
}

impl ChatClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn send(&self, message: &str) -> Result<ChatReply, ApiError> {
        let url = self.api.endpoints().chat("/chat");
        let reply: ChatReply = self
            .api
            .json(self.api.post(&url).json(&ChatRequest { message }))
            .await?;
        debug!(intent = ?reply.intent, "Chat reply received");
        Ok(reply)
    }
}
