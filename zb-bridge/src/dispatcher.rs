use crate::attachments::AttachmentStaging;
use crate::error::{BridgeError, Result};
use crate::topics::TopicResolver;
use crate::types::{Edit, OutboundMessage, Post, Upload};
use serde::Deserialize;
use std::sync::Arc;
use zb_api::{OutgoingMessage, ZulipApi};

/// Turns bus messages into Zulip API calls.
pub struct OutboundDispatcher {
    api: Arc<dyn ZulipApi>,
    topics: Arc<TopicResolver>,
    staging: Arc<dyn AttachmentStaging>,
}

impl OutboundDispatcher {
    pub fn new(
        api: Arc<dyn ZulipApi>,
        topics: Arc<TopicResolver>,
        staging: Arc<dyn AttachmentStaging>,
    ) -> Self {
        Self {
            api,
            topics,
            staging,
        }
    }

    /// Returns the Zulip message id for posts and uploads, "" otherwise.
    pub async fn send(&self, message: OutboundMessage) -> Result<String> {
        match message {
            OutboundMessage::Delete { id } => self.delete(id).await,
            OutboundMessage::Upload(upload) => self.upload(upload).await,
            OutboundMessage::Edit(edit) => self.edit(edit).await,
            OutboundMessage::Post(post) => self.post(&post).await,
        }
    }

    // Deletion is modelled as clearing the message content.
    async fn delete(&self, id: Option<String>) -> Result<String> {
        let Some(id) = id else {
            return Ok(String::new());
        };
        self.api.update_message(&id, "").await?;
        Ok(String::new())
    }

    async fn edit(&self, edit: Edit) -> Result<String> {
        self.api.update_message(&edit.id, &edit.content()).await?;
        Ok(String::new())
    }

    async fn upload(&self, upload: Upload) -> Result<String> {
        let staged = self.staging.stage(&upload).await?;
        for notice in staged.notices {
            let post = self.reply(&upload, notice);
            if let Err(error) = self.post(&post).await {
                tracing::warn!(%error, channel = %upload.channel, "zulip attachment notice failed");
            }
        }

        if !upload.text.trim().is_empty() {
            self.post(&self.reply(&upload, upload.text.clone())).await?;
        }

        let mut last_id = String::new();
        for file in &staged.files {
            let Some(content) = file.compose() else {
                continue;
            };
            last_id = self.post(&self.reply(&upload, content)).await?;
        }
        Ok(last_id)
    }

    async fn post(&self, post: &Post) -> Result<String> {
        if post.channel.trim().is_empty() {
            return Err(BridgeError::InvalidMessage(
                "outbound message has no channel".to_string(),
            ));
        }
        let outgoing = OutgoingMessage {
            stream: post.channel.clone(),
            topic: self.topics.resolve(&post.channel).await,
            content: post.content(),
        };
        let body = self.api.send_message(&outgoing).await?;
        parse_message_id(&body)
    }

    fn reply(&self, upload: &Upload, text: String) -> Post {
        Post {
            channel: upload.channel.clone(),
            username: upload.username.clone(),
            text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: i64,
}

fn parse_message_id(body: &str) -> Result<String> {
    if body.trim().is_empty() {
        return Err(BridgeError::MalformedResponse(
            "zulip send returned an empty body".to_string(),
        ));
    }
    let sent: SentMessage = serde_json::from_str(body).map_err(|e| {
        BridgeError::MalformedResponse(format!("zulip send response has no message id: {e}"))
    })?;
    Ok(sent.id.to_string())
}
