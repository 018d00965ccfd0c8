use std::collections::HashMap;
use tokio::sync::RwLock;

/// Topic used when neither a channel binding nor a configured default exists.
pub const FALLBACK_TOPIC: &str = "relay";

/// Channel name -> Zulip topic bindings shared by the poll task and senders.
pub struct TopicResolver {
    default_topic: Option<String>,
    bindings: RwLock<HashMap<String, String>>,
}

impl TopicResolver {
    pub fn new(default_topic: Option<String>) -> Self {
        let default_topic = default_topic
            .map(|topic| topic.trim().to_string())
            .filter(|topic| !topic.is_empty());
        Self {
            default_topic,
            bindings: RwLock::new(HashMap::new()),
        }
    }

    pub async fn bind(&self, channel: &str, topic: &str) {
        self.bindings
            .write()
            .await
            .insert(channel.to_string(), topic.trim().to_string());
    }

    /// Bound topic, else the configured default, else "".
    pub async fn topic_for(&self, channel: &str) -> String {
        let bound = self
            .bindings
            .read()
            .await
            .get(channel)
            .filter(|topic| !topic.is_empty())
            .cloned();
        bound
            .or_else(|| self.default_topic.clone())
            .unwrap_or_default()
    }

    /// Like [`Self::topic_for`], falling back to [`FALLBACK_TOPIC`].
    pub async fn resolve(&self, channel: &str) -> String {
        let topic = self.topic_for(channel).await;
        if topic.is_empty() {
            return FALLBACK_TOPIC.to_string();
        }
        topic
    }
}
