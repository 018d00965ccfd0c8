//! zulipbridge configuration loader.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zb_api::ZulipClient;
use zb_bridge::{ChannelInfo, PollTimings, ZulipSettings};

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub zulip: ZulipConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZulipConfig {
    /// Server root, e.g. `https://chat.example.com`.
    #[serde(default)]
    pub server: String,
    /// Bot login email. Messages sent from it are never relayed back.
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub token: String,
    /// Topic for channels joined without one.
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default = "default_account")]
    pub account: String,
    /// Attachments above this many bytes are announced instead of linked.
    #[serde(default)]
    pub media_max_size: Option<u64>,
}

fn default_account() -> String {
    "zulip".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_unavailable_ms")]
    pub unavailable_ms: u64,
    #[serde(default = "default_recover_ms")]
    pub recover_ms: u64,
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    /// HTTP timeout for every Zulip request, long-polls included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backoff_ms() -> u64 {
    5_000
}

fn default_unavailable_ms() -> u64 {
    10_000
}

fn default_recover_ms() -> u64 {
    10_000
}

fn default_idle_ms() -> u64 {
    3_000
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            backoff_ms: default_backoff_ms(),
            unavailable_ms: default_unavailable_ms(),
            recover_ms: default_recover_ms(),
            idle_ms: default_idle_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub topic: String,
}

impl BridgeConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::load_with_path(path).await?.0)
    }

    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let path = path.unwrap_or_else(default_config_path);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;

        let mut cfg = Self::parse(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok((cfg, path))
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ZULIP_SERVER") {
            if !v.trim().is_empty() {
                self.zulip.server = v;
            }
        }
        if let Ok(v) = std::env::var("ZULIP_LOGIN") {
            if !v.trim().is_empty() {
                self.zulip.login = v;
            }
        }
        if let Ok(v) = std::env::var("ZULIP_TOKEN") {
            if !v.trim().is_empty() {
                self.zulip.token = v;
            }
        }
        if let Ok(v) = std::env::var("ZULIP_TOPIC") {
            if !v.trim().is_empty() {
                self.zulip.topic = Some(v);
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let server = self.zulip.server.trim();
        if server.is_empty() {
            return Err(anyhow::anyhow!("zulip.server is required"));
        }
        if !server.starts_with("http://") && !server.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "zulip.server must start with http:// or https://"
            ));
        }
        if self.zulip.login.trim().is_empty() {
            return Err(anyhow::anyhow!("zulip.login is required"));
        }
        if self.zulip.token.trim().is_empty() {
            return Err(anyhow::anyhow!("zulip.token is required"));
        }
        if self.zulip.account.trim().is_empty() {
            return Err(anyhow::anyhow!("zulip.account must not be empty"));
        }
        let poll = &self.poll;
        if [poll.backoff_ms, poll.unavailable_ms, poll.recover_ms, poll.idle_ms].contains(&0) {
            return Err(anyhow::anyhow!("poll intervals must be > 0"));
        }
        if poll.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("poll.request_timeout_secs must be > 0"));
        }
        if let Some(channel) = self.channels.iter().find(|c| c.name.trim().is_empty()) {
            return Err(anyhow::anyhow!(
                "channels entry with topic {:?} has no name",
                channel.topic
            ));
        }
        Ok(())
    }

    pub fn timings(&self) -> PollTimings {
        PollTimings {
            backoff: Duration::from_millis(self.poll.backoff_ms),
            unavailable: Duration::from_millis(self.poll.unavailable_ms),
            recover: Duration::from_millis(self.poll.recover_ms),
            idle: Duration::from_millis(self.poll.idle_ms),
        }
    }

    pub fn settings(&self) -> ZulipSettings {
        ZulipSettings::new(&self.zulip.login, &format!("zulip.{}", self.zulip.account))
            .with_default_topic(self.zulip.topic.clone())
            .with_timings(self.timings())
    }

    pub fn client(&self) -> anyhow::Result<ZulipClient> {
        let client = ZulipClient::new(&self.zulip.server, &self.zulip.login, &self.zulip.token)?
            .with_timeout(Duration::from_secs(self.poll.request_timeout_secs))?;
        Ok(client)
    }

    pub fn channel_infos(&self) -> Vec<ChannelInfo> {
        self.channels
            .iter()
            .map(|channel| ChannelInfo {
                name: channel.name.trim().to_string(),
                topic: channel.topic.clone(),
            })
            .collect()
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".zulipbridge").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::BridgeConfig;
    use std::time::Duration;

    const FULL: &str = r#"
[zulip]
server = "https://chat.example.com"
login = "relay-bot@chat.example.com"
token = "secret"
topic = "bridge"
account = "work"
media_max_size = 1000000

[poll]
idle_ms = 500

[[channels]]
name = "general"
topic = "standup"

[[channels]]
name = "ops"
"#;

    #[test]
    fn parses_full_config_with_defaults() {
        let cfg = BridgeConfig::parse(FULL).expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.zulip.account, "work");
        assert_eq!(cfg.zulip.media_max_size, Some(1_000_000));
        assert_eq!(cfg.poll.backoff_ms, 5_000);
        assert_eq!(cfg.channels.len(), 2);
        assert_eq!(cfg.channels[1].topic, "");

        let timings = cfg.timings();
        assert_eq!(timings.idle, Duration::from_millis(500));
        assert_eq!(timings.recover, Duration::from_secs(10));

        let settings = cfg.settings();
        assert_eq!(settings.account, "zulip.work");
        assert_eq!(settings.default_topic.as_deref(), Some("bridge"));
    }

    #[test]
    fn account_defaults_to_zulip() {
        let cfg = BridgeConfig::parse(
            "[zulip]\nserver = \"https://chat.example.com\"\nlogin = \"bot@x\"\ntoken = \"t\"\n",
        )
        .expect("parse");
        assert_eq!(cfg.zulip.account, "zulip");
        assert!(cfg.channels.is_empty());
    }

    #[test]
    fn validation_rejects_missing_credentials_and_bad_urls() {
        let mut cfg = BridgeConfig::parse(FULL).expect("parse");
        cfg.zulip.token = " ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::parse(FULL).expect("parse");
        cfg.zulip.server = "chat.example.com".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::parse(FULL).expect("parse");
        cfg.poll.idle_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = BridgeConfig::parse(FULL).expect("parse");
        cfg.channels[0].name = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn client_uses_api_v1_base() {
        let cfg = BridgeConfig::parse(FULL).expect("parse");
        let client = cfg.client().expect("client");
        assert_eq!(client.base_url(), "https://chat.example.com/api/v1/");
    }
}
