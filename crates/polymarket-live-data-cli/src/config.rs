/*
[INPUT]:  YAML configuration file, --subscribe arguments
[OUTPUT]: Parsed runner configuration
[POS]:    Configuration layer - runner setup
[UPDATE]: When adding new configuration options
*/

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use polymarket_live_data::{ClientConfig, Subscription};

/// Top-level configuration for the runner
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Connection settings passed to the client
    #[serde(default)]
    pub client: ClientConfig,
    /// Streams to subscribe to once started
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl RunnerConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.client.validate().context("invalid client section")?;
        for subscription in &config.subscriptions {
            subscription
                .validate()
                .with_context(|| format!("invalid subscription {}", subscription.key()))?;
        }
        Ok(config)
    }
}

/// Parse `topic:type` or `topic:type:filters`; filters may contain colons.
pub fn parse_subscription(arg: &str) -> anyhow::Result<Subscription> {
    let mut parts = arg.splitn(3, ':');
    let topic = parts.next().unwrap_or_default().trim();
    let Some(message_type) = parts.next().map(str::trim) else {
        bail!("expected topic:type, got {arg:?}");
    };

    let mut subscription = Subscription::new(topic, message_type);
    if let Some(filters) = parts.next().filter(|filters| !filters.is_empty()) {
        subscription = subscription.with_filters(filters);
    }
    subscription
        .validate()
        .with_context(|| format!("invalid subscription {arg:?}"))?;
    Ok(subscription)
}
