use serde::{Deserialize, Serialize};

use crate::channel::ChannelFlavor;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Number of connection slots (the QP pool size N).
    pub num_connections: usize,
    /// Per-stream forwarding budget of one engine step.
    #[serde(default = "default_step_burst")]
    pub step_burst: usize,
    /// Whether the datapath channels are thread-safe or single-runtime.
    #[serde(default = "default_flavor")]
    pub channel_flavor: Flavor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Concurrent,
    Sequential,
}

impl From<Flavor> for ChannelFlavor {
    fn from(f: Flavor) -> Self {
        match f {
            Flavor::Concurrent => ChannelFlavor::Concurrent,
            Flavor::Sequential => ChannelFlavor::Sequential,
        }
    }
}

impl TransportConfig {
    pub fn new(config: Option<&str>) -> Result<Self, toml::de::Error> {
        toml::from_str(config.unwrap_or(""))
    }

    pub fn with_connections(num_connections: usize) -> Self {
        TransportConfig {
            num_connections,
            step_burst: default_step_burst(),
            channel_flavor: default_flavor(),
        }
    }
}

fn default_step_burst() -> usize {
    32
}

fn default_flavor() -> Flavor {
    Flavor::Concurrent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config = TransportConfig::new(Some("num_connections = 8")).unwrap();
        assert_eq!(config.num_connections, 8);
        assert_eq!(config.step_burst, 32);
        assert_eq!(config.channel_flavor, Flavor::Concurrent);
    }

    #[test]
    fn parses_full_config() {
        let config = TransportConfig::new(Some(
            r#"
            num_connections = 4
            step_burst = 16
            channel_flavor = "sequential"
            "#,
        ))
        .unwrap();
        assert_eq!(config.num_connections, 4);
        assert_eq!(config.step_burst, 16);
        assert_eq!(config.channel_flavor, Flavor::Sequential);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(TransportConfig::new(Some("num_connections = 4\npkey = 1")).is_err());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        assert!(TransportConfig::new(None).is_err());
    }
}
