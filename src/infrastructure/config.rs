use serde::Deserialize;

use crate::application::normalizer::{ChannelSearchOrder, FourthFlagRule, NormalizerOptions};

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub rtdb: RtdbSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RtdbSettings {
    pub database_url: String,
    pub path: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub normalizer: NormalizerSettings,
}

/// Upstream schema-revision selection; see the strategy enums for the
/// recognized values.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct NormalizerSettings {
    #[serde(default)]
    pub fourth_status_flag: FourthFlagRule,
    #[serde(default)]
    pub channel_search_order: ChannelSearchOrder,
}

impl NormalizerSettings {
    pub fn options(&self) -> NormalizerOptions {
        NormalizerOptions {
            fourth_flag: self.fourth_status_flag,
            search_order: self.channel_search_order,
        }
    }
}

pub fn load_source_config() -> anyhow::Result<SourceConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/source"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_monitor_config() -> anyhow::Result<MonitorConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor"))
        .build()?;

    Ok(settings.try_deserialize()?)
}
