use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, FileFormat};
use serde::Deserialize;

use crate::domain::core::{RankingMode, SlotValidator, SLOT_MINUTES};

pub mod domain;
pub mod service;

#[derive(Clone, Debug, Deserialize)]
pub struct SlotbookConfig {
    pub logger: Logger,
    pub slot: SlotSettings,
    pub listing: Listing,
}

impl SlotbookConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(config::File::with_name("slotbook").required(false))
            .add_source(
                config::Environment::with_prefix("SLOTBOOK")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<SlotbookConfig>()
    }

    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize::<SlotbookConfig>()
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("logger.level", "INFO")?
            .set_default("slot.minutes", i64::from(SLOT_MINUTES))?
            .set_default("listing.ranking", "StartTime")
    }

    pub fn validator(&self) -> SlotValidator {
        SlotValidator::new(self.slot.minutes)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

/// 枠の長さ(分)
#[derive(Clone, Debug, Deserialize)]
pub struct SlotSettings {
    pub minutes: u16,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Listing {
    pub ranking: RankingMode,
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SlotbookConfig::parse("").unwrap();
        assert_eq!(config.slot.minutes, 30);
        assert_eq!(config.listing.ranking, RankingMode::StartTime);
        assert_eq!(tracing::Level::from(&config.logger.level), tracing::Level::INFO);
    }

    #[test]
    fn test_config_overrides() {
        let config = SlotbookConfig::parse(
            r#"
            [logger]
            level = "DEBUG"

            [slot]
            minutes = 15

            [listing]
            ranking = "Provider"
            "#,
        )
        .unwrap();
        assert_eq!(config.slot.minutes, 15);
        assert_eq!(config.listing.ranking, RankingMode::Provider);
        assert_eq!(tracing::Level::from(&config.logger.level), tracing::Level::DEBUG);
        assert!(config.validator().validate("09:15-09:30"));
    }
}
