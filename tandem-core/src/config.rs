//! Runtime configuration.

use std::path::Path;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// When a replica counts as empty for seeding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmptinessPolicy {
    /// The replica holds no top-level blocks at all.
    #[default]
    Strict,
    /// Also treat a replica with no meaningful content as empty.
    IgnoreBlank,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Interval between cursor projection passes.
    #[serde(rename = "cursor_refresh_ms", with = "millis")]
    pub cursor_refresh: Duration,
    /// Minimum spacing between pointer-move presence publishes.
    #[serde(rename = "presence_throttle_ms", with = "millis")]
    pub presence_throttle: Duration,
    /// Grace period after seeding before edits are accepted.
    #[serde(rename = "ready_delay_ms", with = "millis")]
    pub ready_delay: Duration,
    /// Capacity of the actor's request and inbound channels.
    pub channel_capacity: usize,
    pub emptiness_policy: EmptinessPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cursor_refresh: Duration::from_millis(33),
            presence_throttle: Duration::from_millis(50),
            ready_delay: Duration::ZERO,
            channel_capacity: 64,
            emptiness_policy: EmptinessPolicy::Strict,
        }
    }
}

impl SyncConfig {
    /// Parse configuration from TOML. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML, unknown keys or a zero
    /// channel capacity.
    pub fn from_toml_str(source: &str) -> Result<Self, Report<ConfigError>> {
        let config: Self = toml::from_str(source).change_context(ConfigError)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, Report<ConfigError>> {
        let source = std::fs::read_to_string(path)
            .change_context(ConfigError)
            .attach_with(|| format!("path: {}", path.display()))?;
        Self::from_toml_str(&source).attach_with(|| format!("path: {}", path.display()))
    }

    fn validate(&self) -> Result<(), Report<ConfigError>> {
        if self.channel_capacity == 0 {
            return Err(Report::new(ConfigError).attach("channel_capacity must be at least 1"));
        }
        if self.cursor_refresh.is_zero() {
            return Err(Report::new(ConfigError).attach("cursor_refresh_ms must be positive"));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.cursor_refresh, Duration::from_millis(33));
        assert_eq!(config.presence_throttle, Duration::from_millis(50));
        assert_eq!(config.ready_delay, Duration::ZERO);
        assert_eq!(config.emptiness_policy, EmptinessPolicy::Strict);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            presence_throttle_ms = 120
            emptiness_policy = "ignore-blank"
            "#,
        )
        .unwrap();
        assert_eq!(config.presence_throttle, Duration::from_millis(120));
        assert_eq!(config.emptiness_policy, EmptinessPolicy::IgnoreBlank);
        assert_eq!(config.channel_capacity, 64);
    }

    #[test]
    fn rejects_unknown_keys_and_zero_capacity() {
        assert!(SyncConfig::from_toml_str("cursor_refresh = 5").is_err());
        assert!(SyncConfig::from_toml_str("channel_capacity = 0").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ready_delay_ms = 250").unwrap();
        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.ready_delay, Duration::from_millis(250));

        assert!(SyncConfig::load(Path::new("/nonexistent/tandem.toml")).is_err());
    }
}
