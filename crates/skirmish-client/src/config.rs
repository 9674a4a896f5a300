//! Client configuration, read from a TOML file.
//!
//! ```toml
//! [session]
//! participant_id = "p-7f3a"
//! name = "Alpha"
//! team = "blue"
//! match_code = "ABC123"
//! director = false
//!
//! [turns]
//! turn_duration_secs = 180
//! default_director_team = "blue"
//!
//! [sync]
//! reconnect_base_delay_ms = 1000
//! reconnect_max_attempts = 5
//!
//! [orders]
//! execution_time_scale = 0.0
//! grid_width = 64
//! grid_height = 64
//! ```
//!
//! Every field has a default, so an empty file is valid. CLI flags are
//! applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use skirmish_core::constants::{
    DEFAULT_EXECUTION_TIME_SCALE, DEFAULT_TURN_DURATION_SECS, RECONNECT_BASE_DELAY_MS,
    RECONNECT_MAX_ATTEMPTS,
};
use skirmish_core::enums::Team;
use skirmish_core::session::SessionContext;
use skirmish_sync::ReconnectPolicy;
use skirmish_turns::TurnConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub participant_id: String,
    pub name: String,
    pub team: Team,
    pub match_code: String,
    /// This client directs the match.
    pub director: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            participant_id: "local".into(),
            name: "Player".into(),
            team: Team::Blue,
            match_code: "LOCAL".into(),
            director: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnsSection {
    pub turn_duration_secs: u32,
    pub default_director_team: Team,
}

impl Default for TurnsSection {
    fn default() -> Self {
        Self {
            turn_duration_secs: DEFAULT_TURN_DURATION_SECS,
            default_director_team: Team::Blue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_attempts: u32,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: RECONNECT_BASE_DELAY_MS,
            reconnect_max_attempts: RECONNECT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdersSection {
    /// Wall-clock seconds per order second. 0.0 executes instantly.
    pub execution_time_scale: f64,
    /// Resolution of the reachability grid laid over the sector.
    pub grid_width: u32,
    pub grid_height: u32,
}

impl Default for OrdersSection {
    fn default() -> Self {
        Self {
            execution_time_scale: DEFAULT_EXECUTION_TIME_SCALE,
            grid_width: 64,
            grid_height: 64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub session: SessionSection,
    pub turns: TurnsSection,
    pub sync: SyncSection,
    pub orders: OrdersSection,
}

impl ClientConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.participant_id.trim().is_empty() {
            return Err(ConfigError::Invalid("session.participant_id is empty".into()));
        }
        if self.turns.turn_duration_secs == 0 {
            return Err(ConfigError::Invalid("turns.turn_duration_secs must be positive".into()));
        }
        if !self.turns.default_director_team.is_playable() {
            return Err(ConfigError::Invalid(
                "turns.default_director_team must be blue or red".into(),
            ));
        }
        if self.sync.reconnect_max_attempts == 0 {
            return Err(ConfigError::Invalid("sync.reconnect_max_attempts must be positive".into()));
        }
        if self.orders.execution_time_scale.is_nan() || self.orders.execution_time_scale < 0.0 {
            return Err(ConfigError::Invalid(
                "orders.execution_time_scale must be zero or positive".into(),
            ));
        }
        Ok(())
    }

    pub fn session_context(&self) -> SessionContext {
        let session = SessionContext::new(
            self.session.participant_id.clone(),
            self.session.name.clone(),
            self.session.team,
            self.session.match_code.clone(),
        );
        if self.session.director {
            session.director()
        } else {
            session
        }
    }

    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            turn_duration_secs: self.turns.turn_duration_secs,
            default_director_team: self.turns.default_director_team,
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.sync.reconnect_base_delay_ms),
            self.sync.reconnect_max_attempts,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.turns.turn_duration_secs, 180);
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::default());
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            [session]
            participant_id = "p9"
            team = "red"

            [turns]
            turn_duration_secs = 90
            "#,
        )
        .unwrap();
        let session = config.session_context();
        assert_eq!(session.participant_id, "p9");
        assert_eq!(session.team, Team::Red);
        assert_eq!(session.match_code, "LOCAL");
        assert!(!session.is_director);
        assert_eq!(config.turn_config().turn_duration_secs, 90);
        assert_eq!(config.turn_config().default_director_team, Team::Blue);
    }

    #[test]
    fn test_invalid_values_are_refused() {
        assert!(matches!(
            ClientConfig::from_toml_str("[turns]\nturn_duration_secs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("[turns]\ndefault_director_team = \"unassigned\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("[session]\nteam = \"green\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
