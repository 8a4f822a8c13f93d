//! Session and registry configuration models.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::rules::{DEFAULT_SCORE_TO_WIN, RulePolicy, Variant, VariantKind};

/// Configuration recognized at session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Rule variant the session is played with
    pub variant: VariantKind,

    /// Players needed before the game can start
    pub min_players: usize,

    /// Seats available
    pub max_players: usize,

    /// How long a suspended session waits for reconnection before it is abandoned
    pub reconnect_grace_secs: u64,

    /// Events buffered per subscriber before it is forced to resync
    pub event_buffer_capacity: usize,

    /// How long a lost connection may stay stale before the session suspends
    pub stale_grace_secs: u64,

    /// How long a session may sit in the lobby before it is abandoned
    pub forming_timeout_secs: u64,

    /// Match target for variants that play several hands
    pub score_to_win: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            variant: VariantKind::SimpleHighCard,
            min_players: 2,
            max_players: 2,
            reconnect_grace_secs: 60,
            event_buffer_capacity: 64,
            stale_grace_secs: 10,
            forming_timeout_secs: 600,
            score_to_win: DEFAULT_SCORE_TO_WIN,
        }
    }
}

impl SessionConfig {
    /// Defaults for a four-player tressette match.
    #[must_use]
    pub fn tressette() -> Self {
        Self {
            variant: VariantKind::Tressette,
            min_players: 4,
            max_players: 4,
            ..Self::default()
        }
    }

    /// Validate configuration against the chosen variant
    pub fn validate(&self) -> Result<(), String> {
        let seats = self.rules().seats();

        if self.min_players == 0 {
            return Err("Min players must be at least 1".to_string());
        }

        if self.max_players < self.min_players {
            return Err("Max players must be at least min players".to_string());
        }

        if !seats.contains(&self.min_players) || !seats.contains(&self.max_players) {
            return Err(format!(
                "{} supports between {} and {} players",
                self.variant,
                seats.start(),
                seats.end()
            ));
        }

        if self.event_buffer_capacity == 0 {
            return Err("Event buffer capacity must be greater than 0".to_string());
        }

        if self.reconnect_grace_secs == 0 {
            return Err("Reconnect grace must be greater than 0".to_string());
        }

        if self.variant == VariantKind::Tressette && self.score_to_win == 0 {
            return Err("Score to win must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Resolve the rule policy this session is played with
    #[must_use]
    pub fn rules(&self) -> Variant {
        Variant::from_kind(self.variant, self.score_to_win)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_secs(self.stale_grace_secs)
    }

    pub fn forming_timeout(&self) -> Duration {
        Duration::from_secs(self.forming_timeout_secs)
    }
}

/// Process-wide registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Bound on waiting for a session to accept a request
    pub submit_timeout_ms: u64,

    /// Interval of each session's timer tick
    pub tick_interval_ms: u64,

    /// How long a finished session stays queryable before it is archived and evicted
    pub retention_secs: u64,

    /// Capacity of each session's inbox
    pub inbox_capacity: usize,

    /// Upper bound on live sessions
    pub max_sessions: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            submit_timeout_ms: 2_000,
            tick_interval_ms: 250,
            retention_secs: 300,
            inbox_capacity: 100,
            max_sessions: 10_000,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.submit_timeout_ms == 0 {
            return Err("Submit timeout must be greater than 0".to_string());
        }

        if self.tick_interval_ms == 0 {
            return Err("Tick interval must be greater than 0".to_string());
        }

        if self.inbox_capacity == 0 {
            return Err("Inbox capacity must be greater than 0".to_string());
        }

        if self.max_sessions == 0 {
            return Err("Max sessions must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SessionConfig::default().validate().is_ok());
        assert!(SessionConfig::tressette().validate().is_ok());
        assert!(RegistryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_seat_range_enforced_per_variant() {
        let config = SessionConfig {
            variant: VariantKind::Tressette,
            min_players: 2,
            max_players: 4,
            ..SessionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("tressette"));

        let config = SessionConfig {
            max_players: 9,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_above_max_rejected() {
        let config = SessionConfig {
            min_players: 3,
            max_players: 2,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let config = SessionConfig {
            event_buffer_capacity: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"variant":"tressette","min_players":4,"max_players":4}"#)
                .unwrap();
        assert_eq!(config.variant, VariantKind::Tressette);
        assert_eq!(config.reconnect_grace_secs, 60);
        assert!(config.validate().is_ok());
    }
}
