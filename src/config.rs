//! Session configuration parameters
//!
//! All tunable timing and safety parameters for a protocol session.
//! Values can be overridden from a JSON document; missing fields keep
//! their defaults.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Core session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // --- Timing ---
    /// Tick interval of the session runtime (milliseconds)
    pub tick_interval_ms: u32,

    // --- Compression watchdog ---
    /// Seconds of continuous compressions before the switch warning starts
    pub switch_warning_secs: u32,
    /// Seconds of continuous compressions before the switch dialog opens
    pub rescuer_switch_secs: u32,
    /// Interval between repeated switch warnings (seconds)
    pub warning_repeat_secs: u32,
    /// Step ids or titles containing any of these start the watchdog
    pub compression_markers: Vec<String>,

    // --- Voice ---
    /// Voice input is ignored this long after speech output ends (milliseconds)
    pub asr_cooldown_ms: u32,

    // --- Loops ---
    /// Upper bound for every loop, whatever the protocol declares
    pub max_loop_iterations: u32,

    // --- Messages ---
    /// Spoken when the rescuer is alone and chooses to rest
    pub exhaustion_message: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            // Timing
            tick_interval_ms: 1000, // 1 Hz

            // Watchdog
            switch_warning_secs: 100,
            rescuer_switch_secs: 120, // 2 min per rescuer
            warning_repeat_secs: 5,
            compression_markers: vec!["compression".into()],

            // Voice
            asr_cooldown_ms: 700,

            // Loops
            max_loop_iterations: 60,

            exhaustion_message: "You have done everything you can. Rest now, stay with them, \
                                 and keep the line open for emergency services."
                .into(),
        }
    }
}

impl SessionConfig {
    /// Parse a JSON override document and validate the result.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent values instead of clamping them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("tick_interval_ms must be positive"));
        }
        if self.rescuer_switch_secs == 0 {
            return Err(ConfigError::ValidationFailed("rescuer_switch_secs must be positive"));
        }
        if self.switch_warning_secs >= self.rescuer_switch_secs {
            return Err(ConfigError::ValidationFailed(
                "switch_warning_secs must be below rescuer_switch_secs",
            ));
        }
        if self.warning_repeat_secs == 0 {
            return Err(ConfigError::ValidationFailed("warning_repeat_secs must be positive"));
        }
        if self.max_loop_iterations == 0 {
            return Err(ConfigError::ValidationFailed("max_loop_iterations must be positive"));
        }
        if self.compression_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "compression_markers needs at least one non-empty marker",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = SessionConfig::default();
        assert!(c.validate().is_ok());
        assert!(c.switch_warning_secs < c.rescuer_switch_secs);
        assert!(c.asr_cooldown_ms < c.tick_interval_ms);
        assert!(!c.exhaustion_message.is_empty());
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let c = SessionConfig::from_json_str(r#"{ "rescuer_switch_secs": 90, "switch_warning_secs": 75 }"#)
            .unwrap();
        assert_eq!(c.rescuer_switch_secs, 90);
        assert_eq!(c.switch_warning_secs, 75);
        assert_eq!(c.max_loop_iterations, 60);
        assert_eq!(c.compression_markers, vec!["compression".to_string()]);
    }

    #[test]
    fn warning_must_precede_switch() {
        let err = SessionConfig::from_json_str(r#"{ "switch_warning_secs": 120 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));
    }

    #[test]
    fn zero_values_are_rejected() {
        for json in [
            r#"{ "tick_interval_ms": 0 }"#,
            r#"{ "max_loop_iterations": 0 }"#,
            r#"{ "warning_repeat_secs": 0 }"#,
            r#"{ "compression_markers": [" "] }"#,
        ] {
            assert!(SessionConfig::from_json_str(json).is_err(), "{json}");
        }
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            SessionConfig::from_json_str("{ tick"),
            Err(ConfigError::Parse(_))
        ));
    }
}
