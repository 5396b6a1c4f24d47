use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{engine::BOOST_FAN_PREFERENCE, error::ConfigError};

pub const DEFAULT_OFFSET_SENSITIVITY: f64 = 1.0;
pub const MIN_OFFSET_SENSITIVITY: f64 = 0.1;
pub const MAX_OFFSET_SENSITIVITY: f64 = 5.0;

pub const DEFAULT_BOOST_ACTIVATION_DELAY_MIN: u64 = 5;
pub const DEFAULT_BOOST_MINIMUM_RUNTIME_MIN: u64 = 10;
pub const DEFAULT_SYNC_INTERVAL_MIN: u64 = 5;

/// Upper bound for the hysteresis windows and the periodic interval. A day is
/// already far beyond any sensible setting.
pub const MAX_WINDOW_MIN: u64 = 1_440;

const MS_PER_MIN: u64 = 60_000;

/// One source -> target mirroring relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncPairConfig {
    pub source_entity: String,
    pub target_entity: String,
    #[serde(default = "default_true")]
    pub enable_temp_offset: bool,
    #[serde(default = "default_true")]
    pub enable_boost_mode: bool,
    #[serde(default = "default_offset_sensitivity")]
    pub offset_sensitivity: f64,
    #[serde(default = "default_boost_activation_delay_min")]
    pub boost_activation_delay_min: u64,
    #[serde(default = "default_boost_minimum_runtime_min")]
    pub boost_minimum_runtime_min: u64,
    #[serde(default = "default_sync_interval_min")]
    pub sync_interval_min: u64,
    #[serde(default = "default_boost_fan_preference")]
    pub boost_fan_preference: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_offset_sensitivity() -> f64 {
    DEFAULT_OFFSET_SENSITIVITY
}

fn default_boost_activation_delay_min() -> u64 {
    DEFAULT_BOOST_ACTIVATION_DELAY_MIN
}

fn default_boost_minimum_runtime_min() -> u64 {
    DEFAULT_BOOST_MINIMUM_RUNTIME_MIN
}

fn default_sync_interval_min() -> u64 {
    DEFAULT_SYNC_INTERVAL_MIN
}

pub fn default_boost_fan_preference() -> Vec<String> {
    BOOST_FAN_PREFERENCE.iter().map(|m| m.to_string()).collect()
}

impl SyncPairConfig {
    pub fn new(source_entity: impl Into<String>, target_entity: impl Into<String>) -> Self {
        Self {
            source_entity: source_entity.into(),
            target_entity: target_entity.into(),
            enable_temp_offset: true,
            enable_boost_mode: true,
            offset_sensitivity: DEFAULT_OFFSET_SENSITIVITY,
            boost_activation_delay_min: DEFAULT_BOOST_ACTIVATION_DELAY_MIN,
            boost_minimum_runtime_min: DEFAULT_BOOST_MINIMUM_RUNTIME_MIN,
            sync_interval_min: DEFAULT_SYNC_INTERVAL_MIN,
            boost_fan_preference: default_boost_fan_preference(),
        }
    }

    pub fn sanitize(&mut self) {
        self.offset_sensitivity = if self.offset_sensitivity.is_finite() {
            self.offset_sensitivity
                .clamp(MIN_OFFSET_SENSITIVITY, MAX_OFFSET_SENSITIVITY)
        } else {
            DEFAULT_OFFSET_SENSITIVITY
        };

        self.boost_activation_delay_min = self.boost_activation_delay_min.min(MAX_WINDOW_MIN);
        self.boost_minimum_runtime_min = self.boost_minimum_runtime_min.min(MAX_WINDOW_MIN);
        // A zero interval would spin the periodic loop.
        self.sync_interval_min = self.sync_interval_min.clamp(1, MAX_WINDOW_MIN);

        if self.boost_fan_preference.is_empty() {
            self.boost_fan_preference = default_boost_fan_preference();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_entity.trim().is_empty() || self.target_entity.trim().is_empty() {
            return Err(ConfigError::EmptyEntityId);
        }
        if self.source_entity == self.target_entity {
            return Err(ConfigError::SamePairEntities {
                entity: self.source_entity.clone(),
            });
        }
        Ok(())
    }

    pub fn boost_activation_delay_ms(&self) -> u64 {
        self.boost_activation_delay_min * MS_PER_MIN
    }

    pub fn boost_minimum_runtime_ms(&self) -> u64 {
        self.boost_minimum_runtime_min * MS_PER_MIN
    }

    pub fn sync_interval_ms(&self) -> u64 {
        self.sync_interval_min * MS_PER_MIN
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

/// Everything the bridge persists between restarts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub pairs: Vec<SyncPairConfig>,
}

impl BridgeConfig {
    pub fn sanitize(&mut self) {
        for pair in &mut self.pairs {
            pair.sanitize();
        }
    }

    /// Checks each pair plus cross-pair constraints. The first violation wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        for pair in &self.pairs {
            pair.validate()?;
            if !seen.insert((pair.source_entity.as_str(), pair.target_entity.as_str())) {
                return Err(ConfigError::DuplicatePair {
                    source: pair.source_entity.clone(),
                    target: pair.target_entity.clone(),
                });
            }
        }
        Ok(())
    }
}
