pub mod config;
pub mod engine;
pub mod error;
pub mod topics;
pub mod types;

pub use config::{BridgeConfig, NetworkConfig, SyncPairConfig};
pub use engine::{FailurePolicy, PlannedCommand, SyncEngine, SyncPlan, SyncPosture};
pub use error::ConfigError;
pub use topics::*;
pub use types::{
    ClimateCommand, DeviceSnapshot, EngineStatus, HvacAction, HvacMode, Liveness, StatePayload,
    TemperaturePayload,
};
