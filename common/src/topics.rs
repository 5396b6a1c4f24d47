//! Topic layout shared by the bridge and every climate entity.
//!
//! Entities publish retained state on `climate/<entity>/state` and retained
//! availability on `climate/<entity>/availability`; the bridge publishes
//! commands on the `climate/<entity>/set/...` channels.

pub const CLIMATE_TOPIC_PREFIX: &str = "climate";

pub const AVAILABILITY_ONLINE: &str = "online";
pub const AVAILABILITY_OFFLINE: &str = "offline";

pub fn state_topic(entity_id: &str) -> String {
    format!("{CLIMATE_TOPIC_PREFIX}/{entity_id}/state")
}

pub fn availability_topic(entity_id: &str) -> String {
    format!("{CLIMATE_TOPIC_PREFIX}/{entity_id}/availability")
}

pub fn set_mode_topic(entity_id: &str) -> String {
    format!("{CLIMATE_TOPIC_PREFIX}/{entity_id}/set/mode")
}

pub fn set_temperature_topic(entity_id: &str) -> String {
    format!("{CLIMATE_TOPIC_PREFIX}/{entity_id}/set/temperature")
}

pub fn set_fan_mode_topic(entity_id: &str) -> String {
    format!("{CLIMATE_TOPIC_PREFIX}/{entity_id}/set/fan_mode")
}

pub fn set_swing_mode_topic(entity_id: &str) -> String {
    format!("{CLIMATE_TOPIC_PREFIX}/{entity_id}/set/swing_mode")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityChannel {
    State,
    Availability,
    SetMode,
    SetTemperature,
    SetFanMode,
    SetSwingMode,
}

/// Splits a topic into the entity id and its channel. Topics outside the
/// climate prefix come back as `None`.
pub fn parse_entity_topic(topic: &str) -> Option<(&str, EntityChannel)> {
    let rest = topic.strip_prefix(CLIMATE_TOPIC_PREFIX)?.strip_prefix('/')?;
    let (entity_id, channel) = rest.split_once('/')?;
    if entity_id.is_empty() {
        return None;
    }
    let channel = match channel {
        "state" => EntityChannel::State,
        "availability" => EntityChannel::Availability,
        "set/mode" => EntityChannel::SetMode,
        "set/temperature" => EntityChannel::SetTemperature,
        "set/fan_mode" => EntityChannel::SetFanMode,
        "set/swing_mode" => EntityChannel::SetSwingMode,
        _ => return None,
    };
    Some((entity_id, channel))
}
