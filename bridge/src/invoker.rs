use anyhow::Context;
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};

use climate_sync_common::{
    set_fan_mode_topic, set_mode_topic, set_swing_mode_topic, set_temperature_topic, ClimateCommand,
};

/// Delivery seam for device commands. The production implementation
/// publishes over MQTT; tests substitute in-memory fakes.
#[async_trait]
pub trait CommandInvoker: Send + Sync {
    async fn invoke(&self, entity_id: &str, command: &ClimateCommand) -> anyhow::Result<()>;
}

pub struct MqttInvoker {
    mqtt: AsyncClient,
}

impl MqttInvoker {
    pub fn new(mqtt: AsyncClient) -> Self {
        Self { mqtt }
    }
}

#[async_trait]
impl CommandInvoker for MqttInvoker {
    async fn invoke(&self, entity_id: &str, command: &ClimateCommand) -> anyhow::Result<()> {
        let (topic, payload) = match command {
            ClimateCommand::SetMode { mode } => (
                set_mode_topic(entity_id),
                mode.as_str().as_bytes().to_vec(),
            ),
            ClimateCommand::SetTemperature(setpoints) => (
                set_temperature_topic(entity_id),
                serde_json::to_vec(setpoints)?,
            ),
            ClimateCommand::SetFanMode { fan_mode } => {
                (set_fan_mode_topic(entity_id), fan_mode.clone().into_bytes())
            }
            ClimateCommand::SetSwingMode { swing_mode } => (
                set_swing_mode_topic(entity_id),
                swing_mode.clone().into_bytes(),
            ),
        };

        self.mqtt
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .with_context(|| format!("failed to publish {} for {entity_id}", command.kind()))
    }
}
