use std::{sync::Arc, time::Duration};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::Mutex;
use tracing::{info, warn};

use climate_sync_common::{
    availability_topic, parse_entity_topic, set_fan_mode_topic, set_mode_topic,
    set_swing_mode_topic, set_temperature_topic, state_topic, EntityChannel, HvacAction, HvacMode,
    StatePayload, TemperaturePayload, AVAILABILITY_ONLINE,
};

/// Degrees the unit moves per step while actively heating or cooling, before
/// the fan factor is applied.
const DRIVE_RATE: f64 = 0.15;
/// Degrees per step the room drifts back toward ambient while the unit idles.
const DRIFT_RATE: f64 = 0.05;
/// Hysteresis band around the setpoint before the compressor kicks in.
const DEADBAND: f64 = 0.3;

/// A fake climate entity with just enough thermal behavior to exercise the
/// bridge end to end: it reports `heating`/`cooling` action when driven, so
/// the boost path actually engages against a live broker.
struct SimulatedDevice {
    entity_id: String,
    mode: HvacMode,
    action: HvacAction,
    ambient: f64,
    current_temperature: f64,
    target_temperature: f64,
    target_temperature_low: f64,
    target_temperature_high: f64,
    fan_modes: Vec<String>,
    swing_modes: Vec<String>,
    fan_mode: String,
    swing_mode: String,
    min_temp: f64,
    max_temp: f64,
}

impl SimulatedDevice {
    fn new(entity_id: String) -> Self {
        Self {
            entity_id,
            mode: HvacMode::Off,
            action: HvacAction::Off,
            ambient: 21.0,
            current_temperature: 21.0,
            target_temperature: 23.0,
            target_temperature_low: 20.0,
            target_temperature_high: 24.0,
            fan_modes: vec![
                "auto".to_string(),
                "low".to_string(),
                "medium".to_string(),
                "high".to_string(),
                "powerful".to_string(),
            ],
            swing_modes: vec![
                "auto".to_string(),
                "horizontal".to_string(),
                "vertical".to_string(),
            ],
            fan_mode: "auto".to_string(),
            swing_mode: "auto".to_string(),
            min_temp: 16.0,
            max_temp: 30.0,
        }
    }

    fn apply_mode(&mut self, mode: HvacMode) {
        self.mode = mode;
        self.refresh_action();
    }

    fn apply_temperature(&mut self, setpoints: &TemperaturePayload) {
        if let Some(temperature) = setpoints.temperature {
            self.target_temperature = temperature.clamp(self.min_temp, self.max_temp);
        }
        if let Some(low) = setpoints.target_low {
            self.target_temperature_low = low.clamp(self.min_temp, self.max_temp);
        }
        if let Some(high) = setpoints.target_high {
            self.target_temperature_high = high.clamp(self.min_temp, self.max_temp);
        }
        self.refresh_action();
    }

    fn apply_fan_mode(&mut self, fan_mode: &str) -> bool {
        if !self.fan_modes.iter().any(|m| m == fan_mode) {
            return false;
        }
        self.fan_mode = fan_mode.to_string();
        true
    }

    fn apply_swing_mode(&mut self, swing_mode: &str) -> bool {
        if !self.swing_modes.iter().any(|m| m == swing_mode) {
            return false;
        }
        self.swing_mode = swing_mode.to_string();
        true
    }

    fn refresh_action(&mut self) {
        self.action = match self.mode {
            HvacMode::Off => HvacAction::Off,
            HvacMode::Heat => {
                if self.current_temperature < self.target_temperature - DEADBAND {
                    HvacAction::Heating
                } else {
                    HvacAction::Idle
                }
            }
            HvacMode::Cool => {
                if self.current_temperature > self.target_temperature + DEADBAND {
                    HvacAction::Cooling
                } else {
                    HvacAction::Idle
                }
            }
            HvacMode::HeatCool | HvacMode::Auto => {
                if self.current_temperature < self.target_temperature_low - DEADBAND {
                    HvacAction::Heating
                } else if self.current_temperature > self.target_temperature_high + DEADBAND {
                    HvacAction::Cooling
                } else {
                    HvacAction::Idle
                }
            }
            HvacMode::Dry => HvacAction::Drying,
            HvacMode::FanOnly => HvacAction::Fan,
        };
    }

    /// One simulation tick: recompute the action, then move the temperature.
    fn step(&mut self) {
        self.refresh_action();
        let rate = DRIVE_RATE * self.fan_factor();
        match self.action {
            HvacAction::Heating => self.current_temperature += rate,
            HvacAction::Cooling => self.current_temperature -= rate,
            _ => {
                self.current_temperature +=
                    (self.ambient - self.current_temperature).clamp(-DRIFT_RATE, DRIFT_RATE);
            }
        }
    }

    fn fan_factor(&self) -> f64 {
        match self.fan_mode.as_str() {
            "low" => 0.6,
            "medium" => 1.0,
            "high" => 1.4,
            "powerful" => 1.8,
            "superPowerful" => 2.2,
            _ => 1.0,
        }
    }

    fn state_payload(&self) -> StatePayload {
        StatePayload {
            state: self.mode.as_str().to_string(),
            action: Some(self.action.as_str().to_string()),
            current_temperature: Some((self.current_temperature * 10.0).round() / 10.0),
            target_temperature: Some(self.target_temperature),
            target_temperature_low: Some(self.target_temperature_low),
            target_temperature_high: Some(self.target_temperature_high),
            fan_modes: self.fan_modes.clone(),
            swing_modes: self.swing_modes.clone(),
            fan_mode: Some(self.fan_mode.clone()),
            swing_mode: Some(self.swing_mode.clone()),
            min_temp: Some(self.min_temp),
            max_temp: Some(self.max_temp),
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let entity_id = std::env::var("SIM_ENTITY_ID").unwrap_or_else(|_| "sim_climate".to_string());

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options =
        MqttOptions::new(format!("climate-sim-{entity_id}"), mqtt_host, mqtt_port);

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    for topic in [
        set_mode_topic(&entity_id),
        set_temperature_topic(&entity_id),
        set_fan_mode_topic(&entity_id),
        set_swing_mode_topic(&entity_id),
    ] {
        mqtt.subscribe(topic, QoS::AtLeastOnce).await?;
    }

    mqtt.publish(
        availability_topic(&entity_id),
        QoS::AtLeastOnce,
        true,
        AVAILABILITY_ONLINE,
    )
    .await
    .context("failed to publish simulator availability")?;

    let device = Arc::new(Mutex::new(SimulatedDevice::new(entity_id.clone())));

    {
        let device = Arc::clone(&device);
        let mqtt = mqtt.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(message))) => {
                        if let Err(err) =
                            handle_command(&device, &mqtt, message.topic, message.payload.to_vec())
                                .await
                        {
                            warn!("command handling error: {err:#}");
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("simulator mqtt poll error: {err}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });
    }

    info!("simulated climate device {entity_id} started");

    let mut interval = tokio::time::interval(Duration::from_secs(10));
    loop {
        interval.tick().await;

        let payload = {
            let mut device = device.lock().await;
            device.step();
            serde_json::to_vec(&device.state_payload())
        };

        match payload {
            Ok(body) => {
                if let Err(err) = mqtt
                    .publish(state_topic(&entity_id), QoS::AtLeastOnce, true, body)
                    .await
                {
                    warn!("state publish failed: {err}");
                }
            }
            Err(err) => warn!("state serialization failed: {err}"),
        }
    }
}

async fn handle_command(
    device: &Arc<Mutex<SimulatedDevice>>,
    mqtt: &AsyncClient,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    let Some((entity_id, channel)) = parse_entity_topic(&topic) else {
        return Ok(());
    };
    let message = String::from_utf8(payload).context("non utf8 command payload")?;

    let mut device = device.lock().await;
    if device.entity_id != entity_id {
        return Ok(());
    }

    match channel {
        EntityChannel::SetMode => {
            let Some(mode) = HvacMode::parse(&message) else {
                warn!("unsupported mode command: {message}");
                return Ok(());
            };
            device.apply_mode(mode);
            info!("mode set to {}", mode.as_str());
        }
        EntityChannel::SetTemperature => {
            let setpoints: TemperaturePayload =
                serde_json::from_str(&message).context("malformed temperature command")?;
            device.apply_temperature(&setpoints);
            info!(
                "setpoints updated (single {}, band {}..{})",
                device.target_temperature,
                device.target_temperature_low,
                device.target_temperature_high
            );
        }
        EntityChannel::SetFanMode => {
            if device.apply_fan_mode(&message) {
                info!("fan mode set to {message}");
            } else {
                warn!("unsupported fan mode: {message}");
            }
        }
        EntityChannel::SetSwingMode => {
            if device.apply_swing_mode(&message) {
                info!("swing mode set to {message}");
            } else {
                warn!("unsupported swing mode: {message}");
            }
        }
        EntityChannel::State | EntityChannel::Availability => return Ok(()),
    }

    // Publish the new state right away so the bridge sees command effects
    // without waiting for the next simulation tick.
    let body = serde_json::to_vec(&device.state_payload())?;
    let topic = state_topic(&device.entity_id);
    drop(device);

    mqtt.publish(topic, QoS::AtLeastOnce, true, body)
        .await
        .context("failed to publish state after command")?;
    Ok(())
}
