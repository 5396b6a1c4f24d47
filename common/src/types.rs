use serde::{Deserialize, Serialize};

/// Fallback setpoint range advertised by devices that omit `minTemp` /
/// `maxTemp` from their state payload.
pub const DEFAULT_MIN_TEMP: f64 = 16.0;
pub const DEFAULT_MAX_TEMP: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    Auto,
    Dry,
    FanOnly,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::HeatCool => "heat_cool",
            Self::Auto => "auto",
            Self::Dry => "dry",
            Self::FanOnly => "fan_only",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(Self::Off),
            "heat" => Some(Self::Heat),
            "cool" => Some(Self::Cool),
            "heat_cool" => Some(Self::HeatCool),
            "auto" => Some(Self::Auto),
            "dry" => Some(Self::Dry),
            "fan_only" => Some(Self::FanOnly),
            _ => None,
        }
    }

    /// Whether the mode targets a low/high band instead of a single setpoint.
    pub fn is_dual_setpoint(self) -> bool {
        matches!(self, Self::HeatCool)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacAction {
    Off,
    Idle,
    Heating,
    Cooling,
    Drying,
    Fan,
}

impl HvacAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Idle => "idle",
            Self::Heating => "heating",
            Self::Cooling => "cooling",
            Self::Drying => "drying",
            Self::Fan => "fan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(Self::Off),
            "idle" => Some(Self::Idle),
            "heating" => Some(Self::Heating),
            "cooling" => Some(Self::Cooling),
            "drying" => Some(Self::Drying),
            "fan" => Some(Self::Fan),
            _ => None,
        }
    }

    /// Actively moving heat, as opposed to idling or circulating air.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Heating | Self::Cooling)
    }
}

/// How much the last reported state of an entity can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// A parseable state was reported and the entity is online.
    Valid,
    /// The entity reported something we could not interpret as an HVAC mode.
    Unknown,
    /// The entity declared itself offline.
    Unavailable,
}

impl Liveness {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Unknown => "unknown",
            Self::Unavailable => "unavailable",
        }
    }
}

/// State payload a climate entity publishes on `climate/<entity>/state`.
///
/// Every numeric field is optional on the wire. A device that only knows its
/// mode still produces a usable payload, and absent readings stay absent
/// instead of turning into sentinel values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(rename = "currentTemperature", default, skip_serializing_if = "Option::is_none")]
    pub current_temperature: Option<f64>,
    #[serde(rename = "targetTemperature", default, skip_serializing_if = "Option::is_none")]
    pub target_temperature: Option<f64>,
    #[serde(rename = "targetTemperatureLow", default, skip_serializing_if = "Option::is_none")]
    pub target_temperature_low: Option<f64>,
    #[serde(rename = "targetTemperatureHigh", default, skip_serializing_if = "Option::is_none")]
    pub target_temperature_high: Option<f64>,
    #[serde(rename = "fanModes", default, skip_serializing_if = "Vec::is_empty")]
    pub fan_modes: Vec<String>,
    #[serde(rename = "swingModes", default, skip_serializing_if = "Vec::is_empty")]
    pub swing_modes: Vec<String>,
    #[serde(rename = "fanMode", default, skip_serializing_if = "Option::is_none")]
    pub fan_mode: Option<String>,
    #[serde(rename = "swingMode", default, skip_serializing_if = "Option::is_none")]
    pub swing_mode: Option<String>,
    #[serde(rename = "minTemp", default, skip_serializing_if = "Option::is_none")]
    pub min_temp: Option<f64>,
    #[serde(rename = "maxTemp", default, skip_serializing_if = "Option::is_none")]
    pub max_temp: Option<f64>,
}

/// Interpreted view of one climate entity at a point in time.
///
/// `mode` is only meaningful while `liveness` is `Valid`; the constructors
/// park it at `Off` otherwise so nothing downstream acts on it by accident.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub entity_id: String,
    pub liveness: Liveness,
    pub mode: HvacMode,
    pub action: Option<HvacAction>,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    pub target_temperature_low: Option<f64>,
    pub target_temperature_high: Option<f64>,
    pub fan_modes: Vec<String>,
    pub swing_modes: Vec<String>,
    pub fan_mode: Option<String>,
    pub swing_mode: Option<String>,
    pub min_temp: f64,
    pub max_temp: f64,
}

impl DeviceSnapshot {
    pub fn from_payload(entity_id: &str, payload: &StatePayload, online: bool) -> Self {
        let (liveness, mode) = if !online {
            (Liveness::Unavailable, HvacMode::Off)
        } else {
            match payload.state.as_str() {
                "unavailable" => (Liveness::Unavailable, HvacMode::Off),
                other => match HvacMode::parse(other) {
                    Some(mode) => (Liveness::Valid, mode),
                    None => (Liveness::Unknown, HvacMode::Off),
                },
            }
        };
        Self {
            entity_id: entity_id.to_string(),
            liveness,
            mode,
            action: payload.action.as_deref().and_then(HvacAction::parse),
            current_temperature: payload.current_temperature,
            target_temperature: payload.target_temperature,
            target_temperature_low: payload.target_temperature_low,
            target_temperature_high: payload.target_temperature_high,
            fan_modes: payload.fan_modes.clone(),
            swing_modes: payload.swing_modes.clone(),
            fan_mode: payload.fan_mode.clone(),
            swing_mode: payload.swing_mode.clone(),
            min_temp: payload.min_temp.unwrap_or(DEFAULT_MIN_TEMP),
            max_temp: payload.max_temp.unwrap_or(DEFAULT_MAX_TEMP),
        }
    }

    pub fn is_live(&self) -> bool {
        self.liveness == Liveness::Valid
    }
}

/// Setpoint command payload for `climate/<entity>/set/temperature`.
///
/// Single-setpoint modes use `temperature`; heat/cool band modes use the
/// low/high fields, either of which may be absent when the source only
/// carries one end of the band.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperaturePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "targetLow", default, skip_serializing_if = "Option::is_none")]
    pub target_low: Option<f64>,
    #[serde(rename = "targetHigh", default, skip_serializing_if = "Option::is_none")]
    pub target_high: Option<f64>,
}

impl TemperaturePayload {
    pub fn single(temperature: f64) -> Self {
        Self {
            temperature: Some(temperature),
            ..Self::default()
        }
    }

    pub fn range(target_low: Option<f64>, target_high: Option<f64>) -> Self {
        Self {
            temperature: None,
            target_low,
            target_high,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.target_low.is_none() && self.target_high.is_none()
    }
}

/// One instruction for the target device.
#[derive(Debug, Clone, PartialEq)]
pub enum ClimateCommand {
    SetMode { mode: HvacMode },
    SetTemperature(TemperaturePayload),
    SetFanMode { fan_mode: String },
    SetSwingMode { swing_mode: String },
}

impl ClimateCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetMode { .. } => "set_mode",
            Self::SetTemperature(..) => "set_temperature",
            Self::SetFanMode { .. } => "set_fan_mode",
            Self::SetSwingMode { .. } => "set_swing_mode",
        }
    }
}

/// Boost bookkeeping exposed over the status API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    #[serde(rename = "boostActive")]
    pub boost_active: bool,
    #[serde(rename = "boostRuntimeMs")]
    pub boost_runtime_ms: u64,
    #[serde(rename = "boostLockRemainingMs")]
    pub boost_lock_remaining_ms: u64,
    #[serde(rename = "continuousActionMs")]
    pub continuous_action_ms: u64,
    #[serde(rename = "savedFanMode")]
    pub saved_fan_mode: Option<String>,
    #[serde(rename = "savedSwingMode")]
    pub saved_swing_mode: Option<String>,
}
