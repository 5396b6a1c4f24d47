use crate::{
    config::SyncPairConfig,
    types::{
        ClimateCommand, DeviceSnapshot, EngineStatus, HvacAction, HvacMode, TemperaturePayload,
    },
};

/// Fan modes tried most-powerful-first when boost engages. Vendors disagree
/// on naming, so the first entry the target actually supports wins.
pub const BOOST_FAN_PREFERENCE: &[&str] =
    &["superPowerful", "powerful", "high", "medium", "low", "auto"];

pub const BOOST_SWING_MODE: &str = "auto";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPosture {
    Boost { entering: bool },
    Normal { exiting_boost: bool },
}

impl SyncPosture {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boost { entering: true } => "boost_entered",
            Self::Boost { entering: false } => "boost_held",
            Self::Normal { exiting_boost: true } => "boost_exited",
            Self::Normal { exiting_boost: false } => "normal",
        }
    }
}

/// What the executor does when a command fails partway through a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop executing the rest of the plan and surface the error.
    Abort,
    /// Log and keep going. Used for restores on boost exit, which must not
    /// block returning the target to the source's mode.
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCommand {
    pub command: ClimateCommand,
    pub on_failure: FailurePolicy,
}

impl PlannedCommand {
    fn must(command: ClimateCommand) -> Self {
        Self {
            command,
            on_failure: FailurePolicy::Abort,
        }
    }

    fn best_effort(command: ClimateCommand) -> Self {
        Self {
            command,
            on_failure: FailurePolicy::Continue,
        }
    }
}

/// Commands for the target device, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    pub posture: SyncPosture,
    pub commands: Vec<PlannedCommand>,
}

/// Decides, for one source/target pair, what the target should be told.
///
/// The engine is deterministic and side-effect free: callers feed it
/// snapshots plus a monotonic clock and execute the returned plan themselves.
/// Boost bookkeeping (continuity clock, capture of pre-boost fan and swing
/// modes, minimum-runtime lock) is updated at planning time, so a plan
/// describes commands that may still fail without the engine rolling back.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    config: SyncPairConfig,

    action_start_ms: Option<u64>,
    boost_active: bool,
    boost_start_ms: Option<u64>,
    saved_fan_mode: Option<String>,
    saved_swing_mode: Option<String>,
}

impl SyncEngine {
    pub fn new(mut config: SyncPairConfig) -> Self {
        config.sanitize();
        Self {
            config,
            action_start_ms: None,
            boost_active: false,
            boost_start_ms: None,
            saved_fan_mode: None,
            saved_swing_mode: None,
        }
    }

    pub fn config(&self) -> &SyncPairConfig {
        &self.config
    }

    pub fn boost_active(&self) -> bool {
        self.boost_active
    }

    /// Plans one sync cycle. Returns `None` when the source state cannot be
    /// trusted; in that case nothing is touched, so an entity flapping
    /// between available and unavailable does not reset the boost clocks.
    pub fn plan_cycle(
        &mut self,
        source: &DeviceSnapshot,
        target: &DeviceSnapshot,
        now_ms: u64,
    ) -> Option<SyncPlan> {
        if !source.is_live() {
            return None;
        }

        let is_acting = source.action.map(HvacAction::is_active).unwrap_or(false);

        // Continuity clock: starts on the first cycle that observes active
        // heating or cooling, clears the moment the action is gone.
        if is_acting {
            if self.action_start_ms.is_none() {
                self.action_start_ms = Some(now_ms);
            }
        } else {
            self.action_start_ms = None;
        }

        let should_activate = self.config.enable_boost_mode
            && is_acting
            && self
                .action_start_ms
                .map(|start| now_ms.saturating_sub(start) >= self.config.boost_activation_delay_ms())
                .unwrap_or(false);

        let runtime_locked = self.boost_active
            && self
                .boost_start_ms
                .map(|start| now_ms.saturating_sub(start) < self.config.boost_minimum_runtime_ms())
                .unwrap_or(false);

        let plan = if should_activate || runtime_locked {
            self.plan_boost(source.action, target, now_ms)
        } else {
            self.plan_normal(source, target)
        };
        Some(plan)
    }

    pub fn status(&self, now_ms: u64) -> EngineStatus {
        let boost_runtime_ms = match self.boost_start_ms {
            Some(start) if self.boost_active => now_ms.saturating_sub(start),
            _ => 0,
        };
        let boost_lock_remaining_ms = if self.boost_active {
            self.config
                .boost_minimum_runtime_ms()
                .saturating_sub(boost_runtime_ms)
        } else {
            0
        };
        EngineStatus {
            boost_active: self.boost_active,
            boost_runtime_ms,
            boost_lock_remaining_ms,
            continuous_action_ms: self
                .action_start_ms
                .map(|start| now_ms.saturating_sub(start))
                .unwrap_or(0),
            saved_fan_mode: self.saved_fan_mode.clone(),
            saved_swing_mode: self.saved_swing_mode.clone(),
        }
    }

    fn plan_boost(
        &mut self,
        action: Option<HvacAction>,
        target: &DeviceSnapshot,
        now_ms: u64,
    ) -> SyncPlan {
        let entering = !self.boost_active;
        if entering {
            // Capture what we are about to overwrite, exactly once per
            // boost episode.
            self.saved_fan_mode = target.fan_mode.clone();
            self.saved_swing_mode = target.swing_mode.clone();
            self.boost_start_ms = Some(now_ms);
            self.boost_active = true;
        }

        // Anything that is not actively heating gets the cooling posture.
        // That includes an idle source inside the minimum-runtime lock.
        let (mode, setpoint) = match action {
            Some(HvacAction::Heating) => (HvacMode::Heat, target.max_temp),
            _ => (HvacMode::Cool, target.min_temp),
        };

        let mut commands = vec![
            PlannedCommand::must(ClimateCommand::SetMode { mode }),
            PlannedCommand::must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                clamp_to_limits(setpoint, target),
            ))),
        ];

        if let Some(fan_mode) = pick_boost_fan(&self.config.boost_fan_preference, &target.fan_modes)
        {
            commands.push(PlannedCommand::must(ClimateCommand::SetFanMode {
                fan_mode: fan_mode.to_string(),
            }));
        }

        if target.swing_modes.iter().any(|m| m == BOOST_SWING_MODE) {
            commands.push(PlannedCommand::must(ClimateCommand::SetSwingMode {
                swing_mode: BOOST_SWING_MODE.to_string(),
            }));
        }

        SyncPlan {
            posture: SyncPosture::Boost { entering },
            commands,
        }
    }

    fn plan_normal(&mut self, source: &DeviceSnapshot, target: &DeviceSnapshot) -> SyncPlan {
        let exiting_boost = self.boost_active;
        let mut commands = Vec::new();

        if exiting_boost {
            // Restores run before the mode change and never abort the plan.
            // The bookkeeping is cleared here regardless of what later
            // happens to these commands, so a failed restore cannot wedge
            // the engine in boost.
            if let Some(fan_mode) = self.saved_fan_mode.take().filter(|m| !m.is_empty()) {
                commands.push(PlannedCommand::best_effort(ClimateCommand::SetFanMode {
                    fan_mode,
                }));
            }
            if let Some(swing_mode) = self.saved_swing_mode.take().filter(|m| !m.is_empty()) {
                commands.push(PlannedCommand::best_effort(ClimateCommand::SetSwingMode {
                    swing_mode,
                }));
            }
            self.boost_active = false;
            self.boost_start_ms = None;
            self.saved_fan_mode = None;
            self.saved_swing_mode = None;
        }

        commands.push(PlannedCommand::must(ClimateCommand::SetMode {
            mode: source.mode,
        }));

        let offset = self.offset(source, target);

        if source.mode.is_dual_setpoint() {
            let low = source
                .target_temperature_low
                .map(|v| clamp_to_limits(v + offset, target));
            let high = source
                .target_temperature_high
                .map(|v| clamp_to_limits(v + offset, target));
            let (low, high) = reorder_band(low, high);
            if low.is_some() || high.is_some() {
                commands.push(PlannedCommand::must(ClimateCommand::SetTemperature(
                    TemperaturePayload::range(low, high),
                )));
            }
        } else if let Some(setpoint) = source.target_temperature {
            commands.push(PlannedCommand::must(ClimateCommand::SetTemperature(
                TemperaturePayload::single(clamp_to_limits(setpoint + offset, target)),
            )));
        }

        SyncPlan {
            posture: SyncPosture::Normal { exiting_boost },
            commands,
        }
    }

    fn offset(&self, source: &DeviceSnapshot, target: &DeviceSnapshot) -> f64 {
        if !self.config.enable_temp_offset {
            return 0.0;
        }
        match (source.current_temperature, target.current_temperature) {
            (Some(source_temp), Some(target_temp)) => {
                (source_temp - target_temp) * self.config.offset_sensitivity
            }
            _ => 0.0,
        }
    }
}

fn pick_boost_fan<'a>(preference: &'a [String], supported: &[String]) -> Option<&'a str> {
    preference
        .iter()
        .map(String::as_str)
        .find(|candidate| supported.iter().any(|m| m == candidate))
}

/// Clamps into the target's advertised limits. Devices occasionally publish
/// an inverted min/max pair, which `f64::clamp` would panic on.
fn clamp_to_limits(value: f64, target: &DeviceSnapshot) -> f64 {
    let (min, max) = if target.min_temp <= target.max_temp {
        (target.min_temp, target.max_temp)
    } else {
        (target.max_temp, target.min_temp)
    };
    value.clamp(min, max)
}

fn reorder_band(low: Option<f64>, high: Option<f64>) -> (Option<f64>, Option<f64>) {
    match (low, high) {
        (Some(l), Some(h)) if l > h => (Some(h), Some(l)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::Liveness;

    const MIN_MS: u64 = 60_000;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn pair() -> SyncPairConfig {
        SyncPairConfig::new("office_thermostat", "office_ac")
    }

    fn source_snapshot(mode: HvacMode, action: Option<HvacAction>) -> DeviceSnapshot {
        DeviceSnapshot {
            entity_id: "office_thermostat".to_string(),
            liveness: Liveness::Valid,
            mode,
            action,
            current_temperature: Some(22.0),
            target_temperature: Some(22.0),
            target_temperature_low: None,
            target_temperature_high: None,
            fan_modes: Vec::new(),
            swing_modes: Vec::new(),
            fan_mode: None,
            swing_mode: None,
            min_temp: 7.0,
            max_temp: 35.0,
        }
    }

    fn target_snapshot() -> DeviceSnapshot {
        DeviceSnapshot {
            entity_id: "office_ac".to_string(),
            liveness: Liveness::Valid,
            mode: HvacMode::Off,
            action: Some(HvacAction::Off),
            current_temperature: Some(22.0),
            target_temperature: Some(24.0),
            target_temperature_low: None,
            target_temperature_high: None,
            fan_modes: strings(&["low", "medium", "high", "auto"]),
            swing_modes: strings(&["auto", "horizontal"]),
            fan_mode: Some("low".to_string()),
            swing_mode: Some("horizontal".to_string()),
            min_temp: 16.0,
            max_temp: 30.0,
        }
    }

    fn must(command: ClimateCommand) -> PlannedCommand {
        PlannedCommand {
            command,
            on_failure: FailurePolicy::Abort,
        }
    }

    fn best_effort(command: ClimateCommand) -> PlannedCommand {
        PlannedCommand {
            command,
            on_failure: FailurePolicy::Continue,
        }
    }

    #[test]
    fn mirrors_mode_and_setpoint_when_idle() {
        let mut engine = SyncEngine::new(pair());
        let source = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));
        let plan = engine.plan_cycle(&source, &target_snapshot(), 1_000).unwrap();

        assert_eq!(
            plan.posture,
            SyncPosture::Normal {
                exiting_boost: false
            }
        );
        assert_eq!(
            plan.commands,
            vec![
                must(ClimateCommand::SetMode {
                    mode: HvacMode::Heat
                }),
                must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                    22.0
                ))),
            ]
        );
    }

    #[test]
    fn offset_scales_with_sensitivity() {
        let mut source = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));
        source.current_temperature = Some(22.0);
        let mut target = target_snapshot();
        target.current_temperature = Some(20.0);

        let mut engine = SyncEngine::new(pair());
        let plan = engine.plan_cycle(&source, &target, 1_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                24.0
            )))
        );

        let mut config = pair();
        config.offset_sensitivity = 0.5;
        let mut engine = SyncEngine::new(config);
        let plan = engine.plan_cycle(&source, &target, 1_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                23.0
            )))
        );
    }

    #[test]
    fn offset_zero_when_either_reading_missing() {
        let mut engine = SyncEngine::new(pair());
        let mut source = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));
        let mut target = target_snapshot();
        target.current_temperature = None;

        let plan = engine.plan_cycle(&source, &target, 1_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                22.0
            )))
        );

        source.current_temperature = None;
        target.current_temperature = Some(18.0);
        let plan = engine.plan_cycle(&source, &target, 2_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                22.0
            )))
        );
    }

    #[test]
    fn offset_disabled_by_config() {
        let mut config = pair();
        config.enable_temp_offset = false;
        let mut engine = SyncEngine::new(config);

        let source = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));
        let mut target = target_snapshot();
        target.current_temperature = Some(18.0);

        let plan = engine.plan_cycle(&source, &target, 1_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                22.0
            )))
        );
    }

    #[test]
    fn setpoint_clamps_to_target_limits() {
        let mut engine = SyncEngine::new(pair());
        let mut source = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));

        source.target_temperature = Some(34.0);
        let plan = engine.plan_cycle(&source, &target_snapshot(), 1_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                30.0
            )))
        );

        source.target_temperature = Some(10.0);
        let plan = engine.plan_cycle(&source, &target_snapshot(), 2_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                16.0
            )))
        );
    }

    #[test]
    fn band_setpoints_clamp_and_swap() {
        let mut engine = SyncEngine::new(pair());
        let mut source = source_snapshot(HvacMode::HeatCool, Some(HvacAction::Idle));
        source.target_temperature = None;

        // Offsets pushed the band inside out; the engine reorders instead of
        // sending low > high to the device.
        source.target_temperature_low = Some(26.0);
        source.target_temperature_high = Some(24.0);
        let plan = engine.plan_cycle(&source, &target_snapshot(), 1_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::range(
                Some(24.0),
                Some(26.0)
            )))
        );

        source.target_temperature_low = Some(10.0);
        source.target_temperature_high = Some(34.0);
        let plan = engine.plan_cycle(&source, &target_snapshot(), 2_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::range(
                Some(16.0),
                Some(30.0)
            )))
        );
    }

    #[test]
    fn band_sends_partial_and_skips_empty() {
        let mut engine = SyncEngine::new(pair());
        let mut source = source_snapshot(HvacMode::HeatCool, Some(HvacAction::Idle));
        source.target_temperature = None;

        source.target_temperature_low = Some(20.0);
        let plan = engine.plan_cycle(&source, &target_snapshot(), 1_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::range(
                Some(20.0),
                None
            )))
        );

        source.target_temperature_low = None;
        source.target_temperature_high = Some(25.0);
        let plan = engine.plan_cycle(&source, &target_snapshot(), 2_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::range(
                None,
                Some(25.0)
            )))
        );

        source.target_temperature_high = None;
        let plan = engine.plan_cycle(&source, &target_snapshot(), 3_000).unwrap();
        assert_eq!(
            plan.commands,
            vec![must(ClimateCommand::SetMode {
                mode: HvacMode::HeatCool
            })]
        );
    }

    #[test]
    fn single_mode_without_setpoint_sends_mode_only() {
        let mut engine = SyncEngine::new(pair());
        let mut source = source_snapshot(HvacMode::FanOnly, Some(HvacAction::Fan));
        source.target_temperature = None;

        let plan = engine.plan_cycle(&source, &target_snapshot(), 1_000).unwrap();
        assert_eq!(
            plan.commands,
            vec![must(ClimateCommand::SetMode {
                mode: HvacMode::FanOnly
            })]
        );
    }

    #[test]
    fn boost_disabled_never_boosts() {
        let mut config = pair();
        config.enable_boost_mode = false;
        let mut engine = SyncEngine::new(config);
        let source = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));

        for now in [0, 5 * MIN_MS, 100 * MIN_MS] {
            let plan = engine.plan_cycle(&source, &target_snapshot(), now).unwrap();
            assert_eq!(
                plan.posture,
                SyncPosture::Normal {
                    exiting_boost: false
                }
            );
        }
        assert!(!engine.boost_active());
    }

    #[test]
    fn boost_waits_out_activation_delay() {
        let mut engine = SyncEngine::new(pair());
        let source = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));
        let start = 1_000;

        let plan = engine.plan_cycle(&source, &target_snapshot(), start).unwrap();
        assert_eq!(
            plan.posture,
            SyncPosture::Normal {
                exiting_boost: false
            }
        );

        let plan = engine
            .plan_cycle(&source, &target_snapshot(), start + 5 * MIN_MS - 1)
            .unwrap();
        assert_eq!(
            plan.posture,
            SyncPosture::Normal {
                exiting_boost: false
            }
        );

        let plan = engine
            .plan_cycle(&source, &target_snapshot(), start + 5 * MIN_MS)
            .unwrap();
        assert_eq!(plan.posture, SyncPosture::Boost { entering: true });
        assert_eq!(
            plan.commands,
            vec![
                must(ClimateCommand::SetMode {
                    mode: HvacMode::Heat
                }),
                must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                    30.0
                ))),
                must(ClimateCommand::SetFanMode {
                    fan_mode: "high".to_string()
                }),
                must(ClimateCommand::SetSwingMode {
                    swing_mode: "auto".to_string()
                }),
            ]
        );
        assert!(engine.boost_active());
    }

    #[test]
    fn action_gap_resets_activation_clock() {
        let mut engine = SyncEngine::new(pair());
        let heating = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));
        let idle = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));

        let _ = engine.plan_cycle(&heating, &target_snapshot(), 0).unwrap();
        let _ = engine.plan_cycle(&idle, &target_snapshot(), 2 * MIN_MS).unwrap();

        // Heating resumed at 3min; the five-minute wait starts over.
        let _ = engine
            .plan_cycle(&heating, &target_snapshot(), 3 * MIN_MS)
            .unwrap();
        let plan = engine
            .plan_cycle(&heating, &target_snapshot(), 8 * MIN_MS - 1)
            .unwrap();
        assert_eq!(
            plan.posture,
            SyncPosture::Normal {
                exiting_boost: false
            }
        );

        let plan = engine
            .plan_cycle(&heating, &target_snapshot(), 8 * MIN_MS)
            .unwrap();
        assert_eq!(plan.posture, SyncPosture::Boost { entering: true });
    }

    #[test]
    fn cooling_boost_targets_minimum() {
        let mut config = pair();
        config.boost_activation_delay_min = 0;
        let mut engine = SyncEngine::new(config);
        let source = source_snapshot(HvacMode::Cool, Some(HvacAction::Cooling));

        let plan = engine.plan_cycle(&source, &target_snapshot(), 0).unwrap();
        assert_eq!(plan.posture, SyncPosture::Boost { entering: true });
        assert_eq!(
            plan.commands,
            vec![
                must(ClimateCommand::SetMode {
                    mode: HvacMode::Cool
                }),
                must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                    16.0
                ))),
                must(ClimateCommand::SetFanMode {
                    fan_mode: "high".to_string()
                }),
                must(ClimateCommand::SetSwingMode {
                    swing_mode: "auto".to_string()
                }),
            ]
        );
    }

    #[test]
    fn boost_holds_until_minimum_runtime() {
        let mut config = pair();
        config.boost_activation_delay_min = 0;
        let mut engine = SyncEngine::new(config);
        let heating = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));
        let idle = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));

        let plan = engine.plan_cycle(&heating, &target_snapshot(), 0).unwrap();
        assert_eq!(plan.posture, SyncPosture::Boost { entering: true });

        // The action stopped, but one tick short of the minimum runtime the
        // boost still holds. A held boost without active heating plans the
        // cooling posture.
        let plan = engine
            .plan_cycle(&idle, &target_snapshot(), 10 * MIN_MS - 1)
            .unwrap();
        assert_eq!(plan.posture, SyncPosture::Boost { entering: false });
        assert_eq!(
            plan.commands[..2],
            [
                must(ClimateCommand::SetMode {
                    mode: HvacMode::Cool
                }),
                must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                    16.0
                ))),
            ]
        );

        let plan = engine
            .plan_cycle(&idle, &target_snapshot(), 10 * MIN_MS)
            .unwrap();
        assert_eq!(
            plan.posture,
            SyncPosture::Normal {
                exiting_boost: true
            }
        );
        assert!(!engine.boost_active());
    }

    #[test]
    fn held_boost_does_not_recapture() {
        let mut config = pair();
        config.boost_activation_delay_min = 0;
        let mut engine = SyncEngine::new(config);
        let heating = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));

        let _ = engine.plan_cycle(&heating, &target_snapshot(), 0).unwrap();

        // By the next cycle the target reports the boosted modes; they must
        // not replace the captured originals.
        let mut boosted_target = target_snapshot();
        boosted_target.fan_mode = Some("high".to_string());
        boosted_target.swing_mode = Some("auto".to_string());
        let plan = engine.plan_cycle(&heating, &boosted_target, MIN_MS).unwrap();
        assert_eq!(plan.posture, SyncPosture::Boost { entering: false });

        let status = engine.status(MIN_MS);
        assert_eq!(status.saved_fan_mode, Some("low".to_string()));
        assert_eq!(status.saved_swing_mode, Some("horizontal".to_string()));
    }

    #[test]
    fn boost_exit_restores_then_clears() {
        let mut config = pair();
        config.boost_activation_delay_min = 0;
        config.boost_minimum_runtime_min = 0;
        let mut engine = SyncEngine::new(config);
        let heating = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));
        let idle = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));

        let _ = engine.plan_cycle(&heating, &target_snapshot(), 0).unwrap();
        assert!(engine.boost_active());

        let plan = engine.plan_cycle(&idle, &target_snapshot(), MIN_MS).unwrap();
        assert_eq!(
            plan.posture,
            SyncPosture::Normal {
                exiting_boost: true
            }
        );
        assert_eq!(
            plan.commands,
            vec![
                best_effort(ClimateCommand::SetFanMode {
                    fan_mode: "low".to_string()
                }),
                best_effort(ClimateCommand::SetSwingMode {
                    swing_mode: "horizontal".to_string()
                }),
                must(ClimateCommand::SetMode {
                    mode: HvacMode::Heat
                }),
                must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                    22.0
                ))),
            ]
        );

        let status = engine.status(MIN_MS);
        assert!(!status.boost_active);
        assert_eq!(status.boost_runtime_ms, 0);
        assert_eq!(status.saved_fan_mode, None);
        assert_eq!(status.saved_swing_mode, None);
    }

    #[test]
    fn boost_exit_without_saved_modes_skips_restores() {
        let mut config = pair();
        config.boost_activation_delay_min = 0;
        config.boost_minimum_runtime_min = 0;
        let mut engine = SyncEngine::new(config);
        let heating = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));
        let idle = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));

        let mut bare_target = target_snapshot();
        bare_target.fan_mode = None;
        bare_target.swing_mode = None;

        let _ = engine.plan_cycle(&heating, &bare_target, 0).unwrap();
        let plan = engine.plan_cycle(&idle, &bare_target, MIN_MS).unwrap();
        assert_eq!(
            plan.commands,
            vec![
                must(ClimateCommand::SetMode {
                    mode: HvacMode::Heat
                }),
                must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                    22.0
                ))),
            ]
        );
    }

    #[test]
    fn unavailable_source_plans_nothing_and_preserves_clocks() {
        let mut engine = SyncEngine::new(pair());
        let heating = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));
        let mut offline = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));
        offline.liveness = Liveness::Unavailable;

        let _ = engine.plan_cycle(&heating, &target_snapshot(), 0).unwrap();
        assert!(engine
            .plan_cycle(&offline, &target_snapshot(), 2 * MIN_MS)
            .is_none());

        // The dropout did not reset the continuity clock, so the delay is
        // measured from the original start.
        let plan = engine
            .plan_cycle(&heating, &target_snapshot(), 5 * MIN_MS)
            .unwrap();
        assert_eq!(plan.posture, SyncPosture::Boost { entering: true });
    }

    #[test]
    fn reissues_identical_plan_when_nothing_changed() {
        let mut engine = SyncEngine::new(pair());
        let source = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));

        let first = engine.plan_cycle(&source, &target_snapshot(), 0).unwrap();
        let second = engine
            .plan_cycle(&source, &target_snapshot(), MIN_MS)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.commands.len(), 2);
    }

    #[test]
    fn boost_fan_picks_first_supported_preference() {
        let mut config = pair();
        config.boost_activation_delay_min = 0;
        let mut engine = SyncEngine::new(config.clone());
        let source = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));

        let mut target = target_snapshot();
        target.fan_modes = strings(&["low", "medium", "powerful"]);
        let plan = engine.plan_cycle(&source, &target, 0).unwrap();
        assert!(plan.commands.contains(&must(ClimateCommand::SetFanMode {
            fan_mode: "powerful".to_string()
        })));

        // No overlap with the preference list and no auto swing: boost still
        // engages with mode and setpoint alone.
        let mut engine = SyncEngine::new(config);
        let mut target = target_snapshot();
        target.fan_modes = strings(&["quiet"]);
        target.swing_modes = strings(&["vertical"]);
        let plan = engine.plan_cycle(&source, &target, 0).unwrap();
        assert_eq!(plan.posture, SyncPosture::Boost { entering: true });
        assert_eq!(
            plan.commands,
            vec![
                must(ClimateCommand::SetMode {
                    mode: HvacMode::Heat
                }),
                must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                    30.0
                ))),
            ]
        );
    }

    #[test]
    fn inverted_target_limits_do_not_panic() {
        let mut engine = SyncEngine::new(pair());
        let mut source = source_snapshot(HvacMode::Heat, Some(HvacAction::Idle));
        source.target_temperature = Some(34.0);

        let mut target = target_snapshot();
        target.min_temp = 30.0;
        target.max_temp = 16.0;

        let plan = engine.plan_cycle(&source, &target, 1_000).unwrap();
        assert_eq!(
            plan.commands[1],
            must(ClimateCommand::SetTemperature(TemperaturePayload::single(
                30.0
            )))
        );
    }

    #[test]
    fn status_reports_boost_runtime_and_lock() {
        let mut config = pair();
        config.boost_activation_delay_min = 0;
        let mut engine = SyncEngine::new(config);
        let heating = source_snapshot(HvacMode::Heat, Some(HvacAction::Heating));

        let _ = engine.plan_cycle(&heating, &target_snapshot(), 0).unwrap();
        let status = engine.status(4 * MIN_MS);

        assert!(status.boost_active);
        assert_eq!(status.boost_runtime_ms, 4 * MIN_MS);
        assert_eq!(status.boost_lock_remaining_ms, 6 * MIN_MS);
        assert_eq!(status.continuous_action_ms, 4 * MIN_MS);
        assert_eq!(status.saved_fan_mode, Some("low".to_string()));
        assert_eq!(status.saved_swing_mode, Some("horizontal".to_string()));
    }
}
