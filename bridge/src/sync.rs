use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use chrono::Utc;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};

use climate_sync_common::{
    DeviceSnapshot, EngineStatus, FailurePolicy, SyncEngine, SyncPairConfig, SyncPlan, SyncPosture,
};

use crate::{invoker::CommandInvoker, registry::StateRegistry};

/// Result of the most recent completed cycle, for the status API.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    pub last_posture: Option<&'static str>,
    pub last_synced_epoch: Option<i64>,
    pub last_error: Option<String>,
}

/// Drives one configured pair: reads both entities, asks the engine for a
/// plan, and executes it against the target.
///
/// Event-triggered and periodic cycles go through the same `run_cycle`; an
/// atomic guard makes overlapping entries a cheap no-op, and commands are
/// issued outside the engine lock so a slow device never blocks planning
/// for other callers.
pub struct SyncRunner<I> {
    config: SyncPairConfig,
    engine: Mutex<SyncEngine>,
    registry: Arc<StateRegistry>,
    invoker: Arc<I>,
    in_flight: AtomicBool,
    outcome: Mutex<CycleOutcome>,
}

impl<I: CommandInvoker + 'static> SyncRunner<I> {
    pub fn new(
        mut config: SyncPairConfig,
        registry: Arc<StateRegistry>,
        invoker: Arc<I>,
    ) -> Arc<Self> {
        config.sanitize();
        Arc::new(Self {
            engine: Mutex::new(SyncEngine::new(config.clone())),
            config,
            registry,
            invoker,
            in_flight: AtomicBool::new(false),
            outcome: Mutex::new(CycleOutcome::default()),
        })
    }

    pub fn config(&self) -> &SyncPairConfig {
        &self.config
    }

    pub async fn engine_status(&self, now_ms: u64) -> EngineStatus {
        self.engine.lock().await.status(now_ms)
    }

    pub async fn outcome(&self) -> CycleOutcome {
        self.outcome.lock().await.clone()
    }

    /// Entry point for source state-change events. Events arriving while a
    /// cycle is in flight are dropped; the cycle that is already running
    /// reads fresh state anyway, and the periodic timer covers the rest.
    pub fn on_source_event(
        self: &Arc<Self>,
        old: Option<&DeviceSnapshot>,
        new: Option<&DeviceSnapshot>,
    ) {
        let source_id = &self.config.source_entity;
        let target_id = &self.config.target_entity;

        if self.in_flight.load(Ordering::Acquire) {
            debug!("[{source_id} -> {target_id}] sync in progress, dropping source event");
            return;
        }
        let Some(new) = new else {
            debug!("[{source_id} -> {target_id}] source event without new state, ignoring");
            return;
        };
        if !new.is_live() {
            debug!(
                "[{source_id} -> {target_id}] source is {}, ignoring event",
                new.liveness.as_str()
            );
            return;
        }

        let old_mode = old.filter(|s| s.is_live()).map(|s| s.mode.as_str());
        info!(
            "[{source_id} -> {target_id}] source changed ({} -> {}, action {})",
            old_mode.unwrap_or("?"),
            new.mode.as_str(),
            new.action.map(|a| a.as_str()).unwrap_or("?"),
        );

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = runner.run_cycle().await {
                error!(
                    "[{} -> {}] sync cycle failed: {err:#}",
                    runner.config.source_entity, runner.config.target_entity
                );
            }
        });
    }

    /// Periodic safety net for drift the event path missed. The first tick
    /// fires immediately, which doubles as the initial sync after startup.
    pub fn spawn_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(runner.config.sync_interval_ms()));
            loop {
                interval.tick().await;
                if let Err(err) = runner.run_cycle().await {
                    error!(
                        "[{} -> {}] periodic sync failed: {err:#}",
                        runner.config.source_entity, runner.config.target_entity
                    );
                }
            }
        })
    }

    pub async fn run_cycle(&self) -> anyhow::Result<()> {
        let source_id = &self.config.source_entity;
        let target_id = &self.config.target_entity;

        let Some(_guard) = CycleGuard::try_acquire(&self.in_flight) else {
            debug!("[{source_id} -> {target_id}] sync already in progress, skipping");
            return Ok(());
        };

        let Some(source) = self.registry.read_state(source_id).await else {
            warn!("[{source_id} -> {target_id}] no state seen for source yet, skipping cycle");
            return Ok(());
        };
        let Some(target) = self.registry.read_state(target_id).await else {
            warn!("[{source_id} -> {target_id}] no state seen for target yet, skipping cycle");
            return Ok(());
        };

        let plan = {
            let mut engine = self.engine.lock().await;
            engine.plan_cycle(&source, &target, monotonic_ms())
        };
        let Some(plan) = plan else {
            debug!(
                "[{source_id} -> {target_id}] source is {}, skipping cycle",
                source.liveness.as_str()
            );
            return Ok(());
        };

        match plan.posture {
            SyncPosture::Boost { entering: true } => {
                info!("[{source_id} -> {target_id}] boost engaged");
            }
            SyncPosture::Normal { exiting_boost: true } => {
                info!("[{source_id} -> {target_id}] boost released, restoring normal sync");
            }
            _ => debug!(
                "[{source_id} -> {target_id}] {} cycle with {} commands",
                plan.posture.as_str(),
                plan.commands.len()
            ),
        }

        let result = self.execute_plan(&plan).await;

        let mut outcome = self.outcome.lock().await;
        outcome.last_posture = Some(plan.posture.as_str());
        match &result {
            Ok(()) => {
                outcome.last_synced_epoch = Some(Utc::now().timestamp());
                outcome.last_error = None;
            }
            Err(err) => outcome.last_error = Some(format!("{err:#}")),
        }
        result
    }

    async fn execute_plan(&self, plan: &SyncPlan) -> anyhow::Result<()> {
        let target_id = &self.config.target_entity;
        for planned in &plan.commands {
            match self.invoker.invoke(target_id, &planned.command).await {
                Ok(()) => debug!("[{target_id}] {} applied", planned.command.kind()),
                Err(err) if planned.on_failure == FailurePolicy::Continue => {
                    warn!(
                        "[{target_id}] {} failed, continuing: {err:#}",
                        planned.command.kind()
                    );
                }
                Err(err) => {
                    return Err(err.context(format!("{} on {target_id}", planned.command.kind())));
                }
            }
        }
        Ok(())
    }
}

struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then_some(Self { flag })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub(crate) fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
