use std::{
    collections::HashSet,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex, task::JoinHandle};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use climate_sync_common::{
    availability_topic, parse_entity_topic, state_topic, BridgeConfig, DeviceSnapshot,
    EngineStatus, EntityChannel, NetworkConfig, StatePayload, SyncPairConfig,
    AVAILABILITY_OFFLINE, AVAILABILITY_ONLINE,
};

use crate::{
    invoker::MqttInvoker,
    registry::{StateChange, StateRegistry},
    sync::{monotonic_ms, SyncRunner},
};

#[derive(Clone)]
struct AppState {
    registry: Arc<StateRegistry>,
    pairs: Arc<Mutex<Vec<PairSlot>>>,
    subscribed: Arc<Mutex<HashSet<String>>>,
    invoker: Arc<MqttInvoker>,
    mqtt: AsyncClient,
    store: AppStore,
}

struct PairSlot {
    runner: Arc<SyncRunner<MqttInvoker>>,
    timer: JoinHandle<()>,
}

#[derive(Clone)]
struct AppStore {
    config_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct BridgeStatusView {
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
    pairs: Vec<PairStatusView>,
}

#[derive(Debug, Serialize)]
struct PairStatusView {
    #[serde(rename = "sourceEntity")]
    source_entity: String,
    #[serde(rename = "targetEntity")]
    target_entity: String,
    #[serde(rename = "sourceLiveness")]
    source_liveness: &'static str,
    #[serde(rename = "targetLiveness")]
    target_liveness: &'static str,
    engine: EngineStatus,
    #[serde(rename = "lastPosture")]
    last_posture: Option<&'static str>,
    #[serde(rename = "lastSyncedEpoch")]
    last_synced_epoch: Option<i64>,
    #[serde(rename = "lastError")]
    last_error: Option<String>,
}

#[derive(Debug, Serialize)]
struct NetworkConfigView {
    #[serde(rename = "mqttHost")]
    mqtt_host: String,
    #[serde(rename = "mqttPort")]
    mqtt_port: u16,
    #[serde(rename = "mqttUser")]
    mqtt_user: String,
    #[serde(rename = "mqttPassSet")]
    mqtt_pass_set: bool,
}

#[derive(Debug, Deserialize)]
struct NetworkConfigUpdate {
    #[serde(rename = "mqttHost")]
    mqtt_host: String,
    #[serde(rename = "mqttPort")]
    mqtt_port: u16,
    #[serde(rename = "mqttUser")]
    mqtt_user: String,
    #[serde(rename = "mqttPass", default)]
    mqtt_pass: Option<String>,
}

#[derive(Debug, Serialize)]
struct NetworkUpdateResponse {
    #[serde(rename = "restartRequired")]
    restart_required: bool,
    network: NetworkConfigView,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 4096;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut config = store.load_config().await.unwrap_or_else(|err| {
        warn!("failed to load bridge config from store: {err:#}");
        BridgeConfig::default()
    });
    config.sanitize();
    if let Err(err) = config.validate() {
        warn!("stored pair configuration is invalid, starting without pairs: {err}");
        config.pairs.clear();
    }

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(config.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(config.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("climate-sync-bridge", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(config.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(config.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        registry: Arc::new(StateRegistry::new()),
        pairs: Arc::new(Mutex::new(Vec::new())),
        subscribed: Arc::new(Mutex::new(HashSet::new())),
        invoker: Arc::new(MqttInvoker::new(mqtt.clone())),
        mqtt,
        store,
    };

    install_pairs(&app_state, &config.pairs).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/pairs", get(handle_get_pairs).put(handle_put_pairs))
        .route("/api/pairs/{index}/sync", post(handle_post_pair_sync))
        .route(
            "/api/network",
            get(handle_get_network).put(handle_put_network),
        )
        .fallback_service(ServeDir::new(web_root))
        .with_state(app_state);

    let port = std::env::var("BRIDGE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().unwrap();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind bridge server at {addr}"))?;

    info!("bridge listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Replaces the running pair set. Timers for the old set are aborted before
/// the new runners start, so a removed pair never fires again; subscriptions
/// are diffed rather than rebuilt to avoid dropping retained state replays.
async fn install_pairs(state: &AppState, configs: &[SyncPairConfig]) -> anyhow::Result<()> {
    let mut slots = state.pairs.lock().await;
    for slot in slots.drain(..) {
        slot.timer.abort();
    }

    let mut wanted = HashSet::new();
    for config in configs {
        for entity in [&config.source_entity, &config.target_entity] {
            wanted.insert(state_topic(entity));
            wanted.insert(availability_topic(entity));
        }
    }
    sync_subscriptions(state, wanted).await?;

    for config in configs {
        let runner = SyncRunner::new(
            config.clone(),
            Arc::clone(&state.registry),
            Arc::clone(&state.invoker),
        );
        let timer = runner.spawn_timer();
        slots.push(PairSlot { runner, timer });
    }

    info!("installed {} sync pair(s)", slots.len());
    Ok(())
}

async fn sync_subscriptions(state: &AppState, wanted: HashSet<String>) -> anyhow::Result<()> {
    let mut subscribed = state.subscribed.lock().await;
    for topic in subscribed.difference(&wanted) {
        state.mqtt.unsubscribe(topic.clone()).await?;
    }
    for topic in wanted.difference(&subscribed) {
        state.mqtt.subscribe(topic.clone(), QoS::AtMostOnce).await?;
    }
    *subscribed = wanted;
    Ok(())
}

/// The broker starts each connection with a clean session, so every ConnAck
/// needs the full subscription set replayed.
async fn resubscribe_all(state: &AppState) {
    let topics: Vec<String> = state.subscribed.lock().await.iter().cloned().collect();
    for topic in topics {
        if let Err(err) = state.mqtt.subscribe(topic, QoS::AtMostOnce).await {
            warn!("mqtt resubscribe failed: {err}");
        }
    }
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    resubscribe_all(&app_state).await;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn handle_mqtt_message(
    state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let Some((entity_id, channel)) = parse_entity_topic(&topic) else {
        return Ok(());
    };

    let change = match channel {
        EntityChannel::State => {
            let payload = match serde_json::from_slice::<StatePayload>(&payload) {
                Ok(payload) => payload,
                Err(err) => {
                    // The last good payload stays authoritative.
                    warn!("malformed state payload on {topic}: {err}");
                    return Ok(());
                }
            };
            state.registry.apply_state_payload(entity_id, payload).await
        }
        EntityChannel::Availability => {
            let message = String::from_utf8(payload).context("non utf8 availability payload")?;
            let online = match message.as_str() {
                AVAILABILITY_ONLINE => true,
                AVAILABILITY_OFFLINE => false,
                other => {
                    warn!("unrecognized availability payload on {topic}: {other}");
                    return Ok(());
                }
            };
            state.registry.apply_availability(entity_id, online).await
        }
        // Command channels are written by the bridge, not consumed.
        EntityChannel::SetMode
        | EntityChannel::SetTemperature
        | EntityChannel::SetFanMode
        | EntityChannel::SetSwingMode => return Ok(()),
    };

    dispatch_source_change(state, &change).await;
    Ok(())
}

async fn dispatch_source_change(state: &AppState, change: &StateChange) {
    let runners: Vec<Arc<SyncRunner<MqttInvoker>>> = {
        let slots = state.pairs.lock().await;
        slots
            .iter()
            .filter(|slot| slot.runner.config().source_entity == change.entity_id)
            .map(|slot| Arc::clone(&slot.runner))
            .collect()
    };

    for runner in runners {
        runner.on_source_event(change.old.as_ref(), change.new.as_ref());
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let now_ms = monotonic_ms();
    let runners: Vec<Arc<SyncRunner<MqttInvoker>>> = {
        let slots = state.pairs.lock().await;
        slots.iter().map(|slot| Arc::clone(&slot.runner)).collect()
    };

    let mut pairs = Vec::with_capacity(runners.len());
    for runner in runners {
        let config = runner.config();
        let source = state.registry.read_state(&config.source_entity).await;
        let target = state.registry.read_state(&config.target_entity).await;
        let outcome = runner.outcome().await;

        pairs.push(PairStatusView {
            source_entity: config.source_entity.clone(),
            target_entity: config.target_entity.clone(),
            source_liveness: liveness_label(source.as_ref()),
            target_liveness: liveness_label(target.as_ref()),
            engine: runner.engine_status(now_ms).await,
            last_posture: outcome.last_posture,
            last_synced_epoch: outcome.last_synced_epoch,
            last_error: outcome.last_error,
        });
    }

    Json(BridgeStatusView {
        now_epoch: Utc::now().timestamp(),
        pairs,
    })
}

async fn handle_get_pairs(State(state): State<AppState>) -> impl IntoResponse {
    let pairs: Vec<SyncPairConfig> = {
        let slots = state.pairs.lock().await;
        slots.iter().map(|slot| slot.runner.config().clone()).collect()
    };
    Json(pairs)
}

async fn handle_put_pairs(
    State(state): State<AppState>,
    Json(pairs): Json<Vec<SyncPairConfig>>,
) -> impl IntoResponse {
    let mut config = state.store.load_config().await.unwrap_or_else(|err| {
        warn!("failed to load existing config for pair update: {err:#}");
        BridgeConfig::default()
    });
    config.pairs = pairs;
    config.sanitize();
    if let Err(err) = config.validate() {
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    }

    if let Err(err) = state.store.save_config(&config).await {
        warn!("failed to persist pair update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist pair configuration",
        );
    }

    if let Err(err) = install_pairs(&state, &config.pairs).await {
        warn!("failed to apply pair update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to apply pair configuration",
        );
    }

    handle_get_pairs(State(state)).await.into_response()
}

async fn handle_post_pair_sync(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> impl IntoResponse {
    let runner = {
        let slots = state.pairs.lock().await;
        slots.get(index).map(|slot| Arc::clone(&slot.runner))
    };
    let Some(runner) = runner else {
        return error_response(StatusCode::NOT_FOUND, "No pair at that index");
    };

    if let Err(err) = runner.run_cycle().await {
        warn!("manual sync failed: {err:#}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Sync cycle failed");
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_get_network(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.store.load_config().await.unwrap_or_else(|err| {
        warn!("failed to load network config from store: {err:#}");
        BridgeConfig::default()
    });
    Json(build_network_config_view(&config.network))
}

async fn handle_put_network(
    State(state): State<AppState>,
    Json(update): Json<NetworkConfigUpdate>,
) -> impl IntoResponse {
    if update.mqtt_host.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "mqttHost cannot be empty");
    }
    if update.mqtt_port == 0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "mqttPort must be between 1 and 65535",
        );
    }

    let mut config = state.store.load_config().await.unwrap_or_else(|err| {
        warn!("failed to load existing config for network update: {err:#}");
        BridgeConfig::default()
    });

    let previous = config.network.clone();
    config.network.mqtt_host = update.mqtt_host;
    config.network.mqtt_port = update.mqtt_port;
    config.network.mqtt_user = update.mqtt_user;
    if let Some(pass) = update.mqtt_pass {
        config.network.mqtt_pass = pass;
    }

    if let Err(err) = state.store.save_config(&config).await {
        warn!("failed to persist network config update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist network settings",
        );
    }

    let payload = NetworkUpdateResponse {
        restart_required: network_restart_required(&previous, &config.network),
        network: build_network_config_view(&config.network),
    };
    Json(payload).into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("CLIMATE_SYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.climate-sync"));

        Self {
            config_path: Arc::new(data_dir.join("bridge.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_config(&self) -> anyhow::Result<BridgeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.config_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<BridgeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BridgeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_config(&self, config: &BridgeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.config_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(config)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

fn build_network_config_view(network: &NetworkConfig) -> NetworkConfigView {
    NetworkConfigView {
        mqtt_host: network.mqtt_host.clone(),
        mqtt_port: network.mqtt_port,
        mqtt_user: network.mqtt_user.clone(),
        mqtt_pass_set: !network.mqtt_pass.is_empty(),
    }
}

fn network_restart_required(previous: &NetworkConfig, current: &NetworkConfig) -> bool {
    previous != current
}

fn liveness_label(snapshot: Option<&DeviceSnapshot>) -> &'static str {
    snapshot.map(|s| s.liveness.as_str()).unwrap_or("absent")
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
