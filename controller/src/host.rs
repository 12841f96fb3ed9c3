use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, oneshot, watch, Mutex, Notify},
};
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use hvac_common::{
    actuate_topic, epoch_ms, parse_heartbeat_topic, parse_reading, CommandError, CommandRequest,
    EngineAction, Equipment, ModeArbiter, PersistedSettings, PhaseScheduler, Reading,
    RuntimeConfig, SystemSnapshot, TOPIC_CMD, TOPIC_CONTROLLER_SCHEDULE_STATE,
    TOPIC_CONTROLLER_STATE, TOPIC_HEARTBEAT_FILTER, TOPIC_HEARTBEAT_PREFIX, TOPIC_SENSOR_FILTER, TOPIC_SENSOR_PREFIX,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const INBOUND_QUEUE_DEPTH: usize = 256;
const COMMAND_QUEUE_DEPTH: usize = 32;
const SNAPSHOT_BUS_DEPTH: usize = 16;
const ACTUATION_RESYNC_PERIOD: Duration = Duration::from_secs(60);

type Reply = oneshot::Sender<Result<SystemSnapshot, CommandError>>;

enum ControlRequest {
    Command(CommandRequest),
    ReplaceSchedule(PhaseScheduler),
}

struct Envelope {
    request: ControlRequest,
    reply: Option<Reply>,
}

/// Everything that must survive a restart.
#[derive(Debug, Clone, PartialEq)]
struct Persisted {
    settings: PersistedSettings,
    schedule: PhaseScheduler,
}

#[derive(Clone)]
struct AppState {
    commands: mpsc::Sender<Envelope>,
    snapshots: watch::Receiver<SystemSnapshot>,
    persisted: watch::Receiver<Persisted>,
}

struct Inbound {
    heartbeats: mpsc::Sender<String>,
    readings: mpsc::Sender<Reading>,
    commands: mpsc::Sender<Envelope>,
    connected: Arc<Notify>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    schedule_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let schedule = store.load_schedule().await.unwrap_or_else(|err| {
        warn!("failed to load schedule from store: {err:#}");
        PhaseScheduler::default()
    });

    let timezone = resolve_timezone(&runtime.timezone);
    let arbiter = ModeArbiter::new(
        runtime.hvac.clone(),
        runtime.settings.clone(),
        &runtime.devices,
        schedule,
    );

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("hvac-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let now = local_now(timezone);
    let (heartbeat_tx, heartbeat_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
    let (reading_tx, reading_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (snapshot_tx, snapshot_rx) = watch::channel(arbiter.snapshot(now));
    let (persist_tx, persist_rx) = watch::channel(Persisted {
        settings: arbiter.settings().clone(),
        schedule: arbiter.scheduler().clone(),
    });
    let (bus, bus_rx) = broadcast::channel(SNAPSHOT_BUS_DEPTH);
    let publish_now = Arc::new(Notify::new());
    let resync_actuation = Arc::new(Notify::new());

    subscribe_topics(&mqtt).await?;
    spawn_mqtt_loop(
        Inbound {
            heartbeats: heartbeat_tx,
            readings: reading_tx,
            commands: command_tx.clone(),
            connected: resync_actuation.clone(),
        },
        eventloop,
    );
    spawn_control_loop(ControlLoop {
        arbiter,
        timezone,
        tick_interval: Duration::from_millis(runtime.hvac.tick_interval_ms),
        heartbeats: heartbeat_rx,
        readings: reading_rx,
        commands: command_rx,
        snapshots: snapshot_tx,
        persisted: persist_tx,
        publish_now: publish_now.clone(),
        mqtt: mqtt.clone(),
    });
    spawn_broadcaster(
        snapshot_rx.clone(),
        publish_now,
        bus,
        Duration::from_millis(runtime.hvac.state_publish_interval_ms),
    );
    spawn_actuation_sync(mqtt.clone(), snapshot_rx.clone(), resync_actuation);
    spawn_state_publisher(mqtt.clone(), bus_rx);
    spawn_persist_loop(store, mqtt, persist_rx.clone());

    let app_state = AppState {
        commands: command_tx,
        snapshots: snapshot_rx,
        persisted: persist_rx,
    };

    let web_root = std::env::var("HVAC_WEB_ROOT")
        .unwrap_or_else(|_| format!("{}/web", env!("CARGO_MANIFEST_DIR")));
    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/command", post(handle_post_command))
        .route(
            "/api/schedule",
            get(handle_get_schedule).put(handle_put_schedule),
        )
        .fallback_service(ServeDir::new(web_root))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    for topic in [TOPIC_HEARTBEAT_FILTER, TOPIC_SENSOR_FILTER, TOPIC_CMD] {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(inbound: Inbound, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&inbound, &message.topic, &message.payload).await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    inbound.connected.notify_one();
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

#[derive(Debug, PartialEq)]
enum Route {
    Heartbeat(String),
    Reading(Reading),
    Command(CommandRequest),
    Ignored,
}

/// Classifies one MQTT publish. Pure so it can be tested without a broker.
fn route_message(topic: &str, payload: &[u8]) -> anyhow::Result<Route> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        anyhow::bail!(
            "oversized payload on {topic} ({} bytes)",
            payload.len()
        );
    }
    let message = std::str::from_utf8(payload).context("non utf8 mqtt payload")?;

    if topic == TOPIC_CMD {
        let request = serde_json::from_str::<CommandRequest>(message)
            .with_context(|| format!("invalid command payload {message:?}"))?;
        return Ok(Route::Command(request));
    }
    if topic.starts_with(TOPIC_HEARTBEAT_PREFIX) {
        return Ok(parse_heartbeat_topic(topic)
            .map(|id| Route::Heartbeat(id.to_string()))
            .unwrap_or(Route::Ignored));
    }
    if topic.starts_with(TOPIC_SENSOR_PREFIX) {
        return Ok(parse_reading(topic, message)
            .map(Route::Reading)
            .unwrap_or(Route::Ignored));
    }
    Ok(Route::Ignored)
}

async fn handle_mqtt_message(inbound: &Inbound, topic: &str, payload: &[u8]) -> anyhow::Result<()> {
    match route_message(topic, payload)? {
        Route::Heartbeat(device_id) => inbound
            .heartbeats
            .send(device_id)
            .await
            .context("control loop gone")?,
        Route::Reading(reading) => inbound
            .readings
            .send(reading)
            .await
            .context("control loop gone")?,
        Route::Command(request) => inbound
            .commands
            .send(Envelope {
                request: ControlRequest::Command(request),
                reply: None,
            })
            .await
            .map_err(|_| anyhow::anyhow!("control loop gone"))?,
        Route::Ignored => debug!("ignoring publish on {topic}"),
    }
    Ok(())
}

struct ControlLoop {
    arbiter: ModeArbiter,
    timezone: Tz,
    tick_interval: Duration,
    heartbeats: mpsc::Receiver<String>,
    readings: mpsc::Receiver<Reading>,
    commands: mpsc::Receiver<Envelope>,
    snapshots: watch::Sender<SystemSnapshot>,
    persisted: watch::Sender<Persisted>,
    publish_now: Arc<Notify>,
    mqtt: AsyncClient,
}

/// Sole owner of the arbiter. Inputs are drained between ticks, so a command
/// is either fully applied before a tick or not at all.
fn spawn_control_loop(mut control: ControlLoop) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(control.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let now = local_now(control.timezone);
            let now_ms = epoch_ms(now);
            let mut publish = false;

            while let Ok(device_id) = control.heartbeats.try_recv() {
                publish |= control
                    .arbiter
                    .record_heartbeat(&device_id, now_ms)
                    .is_some();
            }
            while let Ok(reading) = control.readings.try_recv() {
                control.arbiter.record_reading(reading, now_ms);
            }

            let mut actions = Vec::new();
            let mut replies = Vec::new();
            while let Ok(envelope) = control.commands.try_recv() {
                let result = match envelope.request {
                    ControlRequest::Command(request) => control.arbiter.apply_request(&request, now),
                    ControlRequest::ReplaceSchedule(schedule) => control
                        .arbiter
                        .replace_schedule(schedule, now)
                        .map(|()| Vec::new()),
                };
                let result = result.map(|applied| actions.extend(applied));
                if let Some(reply) = envelope.reply {
                    replies.push((reply, result));
                }
                publish = true;
            }

            publish |= !control.arbiter.sweep(now_ms).is_empty();
            actions.extend(control.arbiter.tick(now));
            publish |= !actions.is_empty();
            execute_engine_actions(&control.mqtt, &actions);

            let snapshot = control.arbiter.snapshot(now);
            control.snapshots.send_replace(snapshot.clone());
            for (reply, result) in replies {
                // The HTTP caller may have given up; nothing to do then.
                let _ = reply.send(result.map(|()| snapshot.clone()));
            }

            let persisted = Persisted {
                settings: control.arbiter.settings().clone(),
                schedule: control.arbiter.scheduler().clone(),
            };
            control.persisted.send_if_modified(|current| {
                if *current == persisted {
                    return false;
                }
                *current = persisted;
                true
            });

            if publish {
                control.publish_now.notify_one();
            }
        }
    });
}

fn execute_engine_actions(mqtt: &AsyncClient, actions: &[EngineAction]) {
    for action in actions {
        let topic = actuate_topic(action.equipment());
        info!("engine action: {action:?}");
        if let Err(err) = mqtt.try_publish(topic, QoS::AtLeastOnce, true, action.payload()) {
            warn!("actuation publish for {action:?} failed, left to resync: {err}");
        }
    }
}

/// Desired state of every relay, as the arbiter currently believes it.
fn equipment_state(snapshot: &SystemSnapshot) -> [EngineAction; 3] {
    [
        EngineAction::switch(Equipment::Ac, snapshot.ac_status),
        EngineAction::switch(Equipment::Heat, snapshot.heat_status),
        EngineAction::switch(Equipment::Fan, snapshot.fan_status),
    ]
}

/// Re-asserts the retained relay state after every broker (re)connect and on a
/// steady cadence, so a dropped edge publish cannot leave a relay diverged.
fn spawn_actuation_sync(
    mqtt: AsyncClient,
    snapshots: watch::Receiver<SystemSnapshot>,
    connected: Arc<Notify>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ACTUATION_RESYNC_PERIOD);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = connected.notified() => {}
            }
            let desired = equipment_state(&snapshots.borrow());
            for action in desired {
                let topic = actuate_topic(action.equipment());
                if let Err(err) = mqtt
                    .publish(topic, QoS::AtLeastOnce, true, action.payload())
                    .await
                {
                    warn!("actuation resync for {action:?} failed: {err}");
                }
            }
            debug!("actuation state re-asserted: {desired:?}");
        }
    });
}

/// Publishes the latest snapshot on a steady cadence and whenever the control
/// loop signals a change worth announcing immediately.
fn spawn_broadcaster(
    snapshots: watch::Receiver<SystemSnapshot>,
    publish_now: Arc<Notify>,
    bus: broadcast::Sender<Arc<SystemSnapshot>>,
    period: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = publish_now.notified() => {}
            }
            let snapshot = Arc::new(snapshots.borrow().clone());
            // No subscribers is not an error; the next publish will retry.
            let _ = bus.send(snapshot);
        }
    });
}

fn spawn_state_publisher(mqtt: AsyncClient, mut updates: broadcast::Receiver<Arc<SystemSnapshot>>) {
    tokio::spawn(async move {
        loop {
            let snapshot = match updates.recv().await {
                Ok(snapshot) => snapshot,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("state publisher lagged, skipped {skipped} snapshots");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match serde_json::to_vec(snapshot.as_ref()) {
                Ok(body) => {
                    if let Err(err) = mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    });
}

/// Writes settings and phases whenever the control loop reports a change,
/// and republishes the schedule state alongside.
fn spawn_persist_loop(store: AppStore, mqtt: AsyncClient, mut persisted: watch::Receiver<Persisted>) {
    tokio::spawn(async move {
        loop {
            let current = persisted.borrow_and_update().clone();

            if let Err(err) = store.save_settings(&current.settings).await {
                warn!("failed to persist runtime settings: {err:#}");
            }
            if let Err(err) = store.save_schedule(&current.schedule).await {
                warn!("failed to persist schedule: {err:#}");
            }
            match serde_json::to_vec(&current.schedule) {
                Ok(body) => {
                    if let Err(err) = mqtt
                        .publish(TOPIC_CONTROLLER_SCHEDULE_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("schedule state publish failed: {err}");
                    }
                }
                Err(err) => warn!("schedule serialization failed: {err}"),
            }

            if persisted.changed().await.is_err() {
                break;
            }
        }
    });
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.snapshots.borrow().clone())
}

async fn handle_post_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> impl IntoResponse {
    submit(&state, ControlRequest::Command(request)).await
}

async fn handle_get_schedule(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.persisted.borrow().schedule.clone())
}

async fn handle_put_schedule(
    State(state): State<AppState>,
    Json(schedule): Json<PhaseScheduler>,
) -> impl IntoResponse {
    submit(&state, ControlRequest::ReplaceSchedule(schedule)).await
}

/// Hands a request to the control loop and waits for the tick that applies it.
async fn submit(state: &AppState, request: ControlRequest) -> axum::response::Response {
    let (reply, applied) = oneshot::channel();
    let envelope = Envelope {
        request,
        reply: Some(reply),
    };
    if state.commands.send(envelope).await.is_err() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Control loop unavailable");
    }

    match applied.await {
        Ok(Ok(snapshot)) => Json(snapshot).into_response(),
        Ok(Err(err)) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
        Err(_) => error_response(StatusCode::SERVICE_UNAVAILABLE, "Control loop unavailable"),
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("HVAC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.hvac"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            schedule_path: Arc::new(data_dir.join("schedule.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        write_json(self.runtime_path.as_ref(), runtime).await
    }

    /// Read-modify-write so hand-edited network and device sections survive.
    async fn save_settings(&self, settings: &PersistedSettings) -> anyhow::Result<()> {
        let mut runtime = self.load_runtime_config().await?;
        if runtime.settings == *settings {
            return Ok(());
        }
        runtime.settings = settings.clone();
        self.save_runtime_config(&runtime).await
    }

    async fn load_schedule(&self) -> anyhow::Result<PhaseScheduler> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.schedule_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<PhaseScheduler>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(PhaseScheduler::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_schedule(&self, schedule: &PhaseScheduler) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        write_json(self.schedule_path.as_ref(), schedule).await
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, payload)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn resolve_timezone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        warn!("unknown timezone {name:?}, falling back to UTC");
        Tz::UTC
    })
}

fn local_now(timezone: Tz) -> DateTime<FixedOffset> {
    let local = Utc::now().with_timezone(&timezone);
    local.with_timezone(&local.offset().fix())
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

#[cfg(test)]
mod tests {
    use super::*;
    use hvac_common::{
        config::default_devices, HvacConfig, TOPIC_SENSOR_INDOOR_TEMP, TOPIC_SENSOR_OUTDOOR_DEWP,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn routes_heartbeats_by_device_id() {
        assert_eq!(
            route_message("hvac/heartbeat/zone2", b"").unwrap(),
            Route::Heartbeat("zone2".to_string())
        );
        assert_eq!(
            route_message("hvac/heartbeat/a/b", b"").unwrap(),
            Route::Ignored
        );
    }

    #[test]
    fn routes_sensor_readings() {
        assert_eq!(
            route_message(TOPIC_SENSOR_INDOOR_TEMP, b"70.5").unwrap(),
            Route::Reading(Reading::IndoorTemp(70.5))
        );
        assert_eq!(
            route_message(TOPIC_SENSOR_OUTDOOR_DEWP, b"48").unwrap(),
            Route::Reading(Reading::OutsideDewPoint(48.0))
        );
        assert_eq!(
            route_message(TOPIC_SENSOR_INDOOR_TEMP, b"n/a").unwrap(),
            Route::Ignored
        );
    }

    #[test]
    fn routes_commands_from_json() {
        let route = route_message(TOPIC_CMD, br#"{"command":"SET","data":72.5}"#).unwrap();
        assert_eq!(
            route,
            Route::Command(CommandRequest {
                command: "SET".to_string(),
                data: json!(72.5),
            })
        );

        let route = route_message(TOPIC_CMD, br#"{"command":"DRY CLEAR"}"#).unwrap();
        assert_eq!(route, Route::Command(CommandRequest::new("DRY CLEAR", json!(null))));
    }

    #[test]
    fn rejects_bad_payloads() {
        assert!(route_message(TOPIC_CMD, b"MODE HEAT").is_err());
        assert!(route_message(TOPIC_CMD, &[0xff, 0xfe]).is_err());
        assert!(route_message(TOPIC_CMD, &[b' '; MAX_MQTT_PAYLOAD_BYTES + 1]).is_err());
        assert_eq!(route_message("other/topic", b"1").unwrap(), Route::Ignored);
    }

    #[test]
    fn equipment_state_mirrors_snapshot() {
        let now = local_now(Tz::UTC);
        let mut arbiter = ModeArbiter::new(
            HvacConfig::default(),
            PersistedSettings::default(),
            &default_devices(),
            PhaseScheduler::default(),
        );
        assert_eq!(
            equipment_state(&arbiter.snapshot(now)),
            [
                EngineAction::AcOff,
                EngineAction::HeatOff,
                EngineAction::FanOff
            ]
        );

        arbiter
            .apply_request(&CommandRequest::new("DIRECT", json!("ac.on")), now)
            .unwrap();
        arbiter
            .apply_request(&CommandRequest::new("DIRECT", json!("fan.on")), now)
            .unwrap();
        assert_eq!(
            equipment_state(&arbiter.snapshot(now)),
            [EngineAction::AcOn, EngineAction::HeatOff, EngineAction::FanOn]
        );
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        assert_eq!(resolve_timezone("Mars/Olympus_Mons"), Tz::UTC);
        assert_eq!(
            resolve_timezone("America/Los_Angeles"),
            chrono_tz::America::Los_Angeles
        );
    }
}
