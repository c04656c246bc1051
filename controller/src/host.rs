use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Context};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot, watch, Mutex},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use heatpump_common::{
    schedule::ConditionWarning, types::parse_temperature_payload, AttributeUpdate, Command,
    Controller, ControllerStatus, DeviceAction, DeviceState, DiagnosticsRecord, PowerState,
    RuntimeConfig, Schedule, Value,
    TOPIC_CMD_CLIMATE, TOPIC_CMD_CLIMATE_TARGET, TOPIC_CMD_FIX, TOPIC_CMD_POWER,
    TOPIC_CMD_SCHEDULE, TOPIC_CMD_SCHEDULE_ATTRIBUTES, TOPIC_CMD_TARGET, TOPIC_CONTROLLER_STATE,
    TOPIC_HELPER_PREFIX, TOPIC_HELPER_WILDCARD, TOPIC_SENSOR_OUTSIDE_TEMP, TOPIC_SENSOR_ROOM_TEMP,
};

use crate::transport::{execute_actions, MqttActionSink, TransportDiagnostics};

const MAX_MQTT_PAYLOAD_BYTES: usize = 8 * 1024;
const EVENT_QUEUE_DEPTH: usize = 64;

#[derive(Clone)]
struct AppState {
    events: mpsc::Sender<Envelope>,
    snapshots: watch::Receiver<Snapshot>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    schedule_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Clone, PartialEq)]
enum ControlEvent {
    RoomTemperature(Option<f32>),
    OutsideTemperature(Option<f32>),
    Helper(String, Value),
    Command(Command),
    SetAttributes(AttributeUpdate),
    ReplaceSchedule(Schedule),
}

#[derive(Debug)]
enum Rejected {
    Invalid(String),
    Persist(String),
}

type Reply = oneshot::Sender<Result<ControllerStatus, Rejected>>;

struct Envelope {
    event: ControlEvent,
    reply: Option<Reply>,
}

#[derive(Debug, Clone, Serialize)]
struct Snapshot {
    status: ControllerStatus,
    schedule: Schedule,
    diagnostics: DiagnosticsView,
}

#[derive(Debug, Clone, Serialize)]
struct DiagnosticsView {
    #[serde(flatten)]
    record: DiagnosticsRecord,
    transport: TransportDiagnostics,
    #[serde(rename = "conditionWarnings")]
    condition_warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Default, Deserialize)]
struct FixRequest {
    #[serde(default)]
    power: Option<PowerState>,
    #[serde(default)]
    target: Option<f32>,
}

impl From<FixRequest> for Command {
    fn from(request: FixRequest) -> Self {
        Command::FixState {
            observed_power: request.power,
            observed_target: request.target,
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store
        .load_runtime_config()
        .await
        .context("failed to load runtime config")?;
    apply_env_overrides(&mut runtime);

    runtime
        .controller
        .validate()
        .context("invalid controller configuration")?;
    let timezone: Tz = runtime
        .timezone
        .parse()
        .map_err(|err| anyhow!("invalid timezone '{}': {err}", runtime.timezone))?;

    let schedule = store
        .load_schedule()
        .await
        .context("failed to load schedule")?;

    let controller = Controller::new(
        runtime.controller.clone(),
        DeviceState::off(runtime.controller.initial_target),
        schedule,
    );

    let mut mqtt_options = MqttOptions::new(
        runtime.network.client_id.clone(),
        runtime.network.mqtt_host.clone(),
        runtime.network.mqtt_port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if !runtime.network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(
            runtime.network.mqtt_user.clone(),
            runtime.network.mqtt_pass.clone(),
        );
    }
    mqtt_options.set_max_packet_size(
        MAX_MQTT_PAYLOAD_BYTES + 1024,
        MAX_MQTT_PAYLOAD_BYTES + 1024,
    );

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    let now = now_in_timezone(&timezone);
    let (snapshots_tx, snapshots_rx) = watch::channel(Snapshot {
        status: controller.status(now),
        schedule: controller.schedule().clone(),
        diagnostics: DiagnosticsView {
            record: controller.diagnostics(),
            transport: TransportDiagnostics::default(),
            condition_warnings: Vec::new(),
        },
    });

    subscribe_topics(&mqtt).await?;
    spawn_mqtt_loop(eventloop, events_tx.clone());

    let reconciler = Reconciler {
        controller,
        timezone,
        tick_interval: Duration::from_secs(runtime.controller.tick_interval_secs),
        sink: MqttActionSink::new(mqtt.clone()),
        transport: TransportDiagnostics::default(),
        mqtt,
        store,
        snapshots: snapshots_tx,
    };
    tokio::spawn(reconciler.run(events_rx));

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/diagnostics", get(handle_get_diagnostics))
        .route("/api/power", post(handle_set_power))
        .route("/api/target", post(handle_set_target))
        .route("/api/climate", post(handle_set_climate))
        .route("/api/climate/target", post(handle_set_climate_target))
        .route("/api/fix", post(handle_fix))
        .route(
            "/api/schedule",
            get(handle_get_schedule).put(handle_put_schedule),
        )
        .route("/api/schedule/attributes", post(handle_set_attributes))
        .with_state(AppState {
            events: events_tx,
            snapshots: snapshots_rx,
        });

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = env_parse::<u16>("MQTT_PORT") {
        runtime.network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        runtime.network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        runtime.network.mqtt_pass = pass;
    }
    if let Some(port) = env_parse::<u16>("CONTROLLER_HTTP_PORT") {
        runtime.http_port = port;
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_ROOM_TEMP,
        TOPIC_SENSOR_OUTSIDE_TEMP,
        TOPIC_HELPER_WILDCARD,
        TOPIC_CMD_POWER,
        TOPIC_CMD_TARGET,
        TOPIC_CMD_CLIMATE,
        TOPIC_CMD_CLIMATE_TARGET,
        TOPIC_CMD_FIX,
        TOPIC_CMD_SCHEDULE,
        TOPIC_CMD_SCHEDULE_ATTRIBUTES,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtLeastOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(mut eventloop: rumqttc::EventLoop, events: mpsc::Sender<Envelope>) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if message.payload.len() > MAX_MQTT_PAYLOAD_BYTES {
                        warn!(
                            "dropping oversized MQTT payload on topic {} ({} bytes)",
                            message.topic,
                            message.payload.len()
                        );
                        continue;
                    }
                    let Ok(payload) = std::str::from_utf8(&message.payload) else {
                        warn!("dropping non utf8 MQTT payload on topic {}", message.topic);
                        continue;
                    };

                    match parse_mqtt_message(&message.topic, payload) {
                        Some(event) => {
                            if events.send(Envelope { event, reply: None }).await.is_err() {
                                warn!("reconciler stopped; closing mqtt loop");
                                return;
                            }
                        }
                        None => debug!("ignoring MQTT message on {}", message.topic),
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
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

fn parse_mqtt_message(topic: &str, payload: &str) -> Option<ControlEvent> {
    let trimmed = payload.trim();

    if let Some(name) = topic.strip_prefix(TOPIC_HELPER_PREFIX) {
        if name.is_empty() || name.contains('/') {
            return None;
        }
        return Some(ControlEvent::Helper(
            name.to_string(),
            Value::from_state_str(trimmed),
        ));
    }

    let event = match topic {
        TOPIC_SENSOR_ROOM_TEMP => ControlEvent::RoomTemperature(parse_temperature_payload(trimmed)),
        TOPIC_SENSOR_OUTSIDE_TEMP => {
            ControlEvent::OutsideTemperature(parse_temperature_payload(trimmed))
        }
        TOPIC_CMD_POWER => ControlEvent::Command(match trimmed.to_ascii_lowercase().as_str() {
            "on" => Command::TurnOn,
            "off" => Command::TurnOff,
            _ => return None,
        }),
        TOPIC_CMD_TARGET => {
            ControlEvent::Command(Command::SetTargetTemperature(parse_finite(trimmed)?))
        }
        TOPIC_CMD_CLIMATE => ControlEvent::Command(match trimmed.to_ascii_lowercase().as_str() {
            "on" | "heat" => Command::ClimateTurnOn,
            "off" => Command::ClimateTurnOff,
            _ => return None,
        }),
        TOPIC_CMD_CLIMATE_TARGET => {
            ControlEvent::Command(Command::ClimateSetTemperature(parse_finite(trimmed)?))
        }
        TOPIC_CMD_FIX => ControlEvent::Command(parse_fix_payload(trimmed)?.into()),
        TOPIC_CMD_SCHEDULE => ControlEvent::ReplaceSchedule(serde_json::from_str(trimmed).ok()?),
        TOPIC_CMD_SCHEDULE_ATTRIBUTES => {
            ControlEvent::SetAttributes(serde_json::from_str(trimmed).ok()?)
        }
        _ => return None,
    };

    Some(event)
}

fn parse_fix_payload(payload: &str) -> Option<FixRequest> {
    let power = match payload.to_ascii_lowercase().as_str() {
        "" | "toggle" => None,
        "on" => Some(PowerState::On),
        "off" => Some(PowerState::Off),
        _ => return serde_json::from_str(payload).ok(),
    };
    Some(FixRequest {
        power,
        target: None,
    })
}

fn parse_finite(raw: &str) -> Option<f32> {
    raw.parse::<f32>().ok().filter(|value| value.is_finite())
}

/// Sole owner of the controller. Events and periodic ticks are handled one at
/// a time; an event tick restarts the periodic interval.
struct Reconciler {
    controller: Controller,
    timezone: Tz,
    tick_interval: Duration,
    sink: MqttActionSink,
    transport: TransportDiagnostics,
    mqtt: AsyncClient,
    store: AppStore,
    snapshots: watch::Sender<Snapshot>,
}

impl Reconciler {
    async fn run(mut self, mut events: mpsc::Receiver<Envelope>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let envelope = tokio::select! {
                _ = interval.tick() => None,
                received = events.recv() => match received {
                    Some(envelope) => Some(envelope),
                    None => break,
                },
            };

            let now = now_in_timezone(&self.timezone);
            let mut actions = Vec::new();
            let mut reply = None;
            let mut result = Ok(());

            if let Some(Envelope { event, reply: sender }) = envelope {
                reply = sender;
                result = self.apply_event(event, now, &mut actions).await;
                interval.reset();
            }

            let outcome = self.controller.tick(now);
            actions.extend(outcome.actions);
            for warning in &outcome.warnings {
                warn!("{warning}");
            }
            if let Some(source) = self.controller.pending_off() {
                debug!("turn-off requested by {} deferred by cycle guard", source.as_str());
            }

            execute_actions(&mut self.sink, &actions, &mut self.transport).await;

            let status = self.controller.status(now);
            self.publish(&status, &outcome.warnings).await;

            if let Some(reply) = reply {
                let _ = reply.send(result.map(|()| status));
            }
        }

        info!("event channel closed; reconciler stopped");
    }

    async fn apply_event(
        &mut self,
        event: ControlEvent,
        now: DateTime<FixedOffset>,
        actions: &mut Vec<DeviceAction>,
    ) -> Result<(), Rejected> {
        match event {
            ControlEvent::RoomTemperature(reading) => {
                self.controller.update_room_temperature(reading);
            }
            ControlEvent::OutsideTemperature(reading) => {
                self.controller.update_outside_temperature(reading);
            }
            ControlEvent::Helper(name, value) => self.controller.set_helper(name, value),
            ControlEvent::Command(command) => {
                info!("command: {command:?}");
                actions.extend(self.controller.handle_command(command, now));
            }
            ControlEvent::SetAttributes(update) => {
                self.controller.set_attributes(&update).map_err(|err| {
                    warn!("rejected attribute update: {err}");
                    Rejected::Invalid(err.to_string())
                })?;
            }
            ControlEvent::ReplaceSchedule(schedule) => {
                self.controller.set_schedule(schedule);
                if let Err(err) = self.store.save_schedule(self.controller.schedule()).await {
                    warn!("failed to persist schedule update: {err:#}");
                    return Err(Rejected::Persist("Failed to persist schedule".to_string()));
                }
            }
        }
        Ok(())
    }

    async fn publish(&mut self, status: &ControllerStatus, warnings: &[ConditionWarning]) {
        let snapshot = Snapshot {
            status: status.clone(),
            schedule: self.controller.schedule().clone(),
            diagnostics: DiagnosticsView {
                record: self.controller.diagnostics(),
                transport: self.transport.clone(),
                condition_warnings: warnings.iter().map(ToString::to_string).collect(),
            },
        };
        self.snapshots.send_replace(snapshot);

        match serde_json::to_vec(status) {
            Ok(body) => {
                if let Err(err) = self
                    .mqtt
                    .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                    .await
                {
                    warn!("controller state publish failed: {err}");
                }
            }
            Err(err) => warn!("controller state serialization failed: {err}"),
        }
    }
}

async fn submit(state: &AppState, event: ControlEvent) -> axum::response::Response {
    let (reply_tx, reply_rx) = oneshot::channel();
    let envelope = Envelope {
        event,
        reply: Some(reply_tx),
    };

    if state.events.send(envelope).await.is_err() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Controller is not running");
    }

    match reply_rx.await {
        Ok(Ok(status)) => Json(status).into_response(),
        Ok(Err(Rejected::Invalid(message))) => error_response(StatusCode::BAD_REQUEST, &message),
        Ok(Err(Rejected::Persist(message))) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &message)
        }
        Err(_) => error_response(StatusCode::SERVICE_UNAVAILABLE, "Controller is not running"),
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.snapshots.borrow().status.clone();
    Json(status)
}

async fn handle_get_diagnostics(State(state): State<AppState>) -> impl IntoResponse {
    let diagnostics = state.snapshots.borrow().diagnostics.clone();
    Json(diagnostics)
}

async fn handle_set_power(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let command = match value.to_ascii_lowercase().as_str() {
        "on" => Command::TurnOn,
        "off" => Command::TurnOff,
        _ => return error_response(StatusCode::BAD_REQUEST, "Invalid power. Use 'on' or 'off'"),
    };
    submit(&state, ControlEvent::Command(command)).await
}

async fn handle_set_target(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(target) = parse_finite(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };
    submit(
        &state,
        ControlEvent::Command(Command::SetTargetTemperature(target)),
    )
    .await
}

async fn handle_set_climate(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let command = match value.to_ascii_lowercase().as_str() {
        "on" | "heat" => Command::ClimateTurnOn,
        "off" => Command::ClimateTurnOff,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid climate mode. Use 'heat' or 'off'",
            )
        }
    };
    submit(&state, ControlEvent::Command(command)).await
}

async fn handle_set_climate_target(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(target) = parse_finite(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };
    submit(
        &state,
        ControlEvent::Command(Command::ClimateSetTemperature(target)),
    )
    .await
}

async fn handle_fix(
    State(state): State<AppState>,
    Json(request): Json<FixRequest>,
) -> impl IntoResponse {
    if request.target.is_some_and(|target| !target.is_finite()) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    }
    submit(&state, ControlEvent::Command(request.into())).await
}

async fn handle_get_schedule(State(state): State<AppState>) -> impl IntoResponse {
    let schedule = state.snapshots.borrow().schedule.clone();
    Json(schedule)
}

async fn handle_put_schedule(
    State(state): State<AppState>,
    Json(schedule): Json<Schedule>,
) -> impl IntoResponse {
    let response = submit(&state, ControlEvent::ReplaceSchedule(schedule)).await;
    if !response.status().is_success() {
        return response;
    }
    handle_get_schedule(State(state)).await.into_response()
}

async fn handle_set_attributes(
    State(state): State<AppState>,
    Json(update): Json<AttributeUpdate>,
) -> impl IntoResponse {
    submit(&state, ControlEvent::SetAttributes(update)).await
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("HEATPUMP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.heatpump"));
        Self::in_dir(data_dir)
    }

    fn in_dir(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            schedule_path: Arc::new(data_dir.join("schedule.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("malformed {}", self.runtime_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_schedule(&self) -> anyhow::Result<Schedule> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.schedule_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<Schedule>(&raw)
                .with_context(|| format!("malformed {}", self.schedule_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Schedule::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_schedule(&self, schedule: &Schedule) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.schedule_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(schedule)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

fn now_in_timezone(timezone: &Tz) -> DateTime<FixedOffset> {
    let local = Utc::now().with_timezone(timezone);
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
    use heatpump_common::HvacMode;

    use super::*;

    #[tokio::test]
    async fn malformed_store_files_are_errors_and_missing_ones_default() {
        let dir = std::env::temp_dir().join(format!("heatpump-store-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let store = AppStore::in_dir(dir.clone());

        let runtime = store.load_runtime_config().await.unwrap();
        assert_eq!(runtime.http_port, RuntimeConfig::default().http_port);
        assert_eq!(store.load_schedule().await.unwrap(), Schedule::default());

        tokio::fs::write(dir.join("runtime.json"), b"{\"controller\": 5}")
            .await
            .unwrap();
        tokio::fs::write(dir.join("schedule.json"), b"not json")
            .await
            .unwrap();

        let err = store.load_runtime_config().await.unwrap_err();
        assert!(format!("{err:#}").contains("malformed"));
        assert!(store.load_schedule().await.is_err());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn sensor_payloads_map_to_readings() {
        assert_eq!(
            parse_mqtt_message(TOPIC_SENSOR_ROOM_TEMP, "20.5"),
            Some(ControlEvent::RoomTemperature(Some(20.5)))
        );
        assert_eq!(
            parse_mqtt_message(TOPIC_SENSOR_OUTSIDE_TEMP, "unavailable"),
            Some(ControlEvent::OutsideTemperature(None))
        );
    }

    #[test]
    fn helper_topics_carry_their_name() {
        assert_eq!(
            parse_mqtt_message("heatpump/helper/input_boolean.guests", "on"),
            Some(ControlEvent::Helper(
                "input_boolean.guests".to_string(),
                Value::Bool(true)
            ))
        );
        assert_eq!(parse_mqtt_message("heatpump/helper/", "on"), None);
    }

    #[test]
    fn commands_parse_case_insensitively() {
        assert_eq!(
            parse_mqtt_message(TOPIC_CMD_POWER, "ON"),
            Some(ControlEvent::Command(Command::TurnOn))
        );
        assert_eq!(
            parse_mqtt_message(TOPIC_CMD_CLIMATE, "heat"),
            Some(ControlEvent::Command(Command::ClimateTurnOn))
        );
        assert_eq!(parse_mqtt_message(TOPIC_CMD_POWER, "maybe"), None);
        assert_eq!(parse_mqtt_message(TOPIC_CMD_TARGET, "NaN"), None);
        assert_eq!(
            parse_mqtt_message(TOPIC_CMD_CLIMATE_TARGET, "21.5"),
            Some(ControlEvent::Command(Command::ClimateSetTemperature(21.5)))
        );
    }

    #[test]
    fn fix_accepts_plain_and_json_payloads() {
        assert_eq!(
            parse_mqtt_message(TOPIC_CMD_FIX, ""),
            Some(ControlEvent::Command(Command::FixState {
                observed_power: None,
                observed_target: None,
            }))
        );
        assert_eq!(
            parse_mqtt_message(TOPIC_CMD_FIX, r#"{"power":"ON","target":22}"#),
            Some(ControlEvent::Command(Command::FixState {
                observed_power: Some(PowerState::On),
                observed_target: Some(22.0),
            }))
        );
    }

    #[test]
    fn attribute_updates_parse_from_json() {
        let event = parse_mqtt_message(
            TOPIC_CMD_SCHEDULE_ATTRIBUTES,
            r#"{"entity_id":"morning","data":{"hvac_mode":"OFF"}}"#,
        );

        let Some(ControlEvent::SetAttributes(update)) = event else {
            panic!("expected attribute update, got {event:?}");
        };
        assert_eq!(update.entity_id, "morning");
        assert_eq!(update.data.hvac_mode, Some(HvacMode::Off));
    }
}
