//! HTTP + WebSocket API for VocalLab
//!
//! Endpoints:
//! - GET /                  - Service banner
//! - GET /health            - Health check with full session state
//! - GET /experiment        - Full state (?language=xx)
//! - GET /experiment/steps  - Step catalog
//! - POST /frame            - Process one frame of detections
//! - POST /reset            - Back to step 0
//! - GET /stats             - Server and session counters
//! - WS /ws/student         - Frames in, results out
//! - WS /ws/dashboard       - Live feed of every student frame
//! - GET /audio/{lang}/{cue}.mp3 - Static audio (when an audio dir exists)

use axum::{
    extract::{Query, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::core::{Session, map_detections, mapping_count};
use crate::types::{AudioRef, Catalog, Detection, FrameResult, FullState, SessionStats, Step, StepInfo, SafetyAlert, round1};
use crate::{DEFAULT_LANGUAGE, VERSION};

/// Minimum spacing between two frames from the same student socket
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(500);

/// Dashboard heartbeat period
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Frame size assumed when a client does not send one
const DEFAULT_FRAME_SIZE: (u32, u32) = (640, 480);

/// Server-wide counters
#[derive(Debug, Default)]
pub struct ServerCounters {
    pub frames_processed: AtomicU64,
    pub total_detections: AtomicU64,
    pub step_advances: AtomicU64,
    pub safety_alerts: AtomicU64,
}

impl ServerCounters {
    fn reset_progress(&self) {
        self.step_advances.store(0, Ordering::Relaxed);
        self.safety_alerts.store(0, Ordering::Relaxed);
    }
}

/// App state
pub struct AppState {
    pub session: Session,
    pub started: Instant,
    pub counters: ServerCounters,
    pub students_connected: AtomicUsize,
    pub dashboards_connected: AtomicUsize,
    /// Fan-out to every dashboard socket
    pub dashboard_tx: broadcast::Sender<String>,
    /// Fan-out to every student socket
    pub student_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let (dashboard_tx, _) = broadcast::channel(100);
        let (student_tx, _) = broadcast::channel(100);
        Self {
            session: Session::new(catalog),
            started: Instant::now(),
            counters: ServerCounters::default(),
            students_connected: AtomicUsize::new(0),
            dashboards_connected: AtomicUsize::new(0),
            dashboard_tx,
            student_tx,
        }
    }

    fn uptime(&self) -> f64 {
        round1(self.started.elapsed().as_secs_f64())
    }

    fn broadcast_dashboards(&self, msg: &ServerMessage) {
        // no receivers is fine
        let _ = self.dashboard_tx.send(encode(msg));
    }

    fn broadcast_students(&self, msg: &ServerMessage) {
        let _ = self.student_tx.send(encode(msg));
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// One frame of detector output from a client
#[derive(Debug, Clone, Deserialize)]
pub struct FrameRequest {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub frame_width: Option<u32>,
    #[serde(default)]
    pub frame_height: Option<u32>,
}

/// Result of one frame as sent to clients
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub count: usize,
    pub frame_width: u32,
    pub frame_height: u32,
    #[serde(flatten)]
    pub result: FrameResult,
    /// Step cue as a playable URL
    pub audio_url: Option<String>,
    /// Safety cue as a playable URL
    pub alert_audio_url: Option<String>,
}

/// Messages a client may send
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    LanguageChange {
        #[serde(default)]
        language: String,
    },
    Ping,
    Frame(FrameRequest),
    RequestState,
}

/// Welcome payload for students
#[derive(Debug, Clone, Serialize)]
pub struct Welcome {
    pub server_version: String,
    pub experiment_name: String,
    pub total_steps: usize,
    pub current_step: usize,
    pub step_names: Vec<String>,
    pub languages: Vec<String>,
    pub step_info: StepInfo,
    pub timestamp: DateTime<Utc>,
}

/// Messages the server pushes
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome(Welcome),
    LanguageUpdated {
        language: String,
        step_info: StepInfo,
        audio_url: Option<String>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    DetectionResult(DetectionResult),
    StudentUpdate {
        count: usize,
        detections: Vec<Detection>,
        step_info: StepInfo,
        safety_alert: Option<SafetyAlert>,
        step_advance: bool,
        experiment_complete: bool,
        timestamp: DateTime<Utc>,
    },
    StudentConnected {
        student_count: usize,
        timestamp: DateTime<Utc>,
    },
    StudentDisconnected {
        student_count: usize,
        timestamp: DateTime<Utc>,
    },
    ExperimentLoaded {
        #[serde(flatten)]
        state: FullState,
        timestamp: DateTime<Utc>,
    },
    ExperimentReset {
        #[serde(flatten)]
        state: FullState,
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        server_version: String,
        timestamp: DateTime<Utc>,
    },
}

/// Root banner
#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub app: String,
    pub version: String,
    pub status: String,
    pub catalog_loaded: bool,
    pub uptime: f64,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub catalog_fingerprint: String,
    pub fsm_state: FullState,
    pub dashboard_clients: usize,
    pub student_clients: usize,
}

/// Step listing
#[derive(Debug, Serialize)]
pub struct StepsResponse {
    pub steps: Vec<Step>,
    pub total: usize,
}

/// Reset response
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: String,
    pub state: FullState,
}

/// Server statistics
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub frames_processed: u64,
    pub total_detections: u64,
    pub step_advances: u64,
    pub safety_alerts: u64,
    pub uptime: f64,
    pub students_connected: usize,
    pub dashboards_connected: usize,
    pub label_mappings: usize,
    pub session: SessionStats,
}

#[derive(Debug, Deserialize)]
pub struct LanguageQuery {
    pub language: Option<String>,
}

/// Playable location of an audio reference
pub fn audio_url(audio: &AudioRef) -> String {
    format!("/audio/{}/{}.mp3", audio.language, audio.cue)
}

fn encode(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).unwrap_or_default()
}

// =============================================================================
// ROUTER
// =============================================================================

/// Create the API router with a fresh session
pub fn create_router(catalog: Arc<Catalog>, audio_dir: Option<PathBuf>) -> Router {
    router_with_state(Arc::new(AppState::new(catalog)), audio_dir)
}

/// Create the API router around existing state
pub fn router_with_state(state: Arc<AppState>, audio_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/experiment", get(experiment))
        .route("/experiment/steps", get(experiment_steps))
        .route("/frame", post(frame))
        .route("/reset", post(reset))
        .route("/stats", get(stats))
        .route("/ws/student", get(student_ws))
        .route("/ws/dashboard", get(dashboard_ws));

    if let Some(dir) = audio_dir.filter(|d| d.is_dir()) {
        info!(dir = %dir.display(), "serving audio");
        router = router.nest_service("/audio", ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    Json(RootResponse {
        app: "VocalLab".to_string(),
        version: VERSION.to_string(),
        status: "running".to_string(),
        catalog_loaded: true,
        uptime: state.uptime(),
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
        catalog_fingerprint: state.session.catalog().fingerprint.clone(),
        fsm_state: state.session.full_state(DEFAULT_LANGUAGE).await,
        dashboard_clients: state.dashboards_connected.load(Ordering::Relaxed),
        student_clients: state.students_connected.load(Ordering::Relaxed),
    })
}

async fn experiment(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LanguageQuery>,
) -> Json<FullState> {
    let language = query.language.unwrap_or_default();
    Json(state.session.full_state(&language).await)
}

async fn experiment_steps(State(state): State<Arc<AppState>>) -> Json<StepsResponse> {
    let catalog = state.session.catalog();
    Json(StepsResponse {
        steps: catalog.steps.clone(),
        total: catalog.total_steps(),
    })
}

async fn frame(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FrameRequest>,
) -> Json<DetectionResult> {
    let language = req.language.clone().unwrap_or_default();
    Json(process_frame(&state, req, &language).await)
}

async fn reset(State(state): State<Arc<AppState>>) -> Json<ResetResponse> {
    state.session.reset().await;
    state.counters.reset_progress();

    let full = state.session.full_state(DEFAULT_LANGUAGE).await;
    state.broadcast_dashboards(&ServerMessage::ExperimentReset {
        state: full.clone(),
        timestamp: Utc::now(),
    });
    state.broadcast_students(&ServerMessage::Welcome(welcome(&state, DEFAULT_LANGUAGE).await));

    Json(ResetResponse {
        status: "reset".to_string(),
        state: full,
    })
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let c = &state.counters;
    Json(StatsResponse {
        frames_processed: c.frames_processed.load(Ordering::Relaxed),
        total_detections: c.total_detections.load(Ordering::Relaxed),
        step_advances: c.step_advances.load(Ordering::Relaxed),
        safety_alerts: c.safety_alerts.load(Ordering::Relaxed),
        uptime: state.uptime(),
        students_connected: state.students_connected.load(Ordering::Relaxed),
        dashboards_connected: state.dashboards_connected.load(Ordering::Relaxed),
        label_mappings: mapping_count(),
        session: state.session.stats().await,
    })
}

/// Label-map, process, count and fan out one frame
async fn process_frame(state: &AppState, mut req: FrameRequest, language: &str) -> DetectionResult {
    map_detections(&mut req.detections);
    let result = state.session.process(&req.detections, language).await;

    let c = &state.counters;
    c.frames_processed.fetch_add(1, Ordering::Relaxed);
    c.total_detections.fetch_add(req.detections.len() as u64, Ordering::Relaxed);
    if result.step_advance {
        c.step_advances.fetch_add(1, Ordering::Relaxed);
    }
    let alert_audio_url = result.safety_alert.as_ref().map(|alert| {
        c.safety_alerts.fetch_add(1, Ordering::Relaxed);
        audio_url(&AudioRef::new(state.session.language(language), alert.cue.clone()))
    });

    state.broadcast_dashboards(&ServerMessage::StudentUpdate {
        count: req.detections.len(),
        detections: req.detections.clone(),
        step_info: result.step_info.clone(),
        safety_alert: result.safety_alert.clone(),
        step_advance: result.step_advance,
        experiment_complete: result.experiment_complete,
        timestamp: Utc::now(),
    });

    DetectionResult {
        count: req.detections.len(),
        frame_width: req.frame_width.unwrap_or(DEFAULT_FRAME_SIZE.0),
        frame_height: req.frame_height.unwrap_or(DEFAULT_FRAME_SIZE.1),
        detections: req.detections,
        audio_url: result.audio.as_ref().map(audio_url),
        alert_audio_url,
        result,
    }
}

async fn welcome(state: &AppState, language: &str) -> Welcome {
    let catalog = state.session.catalog();
    let full = state.session.full_state(language).await;
    Welcome {
        server_version: VERSION.to_string(),
        experiment_name: catalog.name.clone(),
        total_steps: catalog.total_steps(),
        current_step: full.current_step,
        step_names: catalog.step_names(),
        languages: catalog.languages.clone(),
        step_info: full.step_info,
        timestamp: Utc::now(),
    }
}

// =============================================================================
// WEBSOCKETS
// =============================================================================

async fn student_ws(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_student(socket, state))
}

async fn dashboard_ws(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_dashboard(socket, state))
}

/// Whether a student frame arriving at `now` gets processed
pub fn accept_frame(last: Option<Instant>, now: Instant) -> bool {
    last.map_or(true, |t| now.saturating_duration_since(t) >= MIN_FRAME_INTERVAL)
}

/// Per-socket student state
#[derive(Debug, Clone)]
pub struct StudentLink {
    pub language: String,
    pub last_frame: Option<Instant>,
}

impl StudentLink {
    pub fn new(state: &AppState) -> Self {
        Self {
            language: state.session.language(DEFAULT_LANGUAGE),
            last_frame: None,
        }
    }
}

/// Reply to one student message, `None` when nothing goes back
pub async fn student_reply(
    state: &AppState,
    link: &mut StudentLink,
    msg: ClientMessage,
    now: Instant,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::LanguageChange { language: requested } => {
            let update = state.session.change_language(&requested).await;
            link.language = update.language.clone();
            Some(ServerMessage::LanguageUpdated {
                language: update.language,
                step_info: update.step_info,
                audio_url: update.audio.as_ref().map(audio_url),
            })
        }
        ClientMessage::Ping => Some(ServerMessage::Pong { timestamp: Utc::now() }),
        ClientMessage::Frame(req) => {
            if !accept_frame(link.last_frame, now) {
                debug!("student frame dropped, too soon");
                return None;
            }
            link.last_frame = Some(now);
            if let Some(requested) = req.language.as_deref() {
                link.language = state.session.language(requested);
            }
            let language = link.language.clone();
            Some(ServerMessage::DetectionResult(process_frame(state, req, &language).await))
        }
        ClientMessage::RequestState => None,
    }
}

/// Student connection: frames in, results out, plus pushes (reset welcome)
async fn handle_student(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut pushes = state.student_tx.subscribe();
    let mut link = StudentLink::new(&state);

    let count = state.students_connected.fetch_add(1, Ordering::Relaxed) + 1;
    info!(students = count, "student connected");

    let hello = encode(&ServerMessage::Welcome(welcome(&state, &link.language).await));
    if sender.send(Message::Text(hello)).await.is_ok() {
        state.broadcast_dashboards(&ServerMessage::StudentConnected {
            student_count: count,
            timestamp: Utc::now(),
        });

        loop {
            let text = tokio::select! {
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "student socket error");
                        break;
                    }
                },
                push = pushes.recv() => match push {
                    Ok(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            let Ok(msg) = serde_json::from_str::<ClientMessage>(&text) else {
                debug!("ignoring unparseable student message");
                continue;
            };
            let Some(reply) = student_reply(&state, &mut link, msg, Instant::now()).await else {
                continue;
            };
            if sender.send(Message::Text(encode(&reply))).await.is_err() {
                break;
            }
        }
    }

    let count = state.students_connected.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
    info!(students = count, "student disconnected");
    state.broadcast_dashboards(&ServerMessage::StudentDisconnected {
        student_count: count,
        timestamp: Utc::now(),
    });
}

/// Dashboard connection: full state on connect, then the live feed
async fn handle_dashboard(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut feed = state.dashboard_tx.subscribe();

    let count = state.dashboards_connected.fetch_add(1, Ordering::Relaxed) + 1;
    info!(dashboards = count, "dashboard connected");

    let mut outgoing = Some(loaded(&state).await);
    loop {
        if let Some(msg) = outgoing.take() {
            if sender.send(Message::Text(encode(&msg))).await.is_err() {
                break;
            }
        }

        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    outgoing = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Ping) => Some(ServerMessage::Pong { timestamp: Utc::now() }),
                        Ok(ClientMessage::RequestState) => Some(loaded(&state).await),
                        _ => None,
                    };
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "dashboard socket error");
                    break;
                }
            },
            update = feed.recv() => match update {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "dashboard lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let count = state.dashboards_connected.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
    info!(dashboards = count, "dashboard disconnected");
}

async fn loaded(state: &AppState) -> ServerMessage {
    ServerMessage::ExperimentLoaded {
        state: state.session.full_state(DEFAULT_LANGUAGE).await,
        timestamp: Utc::now(),
    }
}

/// Periodic heartbeat to dashboards
async fn heartbeat_loop(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        state.broadcast_dashboards(&ServerMessage::Heartbeat {
            server_version: VERSION.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Run the API server
pub async fn run_server(
    addr: &str,
    catalog: Arc<Catalog>,
    audio_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = Arc::new(AppState::new(catalog));
    let router = router_with_state(Arc::clone(&state), audio_dir);
    let heartbeat = tokio::spawn(heartbeat_loop(Arc::clone(&state)));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "VocalLab API running");
    info!("  WS   /ws/student      - Student frames");
    info!("  WS   /ws/dashboard    - Dashboard feed");
    info!("  POST /frame           - Process one frame");
    info!("  POST /reset           - Reset experiment");
    info!("  GET  /health          - Health check");

    let served = axum::serve(listener, router).await;
    heartbeat.abort();
    served?;
    Ok(())
}
