//! HTTP control plane: axum router and request handlers.
//!
//! The server runs on the tokio runtime while the scheduler runs on a plain
//! `std::thread`. Handlers validate their input, then hand a
//! [`ControlCommand`] to the render thread through `std::sync::mpsc`.
//! Reads come from the snapshots the render thread publishes.
//!
//! ## Rust concepts
//! - axum extractors: `State`, `Json`, `Query`, `Bytes`, `HeaderMap`, `Body`
//! - Streaming a request body chunk by chunk with `std::future::poll_fn`
//! - `Arc` for sharing read-only state across async tasks
//! - `tower-http` middleware for CORS and request tracing

use crate::effect::{PatternId, PatternInfo};
use crate::error::Error;
use crate::frame::PixelBuffer;
use crate::layout::GridLayout;
use crate::mode::RenderMode;
use crate::preview::{self, DEFAULT_CELL_SIZE};
use crate::render::{ControllerStatus, SharedState};
use crate::scheduler::{
    ControlCommand, TimingReport, validate_active_count, validate_panel_grid,
};
use crate::stream::StreamStats;
use crate::upload::{
    RawUploadProgress, RawUploadReceiver, UploadParseResult, clamp_scroll_speed,
    parse_pattern_body,
};
use axum::Router;
use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
///
/// Rust concept: CLONE for Arc
/// axum clones the state for each request, so everything inside is either
/// an `Arc` or a cheap handle like `Sender`.
#[derive(Clone)]
pub struct AppState {
    /// Channel to the render thread
    pub command_tx: Sender<ControlCommand>,
    /// Snapshots published by the render thread
    pub shared: SharedState,
    /// Registered patterns, captured from the scheduler's registry at boot
    pub patterns: Arc<Vec<PatternEntry>>,
    /// Frame buffer size in pixels
    pub capacity: usize,
}

impl AppState {
    fn send(&self, command: ControlCommand) -> Result<(), (StatusCode, String)> {
        self.command_tx.send(command).map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Render thread gone".to_string(),
            )
        })
    }
}

/// Map a controller error onto an HTTP rejection.
fn reject(err: Error) -> (StatusCode, String) {
    let status = match err {
        Error::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::Image(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    tracing::warn!("Rejected request: {}", err);
    (status, err.to_string())
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_status,
        get_patterns,
        post_pattern,
        post_pixels,
        post_layout,
        post_text,
        post_stream,
        get_stream_stats,
        get_timing,
        post_upload_pattern,
        post_upload_raw,
        get_preview,
    ),
    components(schemas(
        ControllerStatus,
        RenderMode,
        GridLayout,
        StreamStats,
        TimingReport,
        PatternEntry,
        PatternRequest,
        PixelsRequest,
        LayoutRequest,
        TextRequest,
        UploadResponse,
        StreamStatsResponse,
    )),
    tags(
        (name = "patterns", description = "Pattern selection and text"),
        (name = "layout", description = "Panel grid and active pixels"),
        (name = "stream", description = "UDP pixel streaming"),
        (name = "upload", description = "Custom pattern uploads"),
        (name = "system", description = "Status, timing and preview"),
    ),
    info(
        title = "Panel Matrix Controller API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for a tiled serpentine LED panel controller"
    )
)]
pub struct ApiDoc;

// ── Request/Response types ───────────────────────────────────────────

/// One selectable pattern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct PatternEntry {
    #[schema(example = 0)]
    pub id: u8,
    #[schema(example = "Rainbow")]
    pub name: String,
    #[schema(example = "Basic")]
    pub category: String,
}

impl From<PatternInfo> for PatternEntry {
    fn from(info: PatternInfo) -> Self {
        Self {
            id: info.id,
            name: info.name.to_string(),
            category: info.category.to_string(),
        }
    }
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct PatternRequest {
    /// Pattern id from GET /api/v1/patterns
    #[schema(example = 138)]
    id: u32,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct PixelsRequest {
    /// Number of pixels the patterns draw, 1 up to the frame capacity
    #[schema(example = 1024, minimum = 1)]
    count: usize,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct LayoutRequest {
    /// Panel rows (1-16)
    #[schema(example = 4, minimum = 1, maximum = 16)]
    rows: u16,
    /// Panel columns (1-16)
    #[schema(example = 1, minimum = 1, maximum = 16)]
    cols: u16,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct TextRequest {
    /// Text to scroll. Upper-cased; setting it switches to the scrolling text pattern.
    #[serde(default)]
    #[schema(example = "HELLO")]
    text: Option<String>,
    /// Milliseconds per scroll step, clamped to 20-200
    #[serde(default)]
    #[schema(example = 50)]
    speed: Option<u64>,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RawUploadQuery {
    /// Scroll the uploaded pattern at this many milliseconds per step (20-200)
    speed: Option<u64>,
}

#[derive(Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    /// Pixels decoded from the body
    pub pixel_count: usize,
    /// Scroll step, when the pattern scrolls
    pub scroll_speed_ms: Option<u16>,
}

impl From<UploadParseResult> for UploadResponse {
    fn from(result: UploadParseResult) -> Self {
        Self {
            pixel_count: result.pixel_count,
            scroll_speed_ms: result.scroll_speed_ms,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct StreamStatsResponse {
    pub active: bool,
    pub received: u64,
    pub displayed: u64,
    pub dropped: u64,
    pub last_packet_age_ms: Option<u64>,
    pub uptime_secs: u64,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"]).validator_url("none")),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/patterns", get(get_patterns))
        .route("/api/v1/pattern", post(post_pattern))
        .route("/api/v1/pixels", post(post_pixels))
        .route("/api/v1/layout", post(post_layout))
        .route("/api/v1/text", post(post_text))
        .route("/api/v1/stream", post(post_stream))
        .route("/api/v1/stream/stats", get(get_stream_stats))
        .route("/api/v1/timing", get(get_timing))
        .route("/api/v1/upload/pattern", post(post_upload_pattern))
        .route("/api/v1/upload/raw", post(post_upload_raw))
        .route("/api/v1/preview.png", get(get_preview))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status: current controller state
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current controller status", body = ControllerStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<ControllerStatus> {
    Json(state.shared.status())
}

/// GET /api/v1/patterns: every selectable pattern
#[utoipa::path(
    get,
    path = "/api/v1/patterns",
    tag = "patterns",
    responses(
        (status = 200, description = "Pattern catalogue", body = Vec<PatternEntry>)
    )
)]
async fn get_patterns(State(state): State<AppState>) -> Json<Vec<PatternEntry>> {
    Json(state.patterns.as_ref().clone())
}

/// POST /api/v1/pattern: select a pattern
#[utoipa::path(
    post,
    path = "/api/v1/pattern",
    tag = "patterns",
    request_body = PatternRequest,
    responses(
        (status = 200, description = "Pattern selected"),
        (status = 400, description = "Unknown pattern id")
    )
)]
async fn post_pattern(
    State(state): State<AppState>,
    Json(req): Json<PatternRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let Some(id) = PatternId::try_from(req.id)
        .ok()
        .filter(|&id| state.patterns.iter().any(|p| p.id == id))
    else {
        return Err(reject(Error::UnknownPattern(req.id)));
    };
    state.send(ControlCommand::SelectPattern(id))?;
    Ok(StatusCode::OK)
}

/// POST /api/v1/pixels: set the active pixel count
#[utoipa::path(
    post,
    path = "/api/v1/pixels",
    tag = "layout",
    request_body = PixelsRequest,
    responses(
        (status = 200, description = "Active pixel count updated"),
        (status = 400, description = "Count out of range")
    )
)]
async fn post_pixels(
    State(state): State<AppState>,
    Json(req): Json<PixelsRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    validate_active_count(req.count, state.capacity).map_err(reject)?;
    state.send(ControlCommand::SetActiveCount(req.count))?;
    Ok(StatusCode::OK)
}

/// POST /api/v1/layout: set the panel grid
#[utoipa::path(
    post,
    path = "/api/v1/layout",
    tag = "layout",
    request_body = LayoutRequest,
    responses(
        (status = 200, description = "Layout updated", body = GridLayout),
        (status = 400, description = "Grid out of range or over capacity")
    )
)]
async fn post_layout(
    State(state): State<AppState>,
    Json(req): Json<LayoutRequest>,
) -> Result<Json<GridLayout>, (StatusCode, String)> {
    let layout = validate_panel_grid(req.rows, req.cols, state.capacity).map_err(reject)?;
    state.send(ControlCommand::SetPanelGrid {
        rows: req.rows,
        cols: req.cols,
    })?;
    Ok(Json(layout))
}

/// POST /api/v1/text: set scroll text and/or speed
#[utoipa::path(
    post,
    path = "/api/v1/text",
    tag = "patterns",
    request_body = TextRequest,
    responses(
        (status = 200, description = "Text updated"),
        (status = 400, description = "Neither text nor speed given")
    )
)]
async fn post_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    if req.text.is_none() && req.speed.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Expected text, speed or both".to_string(),
        ));
    }
    state.send(ControlCommand::SetScrollText {
        text: req.text,
        speed_ms: req.speed,
    })?;
    Ok(StatusCode::OK)
}

/// POST /api/v1/stream: hand the display to the UDP stream
#[utoipa::path(
    post,
    path = "/api/v1/stream",
    tag = "stream",
    responses(
        (status = 200, description = "Streaming mode entered"),
    )
)]
async fn post_stream(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    state.send(ControlCommand::EnterStreaming)?;
    Ok(StatusCode::OK)
}

/// GET /api/v1/stream/stats: streaming counters
#[utoipa::path(
    get,
    path = "/api/v1/stream/stats",
    tag = "stream",
    responses(
        (status = 200, description = "Streaming statistics", body = StreamStatsResponse)
    )
)]
async fn get_stream_stats(State(state): State<AppState>) -> Json<StreamStatsResponse> {
    let status = state.shared.status();
    let stats = status.streaming;
    Json(StreamStatsResponse {
        active: stats.active,
        received: stats.received,
        displayed: stats.displayed,
        dropped: stats.dropped,
        last_packet_age_ms: stats.last_packet_age_ms,
        uptime_secs: status.uptime_secs,
    })
}

/// GET /api/v1/timing: tick timing averages, reset after reading
#[utoipa::path(
    get,
    path = "/api/v1/timing",
    tag = "system",
    responses(
        (status = 200, description = "Averages since the last read", body = TimingReport)
    )
)]
async fn get_timing(State(state): State<AppState>) -> Result<Json<TimingReport>, (StatusCode, String)> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state.send(ControlCommand::TakeTiming(reply_tx))?;
    let timing = reply_rx.await.map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Render thread gone".to_string(),
        )
    })?;
    Ok(Json(timing))
}

/// POST /api/v1/upload/pattern: textual pattern upload
///
/// Body is `{"hex":"RRGGBB..."}` or `{"sparse":[[idx,r,g,b],...]}`, with an
/// optional `"scrollSpeed": N`. Malformed content decodes to fewer pixels.
#[utoipa::path(
    post,
    path = "/api/v1/upload/pattern",
    tag = "upload",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Pattern installed", body = UploadResponse)
    )
)]
async fn post_upload_pattern(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let mut pixels = PixelBuffer::new(state.capacity);
    let result = parse_pattern_body(&body, &mut pixels);
    tracing::info!(
        "Pattern upload: {} bytes, {} pixels, scroll {:?}",
        body.len(),
        result.pixel_count,
        result.scroll_speed_ms
    );
    state.send(ControlCommand::InstallCustomPattern { pixels, result })?;
    Ok(Json(result.into()))
}

/// POST /api/v1/upload/raw: raw `R, G, B, ...` pattern upload
///
/// The body is streamed straight into the pattern buffer. A declared
/// `Content-Length` over `capacity * 3 + 100` is refused before any byte is
/// read.
#[utoipa::path(
    post,
    path = "/api/v1/upload/raw",
    tag = "upload",
    params(RawUploadQuery),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Pattern installed", body = UploadResponse),
        (status = 413, description = "Declared length too large")
    )
)]
async fn post_upload_raw(
    State(state): State<AppState>,
    Query(query): Query<RawUploadQuery>,
    headers: HeaderMap,
    mut body: Body,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    let mut receiver = RawUploadReceiver::new(declared, state.capacity);
    if let RawUploadProgress::Rejected { declared, limit } = receiver.progress() {
        return Err(reject(Error::UploadTooLarge { declared, limit }));
    }

    while let Some(frame) = std::future::poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
        let frame = frame.map_err(|e| {
            tracing::warn!("Raw upload interrupted: {}", e);
            reject(Error::UploadRejected)
        })?;
        if let Some(chunk) = frame.data_ref() {
            receiver.write(chunk);
        }
    }

    let (pixels, mut result) = receiver.finish().map_err(reject)?;
    result.scroll_speed_ms = query.speed.map(clamp_scroll_speed);
    tracing::info!(
        "Raw upload: {} pixels, scroll {:?}",
        result.pixel_count,
        result.scroll_speed_ms
    );
    state.send(ControlCommand::InstallCustomPattern { pixels, result })?;
    Ok(Json(result.into()))
}

/// GET /api/v1/preview.png: PNG of the last pushed frame
#[utoipa::path(
    get,
    path = "/api/v1/preview.png",
    tag = "system",
    responses(
        (status = 200, description = "PNG image", body = Vec<u8>, content_type = "image/png")
    )
)]
async fn get_preview(State(state): State<AppState>) -> Result<impl IntoResponse, (StatusCode, String)> {
    let snapshot = state.shared.preview();
    let png = preview::render_png(&snapshot, DEFAULT_CELL_SIZE).map_err(reject)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::effect::{CATALOGUE, ids};
    use crate::output::HeadlessOutput;
    use crate::render::FrameSnapshot;
    use crate::scheduler::Scheduler;
    use crate::stream::NoPackets;
    use crate::Rgb;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Instant;

    const CAPACITY: usize = 2048;

    fn app() -> (AppState, Receiver<ControlCommand>) {
        let (tx, rx) = mpsc::channel();
        let (_unused_tx, scheduler_rx) = mpsc::channel();
        let now = Instant::now();
        let scheduler = Scheduler::new(
            &ControllerConfig::default(),
            scheduler_rx,
            NoPackets,
            HeadlessOutput::default(),
            now,
        )
        .unwrap();
        let state = AppState {
            command_tx: tx,
            shared: SharedState::new(scheduler.status(now), scheduler.snapshot()),
            patterns: Arc::new(CATALOGUE.iter().copied().map(PatternEntry::from).collect()),
            capacity: CAPACITY,
        };
        (state, rx)
    }

    /// Wait for the handler under test to send its command.
    async fn next_command(rx: &Receiver<ControlCommand>) -> ControlCommand {
        loop {
            if let Ok(command) = rx.try_recv() {
                return command;
            }
            tokio::task::yield_now().await;
        }
    }

    fn raw_headers(len: usize) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, len.to_string().parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn known_pattern_is_forwarded() {
        let (state, rx) = app();
        let id = u32::from(ids::CONFETTI);
        let status = post_pattern(State(state), Json(PatternRequest { id }))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(matches!(rx.try_recv(), Ok(ControlCommand::SelectPattern(ids::CONFETTI))));
    }

    #[rstest]
    #[case(u32::from(ids::STREAMING))]
    #[case(99)]
    #[case(256 + u32::from(ids::CONFETTI))]
    #[case(u32::MAX)]
    #[tokio::test]
    async fn unknown_pattern_is_bad_request(#[case] id: u32) {
        let (state, rx) = app();
        let err = post_pattern(State(state), Json(PatternRequest { id })).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(CAPACITY, true)]
    #[case(CAPACITY + 1, false)]
    #[tokio::test]
    async fn pixel_count_is_range_checked(#[case] count: usize, #[case] ok: bool) {
        let (state, _rx) = app();
        let result = post_pixels(State(state), Json(PixelsRequest { count })).await;
        assert_eq!(result.is_ok(), ok);
    }

    #[tokio::test]
    async fn layout_returns_derived_dimensions() {
        let (state, rx) = app();
        let Json(layout) = post_layout(State(state), Json(LayoutRequest { rows: 2, cols: 3 }))
            .await
            .unwrap();
        assert_eq!((layout.width(), layout.height()), (96, 16));
        assert!(matches!(
            rx.try_recv(),
            Ok(ControlCommand::SetPanelGrid { rows: 2, cols: 3 })
        ));
    }

    #[tokio::test]
    async fn oversized_layout_is_rejected() {
        let (state, rx) = app();
        let err = post_layout(State(state), Json(LayoutRequest { rows: 4, cols: 4 }))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_text_request_is_rejected() {
        let (state, _rx) = app();
        let req = TextRequest {
            text: None,
            speed: None,
        };
        assert!(post_text(State(state), Json(req)).await.is_err());
    }

    #[tokio::test]
    async fn sparse_upload_installs_pattern() {
        let (state, rx) = app();
        let body = Bytes::from_static(br#"{"sparse":[[0,255,0,0],[5,0,0,255]],"scrollSpeed":5}"#);
        let Json(response) = post_upload_pattern(State(state), body).await.unwrap();
        assert_eq!(
            response,
            UploadResponse {
                pixel_count: 2,
                scroll_speed_ms: Some(20)
            }
        );
        let Ok(ControlCommand::InstallCustomPattern { pixels, .. }) = rx.try_recv() else {
            panic!("expected an install command");
        };
        assert_eq!(pixels.get(5), Some(Rgb::BLUE));
    }

    #[tokio::test]
    async fn raw_upload_streams_body_into_pattern() {
        let (state, rx) = app();
        let body = Body::from(vec![1u8, 2, 3, 4, 5, 6]);
        let Json(response) = post_upload_raw(
            State(state),
            Query(RawUploadQuery { speed: Some(80) }),
            raw_headers(6),
            body,
        )
        .await
        .unwrap();
        assert_eq!(response.pixel_count, 2);
        assert_eq!(response.scroll_speed_ms, Some(80));

        let Ok(ControlCommand::InstallCustomPattern { pixels, result }) = rx.try_recv() else {
            panic!("expected an install command");
        };
        assert_eq!(pixels.get(1), Some(Rgb::new(4, 5, 6)));
        assert_eq!(result.scroll_speed_ms, Some(80));
    }

    #[tokio::test]
    async fn oversized_raw_upload_never_switches_pattern() {
        let (state, rx) = app();
        let declared = CAPACITY * 3 + 101;
        let err = post_upload_raw(
            State(state),
            Query(RawUploadQuery { speed: None }),
            raw_headers(declared),
            Body::from(vec![0u8; 16]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn large_pattern_id_deserializes_then_fails_lookup() {
        let (state, _rx) = app();
        let req: PatternRequest = serde_json::from_str(r#"{"id": 300}"#).unwrap();
        let err = post_pattern(State(state), Json(req)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(err.1, "Unknown pattern id 300");
    }

    #[tokio::test]
    async fn timing_comes_from_the_render_thread() {
        let (state, rx) = app();
        let fresh = TimingReport {
            ticks: 7,
            ..TimingReport::default()
        };
        let answer = async {
            match next_command(&rx).await {
                ControlCommand::TakeTiming(reply) => reply.send(fresh.clone()).unwrap(),
                other => panic!("expected a timing request, got {other:?}"),
            }
        };
        let (timing, ()) = tokio::join!(get_timing(State(state)), answer);
        assert_eq!(timing.unwrap().0, fresh);
    }

    #[tokio::test]
    async fn timing_fails_when_reply_is_dropped() {
        let (state, rx) = app();
        let drop_reply = async {
            drop(next_command(&rx).await);
        };
        let (timing, ()) = tokio::join!(get_timing(State(state)), drop_reply);
        assert_eq!(timing.unwrap_err().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn status_reads_do_not_send_commands() {
        let (state, rx) = app();
        let Json(status) = get_status(State(state.clone())).await;
        assert_eq!(status.pattern_id, ids::STATUS_CLOCK);
        let Json(stats) = get_stream_stats(State(state)).await;
        assert!(!stats.active);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn status_json_shape() {
        let (state, _rx) = app();
        let Json(status) = get_status(State(state)).await;
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["mode"], "default");
        assert_eq!(value["layout"]["width"], 32);
        assert_eq!(value["layout"]["height"], 32);
        assert_eq!(value["streaming"]["last_packet_age_ms"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn patterns_list_matches_catalogue() {
        let (state, _rx) = app();
        let Json(patterns) = get_patterns(State(state)).await;
        assert_eq!(patterns.len(), CATALOGUE.len());
        assert_eq!(patterns[0].name, "Rainbow");
    }

    #[tokio::test]
    async fn closed_channel_is_server_error() {
        let (state, rx) = app();
        drop(rx);
        let err = post_stream(State(state)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn preview_is_png() {
        let (state, _rx) = app();
        state.shared.publish(
            state.shared.status(),
            FrameSnapshot {
                layout: GridLayout::tiled(1, 1).unwrap(),
                pixels: vec![Rgb::RED; 256],
            },
        );
        let response = get_preview(State(state)).await.unwrap().into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/status",
            "/api/v1/patterns",
            "/api/v1/pattern",
            "/api/v1/upload/raw",
            "/api/v1/preview.png",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
