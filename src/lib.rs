pub mod channels;
pub mod counter;
pub mod export;
pub mod filter;
pub mod metrics;
pub mod workspace;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use channels::{ChannelRecord, Parser, DEFAULT_GROUP, DEFAULT_NAME};
use counter::VisitorCounter;
use export::{ExportConfig, EXPORT_MIME};
use filter::{FilterConfig, RegionFilter};
use metrics::{MonitoringConfig, CHANNELS_PARSED, PLAYLIST_LOADS, WORKSPACE_ROWS};
use workspace::{Row, RowPatch, Summary, Workspace};

pub const VISITOR_HEADER: &str = "x-visitor-id";

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: usize,
}

impl FetchConfig {
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            accept_invalid_certs: default_accept_invalid_certs(),
            max_body_mb: default_max_body_mb(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_max_body_mb() -> usize {
    50
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub filter: FilterConfig,
    pub export: ExportConfig,
    pub monitoring: MonitoringConfig,
}

struct AppState {
    config: AppConfig,
    filter: RegionFilter,
    workspace: RwLock<Workspace>,
    counter: Arc<VisitorCounter>,
}

pub fn create_app(config: AppConfig, counter: Arc<VisitorCounter>) -> anyhow::Result<Router> {
    let filter = RegionFilter::new(config.filter.keywords.as_slice())?;
    let body_limit = config.fetch.max_body_bytes();
    let monitoring = config.monitoring.enabled;

    let state = Arc::new(AppState {
        config,
        filter,
        workspace: RwLock::new(Workspace::new()),
        counter,
    });

    let mut router = Router::new()
        .route("/", get(index_handler))
        .route("/api/load/url", post(load_url_handler))
        .route("/api/load/file", post(load_file_handler))
        .route(
            "/api/channels",
            get(channels_api_handler).post(insert_channel_handler),
        )
        .route(
            "/api/channels/{index}",
            patch(update_channel_handler).delete(delete_channel_handler),
        )
        .route("/api/selection", post(selection_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/export", get(export_handler))
        .route(
            "/api/visitors",
            get(visitor_stats_handler)
                .post(visitor_increment_handler)
                .delete(visitor_reset_handler),
        );

    if monitoring {
        router = router.route("/metrics", get(metrics_handler));
    }

    Ok(router
        .fallback(fallback_handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state))
}

/// Downloads a playlist and parses it while the body streams in.
pub async fn fetch_playlist(url: &str, config: &FetchConfig) -> anyhow::Result<Vec<ChannelRecord>> {
    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()?;
    let resp = client.get(url).send().await?.error_for_status()?;

    let limit = config.max_body_bytes();
    let mut received = 0usize;
    let mut parser = Parser::new();
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        received += chunk.len();
        if received > limit {
            return Err(anyhow!(
                "playlist at {} exceeds {} MB",
                url,
                config.max_body_mb
            ));
        }
        parser.feed_chunk(&chunk);
    }

    debug!("Fetched {} bytes from {} ({} records so far)", received, url, parser.len());
    Ok(parser.finish())
}

fn visitor_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(VISITOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn count_visit(counter: Arc<VisitorCounter>, visitor: Option<String>) -> anyhow::Result<u64> {
    tokio::task::spawn_blocking(move || counter.increment(visitor.as_deref())).await?
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, message.into()).into_response()
}

async fn fallback_handler(method: Method, uri: Uri, headers: HeaderMap) -> impl IntoResponse {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("<none>");
    info!("HTTP 404: method={} uri={} UA=\"{}\"", method, uri, user_agent);
    error_response(StatusCode::NOT_FOUND, "Not found")
}

#[derive(Debug, Deserialize)]
pub struct LoadUrlRequest {
    pub url: String,
    pub restrict: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LoadFileQuery {
    pub restrict: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadResponse {
    pub parsed: usize,
    pub kept: usize,
    pub restricted: bool,
}

async fn replace_workspace(
    state: &AppState,
    source: &str,
    records: Vec<ChannelRecord>,
    restrict: bool,
) -> LoadResponse {
    let parsed = records.len();
    let kept = state.filter.apply(&records, restrict);
    let kept_len = kept.len();

    CHANNELS_PARSED.inc_by(parsed as u64);
    PLAYLIST_LOADS.with_label_values(&[source, "ok"]).inc();

    let mut workspace = state.workspace.write().await;
    workspace.replace(kept);
    WORKSPACE_ROWS.set(workspace.len() as i64);

    if kept_len == 0 {
        warn!("Playlist from {} produced no channels (parsed={} restrict={})", source, parsed, restrict);
    } else {
        info!("Loaded playlist from {}: parsed={} kept={} restrict={}", source, parsed, kept_len, restrict);
    }

    LoadResponse {
        parsed,
        kept: kept_len,
        restricted: restrict,
    }
}

async fn load_url_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoadUrlRequest>,
) -> Response {
    let url = payload.url.trim();
    if url.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing playlist URL");
    }
    let restrict = payload
        .restrict
        .unwrap_or(state.config.filter.restrict_by_default);

    info!("Fetching playlist from {} (restrict={})", url, restrict);
    match fetch_playlist(url, &state.config.fetch).await {
        Ok(records) => Json(replace_workspace(&state, "url", records, restrict).await).into_response(),
        Err(e) => {
            error!("Failed to fetch playlist from {}: {:#}", url, e);
            PLAYLIST_LOADS.with_label_values(&["url", "error"]).inc();
            error_response(StatusCode::BAD_GATEWAY, format!("Failed to fetch playlist: {e:#}"))
        }
    }
}

async fn load_file_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoadFileQuery>,
    body: Bytes,
) -> Response {
    let restrict = query.restrict.unwrap_or(false);
    info!("Parsing uploaded playlist: bytes={} restrict={}", body.len(), restrict);
    let records = channels::parse_m3u_bytes(&body);
    Json(replace_workspace(&state, "file", records, restrict).await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

async fn channels_api_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<Row>> {
    let workspace = state.workspace.read().await;
    Json(workspace.rows(query.search.as_deref()))
}

#[derive(Debug, Deserialize)]
pub struct NewChannel {
    pub group: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub selected: bool,
}

async fn insert_channel_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewChannel>,
) -> Response {
    let record = ChannelRecord {
        group: payload.group.unwrap_or_else(|| DEFAULT_GROUP.to_string()),
        name: payload.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
        url: payload.url.unwrap_or_default(),
        selected: payload.selected,
    };
    let mut workspace = state.workspace.write().await;
    let index = workspace.insert(record.clone());
    WORKSPACE_ROWS.set(workspace.len() as i64);
    debug!("Inserted row {}: name=\"{}\"", index, record.name);
    (StatusCode::CREATED, Json(Row { index, record })).into_response()
}

async fn update_channel_handler(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Json(row_patch): Json<RowPatch>,
) -> Response {
    let mut workspace = state.workspace.write().await;
    match workspace.update(index, row_patch) {
        Ok(record) => Json(Row {
            index,
            record: record.clone(),
        })
        .into_response(),
        Err(e) => {
            warn!("Row update rejected: {}", e);
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
    }
}

async fn delete_channel_handler(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Response {
    let mut workspace = state.workspace.write().await;
    match workspace.remove(index) {
        Ok(record) => {
            WORKSPACE_ROWS.set(workspace.len() as i64);
            debug!("Removed row {}: name=\"{}\"", index, record.name);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            warn!("Row delete rejected: {}", e);
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub selected: bool,
}

async fn selection_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SelectionRequest>,
) -> Json<Summary> {
    let mut workspace = state.workspace.write().await;
    workspace.set_all_selected(payload.selected);
    Json(workspace.summary())
}

async fn summary_handler(State(state): State<Arc<AppState>>) -> Json<Summary> {
    Json(state.workspace.read().await.summary())
}

async fn export_handler(State(state): State<Arc<AppState>>) -> Response {
    let plan = state
        .workspace
        .read()
        .await
        .export(&state.config.export.file_prefix);
    info!(
        "Exporting {} channels as {} (selected_only={})",
        plan.count, plan.file_name, plan.selected_only
    );
    (
        [
            (header::CONTENT_TYPE, EXPORT_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", plan.file_name),
            ),
        ],
        plan.body,
    )
        .into_response()
}

async fn visitor_stats_handler(State(state): State<Arc<AppState>>) -> Response {
    let counter = state.counter.clone();
    match tokio::task::spawn_blocking(move || counter.get_stats()).await {
        Ok(Ok(stats)) => Json(stats).into_response(),
        Ok(Err(e)) => {
            error!("Failed to read visitor stats: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Visitor stats unavailable")
        }
        Err(e) => {
            error!("Visitor stats task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Visitor stats unavailable")
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VisitResponse {
    pub total_visits: u64,
}

async fn visitor_increment_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    match count_visit(state.counter.clone(), visitor_id(&headers)).await {
        Ok(total_visits) => Json(VisitResponse { total_visits }).into_response(),
        Err(e) => {
            error!("Failed to count visit: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Visit not recorded")
        }
    }
}

async fn visitor_reset_handler(State(state): State<Arc<AppState>>) -> Response {
    let counter = state.counter.clone();
    match tokio::task::spawn_blocking(move || counter.reset()).await {
        Ok(Ok(())) => {
            info!("Visitor counter reset: {}", state.counter.path().display());
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(Err(e)) => {
            error!("Failed to reset visitor counter: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Visitor counter not reset")
        }
        Err(e) => {
            error!("Visitor reset task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Visitor counter not reset")
        }
    }
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(text) => text.into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Metrics unavailable")
        }
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

async fn index_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Html<String> {
    // The page still renders when the counter file can't be written.
    if let Err(e) = count_visit(state.counter.clone(), visitor_id(&headers)).await {
        warn!("Failed to count visit: {:#}", e);
    }

    let workspace = state.workspace.read().await;
    let summary = workspace.summary();

    let mut html = String::from(r#"<!DOCTYPE html>
<html lang="tr">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>M3U Editör</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 20px; background: #0d0d0d; color: #fff; }
        table { border-collapse: collapse; width: 100%; }
        th, td { text-align: left; padding: 6px 10px; border-bottom: 1px solid #333; }
        .stats span { margin-right: 20px; color: #a0a0a0; }
    </style>
</head>
<body>
    <h1>M3U Editör</h1>
"#);

    html.push_str(&format!(
        r#"    <div class="stats"><span>Toplam Kanal: {}</span><span>Seçilen Kanal: {}</span><span>Grup Sayısı: {}</span></div>
    <p><a href="/api/export">M3U indir</a></p>
"#,
        summary.total, summary.selected, summary.groups
    ));

    if workspace.is_empty() {
        html.push_str("    <p>Henüz kanal yok. /api/load/url veya /api/load/file ile bir liste yükleyin.</p>\n");
    } else {
        html.push_str("    <table>\n        <tr><th>#</th><th>Seç</th><th>Grup</th><th>Kanal Adı</th><th>URL</th></tr>\n");
        for (i, record) in workspace.records().iter().enumerate() {
            html.push_str(&format!(
                "        <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                i,
                if record.selected { "✔" } else { "" },
                escape_html(&record.group),
                escape_html(&record.name),
                escape_html(&record.url),
            ));
        }
        html.push_str("    </table>\n");
    }

    html.push_str("</body>\n</html>\n");
    Html(html)
}
