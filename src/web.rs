use crate::{
    app::{
        errors::AppError,
        service::{
            CatalogResponse, CollectionStatus, RefreshResponse, SearchResponse, SearchService,
            StatsResponse,
        },
    },
    catalog::{BirdDetail, BirdId},
    config::Config,
};
use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, PathRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{collections::BTreeMap, sync::Arc};
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Clone)]
struct SharedState {
    service: Arc<SearchService>,
}

/// All routes with their layers, ready to serve or to drive from tests.
pub fn router(service: Arc<SearchService>, config: &Config) -> Router {
    let shared_state = Arc::new(SharedState { service });

    Router::new()
        .nest_service(
            "/audio",
            tower_http::services::ServeDir::new(&config.media.audio_dir),
        )
        .route("/", get(root))
        .route("/collections/status", get(collections_status))
        .route("/refresh-cache", get(refresh_cache).post(refresh_cache))
        .route("/search/text", post(search_text))
        .route("/search/image", post(search_image))
        .route("/search/audio", post(search_audio))
        .route("/bird/:id", get(bird))
        .route("/birds/all", get(all_birds))
        .route("/stats", get(stats))
        .route("/enhance-description", post(enhance_description))
        .layer(DefaultBodyLimit::max(config.server.max_upload_bytes))
        .layer(cors_layer(&config.server.cors_origins))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins = origins.iter().filter_map(|origin| match origin.parse::<HeaderValue>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring invalid cors origin {origin:?}");
            None
        }
    });
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn start_app(service: SearchService, config: Config) -> anyhow::Result<()> {
    let app = router(Arc::new(service), &config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::warn!("received Ctrl+C, shutting down"),
        _ = terminate => log::warn!("received SIGTERM, shutting down"),
    }
}

pub fn start_daemon(service: SearchService, config: Config) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(service, config))
}

// Wraps `AppError` so handlers can return it.
#[derive(Debug)]
pub struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0 {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) | AppError::InvalidMedia(_) => StatusCode::BAD_REQUEST,
            AppError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) | AppError::Embedding(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

// Lets handlers use `?` on anything that converts into `AppError`.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Multi-Modal Bird Search API",
        "status": "active",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn collections_status(
    State(state): State<Arc<SharedState>>,
) -> Json<BTreeMap<String, CollectionStatus>> {
    let service = state.service.clone();
    Json(tokio::task::block_in_place(|| service.collections_status()))
}

async fn refresh_cache(State(state): State<Arc<SharedState>>) -> Json<RefreshResponse> {
    let service = state.service.clone();
    Json(tokio::task::block_in_place(|| service.refresh()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextSearchRequest {
    pub query: String,
    pub limit: Option<usize>,
}

async fn search_text(
    State(state): State<Arc<SharedState>>,
    payload: Result<Json<TextSearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, HttpError> {
    let Json(payload) = payload?;
    log::debug!("payload: {payload:?}");

    let service = state.service.clone();
    let response =
        tokio::task::block_in_place(|| service.search_text(&payload.query, payload.limit))?;

    Ok(Json(response))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

struct Upload {
    data: Bytes,
    content_type: Option<String>,
}

fn rejection_error(status: StatusCode, message: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::TooLarge(message);
    }
    AppError::InvalidInput(message)
}

// axum answers its own rejections in plain text; these keep the JSON error shape
impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        rejection_error(err.status(), err.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(err: PathRejection) -> Self {
        rejection_error(err.status(), err.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        rejection_error(err.status(), err.body_text())
    }
}

/// Reads the `file` field of a multipart form.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, HttpError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;

        log::debug!(
            "upload bytes={} type={}",
            data.len(),
            content_type.as_deref().unwrap_or("-")
        );
        return Ok(Upload { data, content_type });
    }

    Err(HttpError(AppError::InvalidInput(
        "missing multipart field \"file\"".to_string(),
    )))
}

async fn search_image(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<LimitParams>,
    multipart: Multipart,
) -> Result<Json<SearchResponse>, HttpError> {
    let upload = read_upload(multipart).await?;

    let service = state.service.clone();
    let response = tokio::task::block_in_place(|| {
        service.search_image(&upload.data, upload.content_type.as_deref(), params.limit)
    })?;

    Ok(Json(response))
}

async fn search_audio(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<LimitParams>,
    multipart: Multipart,
) -> Result<Json<SearchResponse>, HttpError> {
    let upload = read_upload(multipart).await?;

    let service = state.service.clone();
    let response = tokio::task::block_in_place(|| {
        service.search_audio(&upload.data, upload.content_type.as_deref(), params.limit)
    })?;

    Ok(Json(response))
}

async fn bird(
    State(state): State<Arc<SharedState>>,
    path: Result<Path<BirdId>, PathRejection>,
) -> Result<Json<BirdDetail>, HttpError> {
    let Path(bird_id) = path?;
    Ok(Json(state.service.bird(bird_id)?))
}

async fn all_birds(State(state): State<Arc<SharedState>>) -> Json<CatalogResponse> {
    Json(state.service.all_birds())
}

async fn stats(State(state): State<Arc<SharedState>>) -> Json<StatsResponse> {
    Json(state.service.stats())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnhanceRequest {
    #[serde(default)]
    pub raw_text_data: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnhanceResponse {
    pub enhanced_description: String,
}

async fn enhance_description(
    State(state): State<Arc<SharedState>>,
    payload: Result<Json<EnhanceRequest>, JsonRejection>,
) -> Result<Json<EnhanceResponse>, HttpError> {
    let Json(payload) = payload?;

    let service = state.service.clone();
    let enhanced_description =
        tokio::task::block_in_place(|| service.enhance_description(&payload.raw_text_data));

    Ok(Json(EnhanceResponse {
        enhanced_description,
    }))
}
