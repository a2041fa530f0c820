//! HTTP/WebSocket Handlers

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket},
        FromRequestParts, Path, State, WebSocketUpgrade,
    },
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use picaso_core::{
    Artwork, Filters, GenerationError, GeneratorInfo, NoProgress, PipelineError, ProfileId,
    QuotaStatus,
};
use picaso_core::persistence::PersistenceAttempt;
use picaso_payments::{handle_cancel, handle_success, CancelNotice, CheckoutError, OrderConfirmation};

use crate::state::AppState;

/// Header carrying the caller's profile ID
pub const PROFILE_HEADER: &str = "x-profile-id";

const MAX_PROFILE_ID_LEN: usize = 128;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<i64>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
            reset_at: None,
        }),
    )
}

impl From<PipelineError> for ErrorResponse {
    fn from(e: PipelineError) -> Self {
        let reset_at = match e {
            PipelineError::QuotaExceeded { reset_at } => Some(reset_at),
            _ => None,
        };
        Self {
            error: e.user_message(),
            code: e.code().into(),
            reset_at,
        }
    }
}

fn pipeline_status(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
        PipelineError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        PipelineError::Generation(g) => generation_status(g),
        PipelineError::Persistence(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

const fn generation_status(e: &GenerationError) -> StatusCode {
    match e {
        GenerationError::ContentPolicyViolation(_) => StatusCode::BAD_REQUEST,
        GenerationError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        GenerationError::TransientNetwork(_) | GenerationError::Upstream(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn pipeline_error(e: PipelineError) -> ApiError {
    (pipeline_status(&e), Json(ErrorResponse::from(e)))
}

fn checkout_error(e: &CheckoutError) -> ApiError {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    api_error(status, e.user_message(), e.code())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub generator: Option<GeneratorInfo>,
    pub persistence: Vec<String>,
    pub stripe_configured: bool,
}

#[derive(Debug, Deserialize)]
pub struct GenerateImageRequest {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    pub success: bool,
    pub image_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    #[serde(flatten)]
    pub status: QuotaStatus,
    pub time_until_reset: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkRequest {
    pub prompt: String,
    #[serde(default)]
    pub filters: Filters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkResponse {
    pub artwork: Artwork,
    pub quota: QuotaStatus,
    pub persistence: Vec<PersistenceAttempt>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub image_url: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteCheckoutRequest {
    pub session_id: String,
}

/// WebSocket request frame
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub profile_id: String,
    pub prompt: String,
    #[serde(default)]
    pub filters: Filters,
}

/// WebSocket response frames
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Progress {
        percentage: u8,
        message: String,
    },
    Complete {
        artwork: Artwork,
        quota: QuotaStatus,
    },
    Error {
        #[serde(flatten)]
        error: ErrorResponse,
    },
}

// ============================================================================
// Extractors
// ============================================================================

fn parse_profile(raw: &str) -> Option<ProfileId> {
    let raw = raw.trim();
    let valid = !raw.is_empty()
        && raw.len() <= MAX_PROFILE_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| ProfileId::from_string(raw))
}

/// Profile identified by the `x-profile-id` header
pub struct Profile(pub ProfileId);

impl<S: Send + Sync> FromRequestParts<S> for Profile {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(PROFILE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_profile)
            .map(Self)
            .ok_or_else(|| {
                api_error(
                    StatusCode::BAD_REQUEST,
                    "Missing or invalid x-profile-id header",
                    "MISSING_PROFILE",
                )
            })
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        generator: state.generator.as_ref().map(|g| g.info()),
        persistence: state
            .chain
            .strategy_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        stripe_configured: state.checkout.is_some(),
    })
}

/// Thin generation proxy: composed prompt in, provider URL out
pub async fn generate_image(
    State(state): State<AppState>,
    Json(payload): Json<GenerateImageRequest>,
) -> Result<Json<GenerateImageResponse>, ApiError> {
    if payload.prompt.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Missing required field: prompt is required",
            "VALIDATION_ERROR",
        ));
    }

    let generator = state.generator.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Image generation not configured",
            "GENERATION_DISABLED",
        )
    })?;

    let timeout = state.pipeline_config.generation_timeout;
    let image_url = tokio::time::timeout(timeout, generator.generate(&payload.prompt))
        .await
        .unwrap_or_else(|_| {
            Err(GenerationError::TransientNetwork(format!(
                "generation timed out after {timeout:?}"
            )))
        })
        .map_err(|e| {
            tracing::error!(category = e.category(), "Generation error: {}", e);
            api_error(generation_status(&e), e.user_message(), PipelineError::from(e).code())
        })?;

    Ok(Json(GenerateImageResponse {
        success: true,
        image_url,
    }))
}

/// Current quota for the calling profile
pub async fn quota_status(
    State(state): State<AppState>,
    Profile(profile): Profile,
) -> Json<QuotaResponse> {
    let status = state.quota_tracker(&profile).check_status();
    let time_until_reset = status.time_until_reset(state.clock.now_ms());
    Json(QuotaResponse {
        status,
        time_until_reset,
    })
}

/// Run the full pipeline and store the result as the current artwork
pub async fn create_artwork(
    State(state): State<AppState>,
    Profile(profile): Profile,
    Json(payload): Json<ArtworkRequest>,
) -> Result<Json<ArtworkResponse>, ApiError> {
    let pipeline = state.pipeline(&profile).ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Image generation not configured",
            "GENERATION_DISABLED",
        )
    })?;

    let outcome = pipeline
        .submit(&payload.prompt, payload.filters, &NoProgress)
        .await
        .map_err(pipeline_error)?;

    if let Err(e) = state.artwork_session(&profile).save(&outcome.artwork) {
        tracing::warn!(profile = %profile, error = %e, "Failed to save artwork snapshot");
    }

    Ok(Json(ArtworkResponse {
        artwork: outcome.artwork,
        quota: outcome.quota,
        persistence: outcome.persistence_attempts,
    }))
}

/// Most recent artwork for the calling profile
pub async fn current_artwork(
    State(state): State<AppState>,
    Profile(profile): Profile,
) -> Result<Json<Artwork>, ApiError> {
    match state.artwork_session(&profile).load() {
        Ok(Some(artwork)) => Ok(Json(artwork)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "No artwork yet", "NOT_FOUND")),
        Err(e) => {
            tracing::error!("Snapshot read error: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not load your artwork.",
                "STORAGE_ERROR",
            ))
        }
    }
}

/// WebSocket pipeline runs with live progress
pub async fn artwork_stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        let event = match serde_json::from_str::<StreamRequest>(msg.as_str()) {
            Ok(request) => run_streamed(&state, request, &mut sender).await,
            Err(e) => StreamEvent::Error {
                error: ErrorResponse {
                    error: e.to_string(),
                    code: "BAD_REQUEST".into(),
                    reset_at: None,
                },
            },
        };

        if send_event(&mut sender, &event).await.is_err() {
            break;
        }
    }
}

async fn send_event<S>(sender: &mut S, event: &StreamEvent) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(event).unwrap_or_default();
    sender.send(Message::Text(text.into())).await
}

/// Run one request, forwarding progress as it happens; returns the final frame
async fn run_streamed<S>(state: &AppState, request: StreamRequest, sender: &mut S) -> StreamEvent
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let Some(profile) = parse_profile(&request.profile_id) else {
        return StreamEvent::Error {
            error: ErrorResponse {
                error: "Missing or invalid profileId".into(),
                code: "MISSING_PROFILE".into(),
                reset_at: None,
            },
        };
    };
    let Some(pipeline) = state.pipeline(&profile) else {
        return StreamEvent::Error {
            error: ErrorResponse {
                error: "Image generation not configured".into(),
                code: "GENERATION_DISABLED".into(),
                reset_at: None,
            },
        };
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let run = async move {
        let observer = move |percentage: u8, message: &str| {
            let _ = tx.send(StreamEvent::Progress {
                percentage,
                message: message.to_string(),
            });
        };
        pipeline
            .submit(&request.prompt, request.filters, &observer)
            .await
    };
    let forward = async {
        while let Some(event) = rx.recv().await {
            if send_event(&mut *sender, &event).await.is_err() {
                break;
            }
        }
    };

    let (result, ()) = tokio::join!(run, forward);

    match result {
        Ok(outcome) => {
            if let Err(e) = state.artwork_session(&profile).save(&outcome.artwork) {
                tracing::warn!(profile = %profile, error = %e, "Failed to save artwork snapshot");
            }
            StreamEvent::Complete {
                artwork: outcome.artwork,
                quota: outcome.quota,
            }
        }
        Err(e) => StreamEvent::Error { error: e.into() },
    }
}

/// Create Stripe checkout session
///
/// Uses the posted `imageUrl`/`prompt`, or the profile's current artwork when
/// the body omits them.
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Profile(profile): Profile,
    payload: Option<Json<CheckoutRequest>>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let checkout = state.checkout.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let artwork = match (payload.image_url, payload.prompt) {
        (Some(image_url), Some(prompt)) => Artwork {
            image_url,
            prompt,
            filters: Filters::new(),
            timestamp: state.clock.now_ms(),
            is_permanent: false,
        },
        _ => match state.artwork_session(&profile).load() {
            Ok(Some(artwork)) => artwork,
            Ok(None) => {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "Missing required fields: imageUrl and prompt are required",
                    "INVALID_REQUEST",
                ));
            }
            Err(e) => {
                tracing::error!("Snapshot read error: {}", e);
                return Err(api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not load your artwork.",
                    "STORAGE_ERROR",
                ));
            }
        },
    };

    let session = checkout.create_checkout(&artwork).await.map_err(|e| {
        tracing::error!("Checkout error: {}", e);
        checkout_error(&e)
    })?;

    Ok(Json(CheckoutResponse {
        session_id: session.session_id,
        url: session.url,
    }))
}

/// Buyer returned from a successful checkout
pub async fn complete_checkout(
    State(state): State<AppState>,
    Profile(profile): Profile,
    Json(payload): Json<CompleteCheckoutRequest>,
) -> Json<OrderConfirmation> {
    let today = Utc
        .timestamp_millis_opt(state.clock.now_ms())
        .single()
        .unwrap_or_else(Utc::now)
        .date_naive();
    Json(handle_success(
        &state.artwork_session(&profile),
        &payload.session_id,
        today,
    ))
}

/// Buyer abandoned checkout
pub async fn cancel_checkout(
    State(state): State<AppState>,
    Profile(profile): Profile,
) -> Json<CancelNotice> {
    Json(handle_cancel(&state.artwork_session(&profile)))
}

/// Serve images held by the in-memory object store
pub async fn stored_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let object = state
        .memory_objects
        .as_ref()
        .and_then(|store| store.get(&format!("images/{key}")))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Image not found", "NOT_FOUND"))?;

    Ok((
        [(header::CONTENT_TYPE, object.content_type)],
        Body::from(object.bytes),
    )
        .into_response())
}
