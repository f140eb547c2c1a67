//! HTTP API for events, the claim lifecycle and the organizer page.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::abuse::{self, RateLimiter};
use crate::auth;
use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::protocol::*;
use crate::types::DeviceId;

/// Header identifying the calling device. Clients generate it once and keep it.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Error returned by every handler
#[derive(Debug)]
pub enum ApiError {
    Exchange(ExchangeError),
    MissingDeviceId,
}

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        Self::Exchange(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingDeviceId => StatusCode::BAD_REQUEST,
            Self::Exchange(err) => match err {
                ExchangeError::InsufficientParticipants { .. } | ExchangeError::InvalidInput(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ExchangeError::AlreadyBound { .. } | ExchangeError::NoAssignment(_) => {
                    StatusCode::CONFLICT
                }
                ExchangeError::NotOwner(_) => StatusCode::FORBIDDEN,
                ExchangeError::NotFound(_) => StatusCode::NOT_FOUND,
                ExchangeError::InvalidCredential => StatusCode::UNAUTHORIZED,
                ExchangeError::AssignmentInvariantViolation(_) | ExchangeError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::MissingDeviceId => ErrorBody {
                code: "MISSING_DEVICE_ID".to_string(),
                msg: format!("The {} header is required", DEVICE_ID_HEADER),
            },
            Self::Exchange(err) => ErrorBody {
                code: err.code().to_string(),
                msg: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();

        if status.is_server_error() {
            tracing::error!(code = body.code.as_str(), msg = body.msg.as_str(), "Request failed");
        } else {
            tracing::debug!(code = body.code.as_str(), msg = body.msg.as_str(), "Request rejected");
        }

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"Organizer\""),
            );
        }
        response
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn device_header(parts: &Parts) -> Option<DeviceId> {
    parts
        .headers
        .get(DEVICE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The calling device, required
pub struct Device(pub DeviceId);

impl<S: Send + Sync> FromRequestParts<S> for Device {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        device_header(parts).map(Device).ok_or(ApiError::MissingDeviceId)
    }
}

/// The calling device, if it identified itself
pub struct MaybeDevice(pub Option<DeviceId>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeDevice {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeDevice(device_header(parts)))
    }
}

/// Build the application router.
///
/// The claim endpoints are rate limited per device when a limiter is given.
pub fn router(exchange: Arc<Exchange>, limiter: Option<Arc<RateLimiter>>) -> Router {
    let mut claim_routes = Router::new()
        .route("/api/events/{id}/select", post(select_slot))
        .route("/api/events/{id}/confirm", post(confirm))
        .route("/api/events/{id}/binding", delete(release_binding))
        .route("/api/events/{id}/wish", put(set_wish));

    if let Some(limiter) = limiter {
        claim_routes = claim_routes.route_layer(middleware::from_fn_with_state(
            limiter,
            abuse::rate_limit_middleware,
        ));
    }

    Router::new()
        .route("/health", get(health))
        .route("/api/events", post(create_event))
        .route("/api/events/{id}", get(event_page))
        .route("/api/events/{id}/me", get(current_identity))
        .route("/api/events/{id}/wishes", get(wish_list))
        .route("/api/events/{id}/admin", get(organizer_overview))
        .merge(claim_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(exchange)
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// POST /api/events
async fn create_event(
    State(exchange): State<Arc<Exchange>>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<CreatedEvent>), ApiError> {
    let created = exchange.create_event(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/events/{id}
async fn event_page(
    State(exchange): State<Arc<Exchange>>,
    Path(event_id): Path<String>,
    MaybeDevice(device): MaybeDevice,
) -> ApiResult<EventPage> {
    Ok(Json(exchange.event_page(&event_id, device.as_deref()).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RevealQuery {
    #[serde(default)]
    pub show: bool,
}

/// GET /api/events/{id}/me
///
/// Responds with `null` when the device holds no binding. The recipient
/// starts hidden unless `?show=true` is passed.
async fn current_identity(
    State(exchange): State<Arc<Exchange>>,
    Path(event_id): Path<String>,
    Query(query): Query<RevealQuery>,
    Device(device): Device,
) -> ApiResult<Option<Reveal>> {
    let mut reveal = exchange.current_identity(&event_id, &device).await?;
    if query.show {
        if let Some(reveal) = reveal.as_mut() {
            reveal.toggle();
        }
    }
    Ok(Json(reveal))
}

/// POST /api/events/{id}/select
async fn select_slot(
    State(exchange): State<Arc<Exchange>>,
    Path(event_id): Path<String>,
    Device(device): Device,
    Json(request): Json<SelectSlotRequest>,
) -> ApiResult<SlotSelection> {
    Ok(Json(
        exchange
            .select_slot(&event_id, &device, &request.participant_id)
            .await?,
    ))
}

/// POST /api/events/{id}/confirm
async fn confirm(
    State(exchange): State<Arc<Exchange>>,
    Path(event_id): Path<String>,
    Device(device): Device,
    Json(request): Json<ConfirmRequest>,
) -> ApiResult<ConfirmOutcome> {
    Ok(Json(
        exchange
            .confirm(&event_id, &device, &request.participant_id, request.is_me)
            .await?,
    ))
}

/// DELETE /api/events/{id}/binding
async fn release_binding(
    State(exchange): State<Arc<Exchange>>,
    Path(event_id): Path<String>,
    Device(device): Device,
) -> ApiResult<ReleasedBinding> {
    Ok(Json(exchange.release_binding(&event_id, &device).await?))
}

/// PUT /api/events/{id}/wish
async fn set_wish(
    State(exchange): State<Arc<Exchange>>,
    Path(event_id): Path<String>,
    Device(device): Device,
    Json(request): Json<SetWishRequest>,
) -> ApiResult<RosterEntry> {
    Ok(Json(
        exchange
            .set_wish(&event_id, &device, &request.participant_id, &request.wish)
            .await?,
    ))
}

/// GET /api/events/{id}/wishes
async fn wish_list(
    State(exchange): State<Arc<Exchange>>,
    Path(event_id): Path<String>,
) -> ApiResult<Vec<WishEntry>> {
    Ok(Json(exchange.wish_list(&event_id).await?))
}

/// GET /api/events/{id}/admin
///
/// Password via HTTP Basic auth or the organizer password header.
async fn organizer_overview(
    State(exchange): State<Arc<Exchange>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<OrganizerOverview> {
    let password = auth::presented_password(&headers).ok_or(ExchangeError::InvalidCredential)?;
    Ok(Json(exchange.organizer_overview(&event_id, &password).await?))
}
