use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{
    ADMIN_AUTH_FAILURES_TOTAL, REQUESTS_TOTAL, REQUEST_DURATION_SECONDS, RESERVATIONS_TOTAL,
    ROOMS_ACTIVE,
};

const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub admin_key: Arc<str>,
}

/// API error envelope: `{"error": "...", "code": "..."}` with an HTTP
/// status mapped from the engine error.
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "missing or invalid admin key".into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let (status, code) = match &e {
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            EngineError::RoomUnavailable(_) => (StatusCode::CONFLICT, "room_unavailable"),
            EngineError::RaceLost(_) => (StatusCode::CONFLICT, "race_lost"),
            EngineError::InvalidDateRange { .. } => (StatusCode::BAD_REQUEST, "invalid_date_range"),
            EngineError::PastCheckIn(_) => (StatusCode::BAD_REQUEST, "past_check_in"),
            EngineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            EngineError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, "limit_exceeded"),
            EngineError::LedgerError(_) => (StatusCode::SERVICE_UNAVAILABLE, "ledger_error"),
        };
        Self { status, code, message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message, "code": self.code }));
        (self.status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/:id", put(update_room).delete(delete_room))
        .route("/rooms/:id/bookings", get(room_bookings))
        .route("/seasons", get(list_seasons).post(add_season))
        .route("/seasons/:id", put(update_season).delete(remove_season))
        .route("/bookings", get(list_bookings))
        .route("/bookings/:id/status", put(set_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/:id", get(room_info))
        .route("/rooms/:id/availability", get(availability))
        .route("/rooms/:id/quote", get(quote))
        .route("/rooms/:id/events", get(room_events))
        .route("/bookings", post(reserve))
        .nest("/admin", admin)
        .layer(middleware::from_fn(track_metrics))
        .with_state(state)
}

async fn require_admin<B>(
    State(state): State<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    let presented = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if presented != Some(state.admin_key.as_ref()) {
        metrics::counter!(ADMIN_AUTH_FAILURES_TOTAL).increment(1);
        return Err(ApiError::unauthorized());
    }
    Ok(next.run(req).await)
}

async fn track_metrics<B>(req: Request<B>, next: Next<B>) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = req.method().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        REQUESTS_TOTAL,
        "route" => route.clone(), "method" => method.clone(), "status" => status
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "route" => route, "method" => method)
        .record(start.elapsed().as_secs_f64());
    response
}

// ── Public: catalog ──────────────────────────────────────

async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomInfo>> {
    let rooms = state.engine.list_rooms().await;
    metrics::gauge!(ROOMS_ACTIVE).set(rooms.len() as f64);
    Json(rooms)
}

async fn room_info(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<Json<RoomInfo>, ApiError> {
    Ok(Json(state.engine.room_info(id).await?))
}

// ── Public: availability & pricing ───────────────────────

#[derive(Deserialize)]
struct WindowQuery {
    from: NaiveDate,
    to: NaiveDate,
}

async fn availability(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Query(q): Query<WindowQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let booked = state.engine.availability_window(id, q.from, q.to).await?;
    Ok(Json(json!({
        "room_id": id,
        "from": q.from,
        "to": q.to,
        "available": booked.is_empty(),
        "booked": booked,
    })))
}

#[derive(Deserialize)]
struct QuoteQuery {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

async fn quote(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Query(q): Query<QuoteQuery>,
) -> Result<Json<Quote>, ApiError> {
    Ok(Json(state.engine.quote_room(id, q.check_in, q.check_out).await?))
}

// ── Public: reservation ──────────────────────────────────

async fn reserve(
    State(state): State<AppState>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let result = state.engine.reserve(req).await;
    let outcome = match &result {
        Ok(_) => "reserved",
        Err(EngineError::RoomUnavailable(_)) => "unavailable",
        Err(EngineError::RaceLost(_)) => "race_lost",
        Err(EngineError::LedgerError(_)) => "error",
        Err(_) => "invalid",
    };
    metrics::counter!(RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
    if let Err(e) = &result
        && e.is_retryable() {
            tracing::warn!("reservation failed transiently: {e}");
        }
    Ok((StatusCode::CREATED, Json(result?)))
}

// ── Public: live change feed ─────────────────────────────

async fn room_events(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if state.engine.get_room(&id).is_none() {
        return Err(EngineError::NotFound(id).into());
    }
    let rx = state.engine.notify.subscribe(id);
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).ok()?;
                    return Some((Ok(SseEvent::default().data(data)), rx));
                }
                // Slow consumer skipped some events; keep streaming
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── Admin: room catalog ──────────────────────────────────

async fn create_room(
    State(state): State<AppState>,
    Json(draft): Json<RoomDraft>,
) -> Result<(StatusCode, Json<RoomInfo>), ApiError> {
    let id = Ulid::new();
    state.engine.create_room(id, draft).await?;
    Ok((StatusCode::CREATED, Json(state.engine.room_info(id).await?)))
}

async fn update_room(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(draft): Json<RoomDraft>,
) -> Result<Json<RoomInfo>, ApiError> {
    state.engine.update_room(id, draft).await?;
    Ok(Json(state.engine.room_info(id).await?))
}

async fn delete_room(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_room(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Admin: pricing rules ─────────────────────────────────

async fn list_seasons(State(state): State<AppState>) -> Json<Vec<Season>> {
    Json(state.engine.list_seasons().await)
}

async fn add_season(
    State(state): State<AppState>,
    Json(draft): Json<SeasonDraft>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let id = Ulid::new();
    state.engine.add_season(id, draft).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn update_season(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(draft): Json<SeasonDraft>,
) -> Result<StatusCode, ApiError> {
    state.engine.update_season(id, draft).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_season(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<StatusCode, ApiError> {
    state.engine.remove_season(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Admin: booking ledger ────────────────────────────────

async fn list_bookings(State(state): State<AppState>) -> Json<Vec<Booking>> {
    Json(state.engine.list_bookings())
}

async fn room_bookings(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Json<Vec<Booking>> {
    Json(state.engine.bookings_for_room(id).await)
}

#[derive(Deserialize)]
struct StatusBody {
    status: BookingStatus,
}

async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(state.engine.set_status(id, body.status).await?))
}
