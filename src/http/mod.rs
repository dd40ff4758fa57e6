//! JSON API over the engine. Handlers parse and authorize, the engine decides.

mod admin;
mod bookings;
pub mod error;
mod hotels;
pub mod views;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{FromRequestParts, MatchedPath, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use ulid::Ulid;

use crate::engine::Engine;
use crate::identity::{IdentityError, IdentityProvider};
use crate::model::Caller;
use crate::observability::{AUTH_FAILURES_TOTAL, HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub identity: Arc<dyn IdentityProvider>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/hotels", get(hotels::list))
        .route("/hotels/:id", get(hotels::detail))
        .route("/hotels/:id/availability", get(hotels::availability_map))
        .route("/availability", get(hotels::availability))
        .route("/bookings", get(bookings::list).post(bookings::create))
        .route("/bookings/:id", get(bookings::get).patch(bookings::modify))
        .route("/bookings/:id/cancel", patch(bookings::cancel))
        .route("/admin/bookings/:id/confirm", post(admin::confirm_booking))
        .route("/admin/hotels", post(admin::create_hotel))
        .route("/admin/hotels/:id", patch(admin::update_hotel))
        .route(
            "/admin/room-types",
            get(admin::list_room_types).post(admin::create_room_type),
        )
        .route("/admin/room-types/:id", patch(admin::update_room_type))
        .route("/admin/rooms", get(admin::list_rooms).post(admin::create_room))
        .route("/admin/rooms/:id", patch(admin::update_room))
        .route("/admin/reports/hotel/:id/occupancy", get(admin::occupancy))
        .route("/admin/reports/hotel/:id/user-bookings", get(admin::top_users))
        .route("/admin/reports/user/:id/bookings", get(admin::user_bookings))
        .route("/me/reports/hotel/:id/count", get(bookings::my_hotel_count))
        .route_layer(middleware::from_fn(record_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn record_request(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".into());
    let start = Instant::now();
    let response = next.run(req).await;
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "route" => route.clone(),
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "route" => route)
        .record(start.elapsed().as_secs_f64());
    response
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Bearer-token identity. Routes that take a `Caller` reject anonymous requests.
#[axum::async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let resolved = match bearer_token(parts) {
            Some(token) => state.identity.resolve(token).await,
            None => Err(IdentityError::Missing),
        };
        resolved.map_err(|e| {
            metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
            tracing::warn!("rejected caller: {e}");
            ApiError::unauthorized(e.to_string())
        })
    }
}

/// Identity on public routes: `None` without a token. A token that is
/// present must still verify.
pub struct MaybeCaller(pub Option<Caller>);

impl MaybeCaller {
    pub fn is_admin(&self) -> bool {
        self.0.is_some_and(|c| c.is_admin())
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if bearer_token(parts).is_none() {
            return Ok(MaybeCaller(None));
        }
        Caller::from_request_parts(parts, state).await.map(|c| MaybeCaller(Some(c)))
    }
}

pub(crate) fn require_admin(caller: &Caller) -> Result<(), ApiError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

/// `YYYY-MM-DD`, an RFC 3339 timestamp or a naive ISO datetime; time of day is dropped.
pub(crate) fn parse_day(field: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
        .ok_or_else(|| ApiError::validation(format!("{field}: expected YYYY-MM-DD, got {raw:?}")))
}

pub(crate) fn parse_opt_day(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| parse_day(field, s))
        .transpose()
}

/// Lenient paging parameter: anything unparsable means "use the default".
pub(crate) fn parse_count(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse().ok())
}

pub(crate) fn parse_id(raw: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(raw.trim()).map_err(|_| ApiError::validation(format!("malformed id {raw:?}")))
}
