use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use ulid::Ulid;

use crate::model::{BookingChange, BookingFilter, BookingRequest, BookingStatus, Caller, UserId};

use super::views::{BookingStatusView, BookingView, HotelBookingCountView};
use super::{ApiError, AppState, parse_day, parse_id, parse_opt_day};

#[derive(Debug, Deserialize)]
pub struct CreateBooking {
    hotel_id: Ulid,
    room_type_id: Ulid,
    check_in: String,
    check_out: String,
    #[serde(default = "one")]
    num_guests: u32,
    #[serde(default, with = "rust_decimal::serde::float")]
    total_amount: Decimal,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    guest_user_id: Option<UserId>,
}

fn one() -> u32 {
    1
}

pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateBooking>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingStatusView>), ApiError> {
    let Json(body) = body?;
    let req = BookingRequest {
        hotel_id: body.hotel_id,
        room_type_id: body.room_type_id,
        check_in: parse_day("check_in", &body.check_in)?,
        check_out: parse_day("check_out", &body.check_out)?,
        guests: body.num_guests,
        total_amount: body.total_amount,
        currency: body
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "USD".into()),
        guest_user_id: body.guest_user_id,
    };
    let booking = state.engine.create_booking(&caller, req).await?;
    Ok((StatusCode::CREATED, Json((&booking).into())))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    user_id: Option<UserId>,
    hotel_id: Option<String>,
    status: Option<BookingStatus>,
    from: Option<String>,
    to: Option<String>,
}

/// Callers see their own bookings; admins may filter across everyone.
pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    let Query(query) = query?;
    let filter = BookingFilter {
        user_id: query.user_id,
        hotel_id: query
            .hotel_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(parse_id)
            .transpose()?,
        status: query.status,
        from: parse_opt_day("from", query.from.as_deref())?,
        to: parse_opt_day("to", query.to.as_deref())?,
    };
    let bookings = state.engine.list_bookings(&caller, &filter).await?;
    Ok(Json(bookings.into_iter().map(BookingView::from).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, ApiError> {
    let detail = state.engine.get_booking_detail(&caller, parse_id(&id)?).await?;
    Ok(Json(detail.into()))
}

#[derive(Debug, Deserialize)]
pub struct ModifyBooking {
    check_in: Option<String>,
    check_out: Option<String>,
    num_guests: Option<u32>,
}

/// New dates and/or party size. Answers with the booking as it now stands.
pub async fn modify(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<ModifyBooking>, JsonRejection>,
) -> Result<Json<BookingView>, ApiError> {
    let Json(body) = body?;
    let id = parse_id(&id)?;
    let change = BookingChange {
        check_in: parse_opt_day("check_in", body.check_in.as_deref())?,
        check_out: parse_opt_day("check_out", body.check_out.as_deref())?,
        guests: body.num_guests,
    };
    state.engine.modify_booking(&caller, id, change).await?;
    let detail = state.engine.get_booking_detail(&caller, id).await?;
    Ok(Json(detail.into()))
}

/// The caller's own non-cancelled stays at one hotel.
pub async fn my_hotel_count(
    State(state): State<AppState>,
    caller: Caller,
    Path(hotel_id): Path<String>,
) -> Result<Json<HotelBookingCountView>, ApiError> {
    let hotel_id = parse_id(&hotel_id)?;
    let count = state.engine.guest_booking_count(caller.user_id, hotel_id).await?;
    Ok(Json(HotelBookingCountView {
        user_id: caller.user_id,
        hotel_id,
        count,
    }))
}

pub async fn cancel(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<BookingStatusView>, ApiError> {
    let booking = state.engine.cancel_booking(&caller, parse_id(&id)?).await?;
    Ok(Json((&booking).into()))
}
