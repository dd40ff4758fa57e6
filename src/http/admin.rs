use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use ulid::Ulid;

use crate::model::*;

use super::views::*;
use super::{ApiError, AppState, parse_count, parse_day, parse_id, require_admin};

pub async fn confirm_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<BookingStatusView>, ApiError> {
    let booking = state.engine.confirm_booking(&caller, parse_id(&id)?).await?;
    Ok(Json((&booking).into()))
}

// ── Hotels ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateHotel {
    name: String,
    city: String,
    country: String,
    address: Option<String>,
    description: Option<String>,
    star_rating: Option<u8>,
    #[serde(default)]
    status: HotelStatus,
}

pub async fn create_hotel(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateHotel>, JsonRejection>,
) -> Result<(StatusCode, Json<HotelView>), ApiError> {
    let Json(body) = body?;
    let info = HotelInfo {
        name: body.name.trim().to_string(),
        city: body.city.trim().to_string(),
        country: body.country.trim().to_string(),
        address: body.address,
        description: body.description,
        star_rating: body.star_rating,
        status: body.status,
    };
    let hotel = state.engine.create_hotel(&caller, info).await?;
    Ok((StatusCode::CREATED, Json(HotelView::new(hotel, None))))
}

#[derive(Debug, Deserialize)]
pub struct UpdateHotel {
    name: Option<String>,
    city: Option<String>,
    country: Option<String>,
    address: Option<String>,
    description: Option<String>,
    star_rating: Option<u8>,
    status: Option<HotelStatus>,
}

pub async fn update_hotel(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<UpdateHotel>, JsonRejection>,
) -> Result<Json<HotelView>, ApiError> {
    let Json(body) = body?;
    let patch = HotelPatch {
        name: body.name.map(|s| s.trim().to_string()),
        city: body.city.map(|s| s.trim().to_string()),
        country: body.country.map(|s| s.trim().to_string()),
        address: body.address,
        description: body.description,
        star_rating: body.star_rating,
        status: body.status,
    };
    let hotel = state.engine.update_hotel(&caller, parse_id(&id)?, patch).await?;
    Ok(Json(HotelView::new(hotel, None)))
}

// ── Room types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRoomType {
    hotel_id: Ulid,
    name: String,
    description: Option<String>,
    capacity: u32,
    #[serde(default, with = "rust_decimal::serde::float")]
    base_price: Decimal,
    #[serde(default = "yes")]
    active: bool,
}

fn yes() -> bool {
    true
}

pub async fn create_room_type(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateRoomType>, JsonRejection>,
) -> Result<(StatusCode, Json<RoomTypeView>), ApiError> {
    let Json(body) = body?;
    let info = RoomTypeInfo {
        name: body.name.trim().to_string(),
        description: body.description,
        capacity: body.capacity,
        base_price: body.base_price,
        active: body.active,
    };
    let rt = state.engine.create_room_type(&caller, body.hotel_id, info).await?;
    Ok((StatusCode::CREATED, Json(rt.into())))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoomType {
    name: Option<String>,
    description: Option<String>,
    capacity: Option<u32>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    base_price: Option<Decimal>,
    active: Option<bool>,
}

pub async fn update_room_type(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<UpdateRoomType>, JsonRejection>,
) -> Result<Json<RoomTypeView>, ApiError> {
    let Json(body) = body?;
    let patch = RoomTypePatch {
        name: body.name.map(|s| s.trim().to_string()),
        description: body.description,
        capacity: body.capacity,
        base_price: body.base_price,
        active: body.active,
    };
    let rt = state.engine.update_room_type(&caller, parse_id(&id)?, patch).await?;
    Ok(Json(rt.into()))
}

#[derive(Debug, Deserialize)]
pub struct InventoryListQuery {
    hotel_id: Option<String>,
    room_type_id: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

impl InventoryListQuery {
    fn ids(&self) -> Result<(Option<Ulid>, Option<Ulid>), ApiError> {
        let parse = |raw: &Option<String>| {
            raw.as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(parse_id)
                .transpose()
        };
        Ok((parse(&self.hotel_id)?, parse(&self.room_type_id)?))
    }

    fn page<T>(&self, items: Vec<T>) -> Page<T> {
        Page::of(items, parse_count(self.page.as_deref()), parse_count(self.limit.as_deref()))
    }
}

fn hotel_name(state: &AppState, id: Ulid) -> String {
    state
        .engine
        .get_hotel(id)
        .map(|h| h.info.name)
        .unwrap_or_default()
}

/// Room types, newest first, optionally for one hotel.
pub async fn list_room_types(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<InventoryListQuery>, QueryRejection>,
) -> Result<Json<Page<AdminRoomTypeView>>, ApiError> {
    require_admin(&caller)?;
    let Query(query) = query?;
    let (hotel_id, _) = query.ids()?;
    let items = state
        .engine
        .list_room_types(hotel_id)
        .await?
        .into_iter()
        .map(|rt| AdminRoomTypeView {
            hotel_name: hotel_name(&state, rt.hotel_id),
            room_type: rt.into(),
        })
        .collect();
    Ok(Json(query.page(items)))
}

// ── Rooms ────────────────────────────────────────────────────────

/// Rooms grouped by room type (newest type first), in room number order.
pub async fn list_rooms(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<InventoryListQuery>, QueryRejection>,
) -> Result<Json<Page<AdminRoomView>>, ApiError> {
    require_admin(&caller)?;
    let Query(query) = query?;
    let (hotel_id, room_type_id) = query.ids()?;
    let mut items = Vec::new();
    for rt in state.engine.list_room_types(hotel_id).await? {
        if room_type_id.is_some_and(|id| id != rt.id) {
            continue;
        }
        let name = hotel_name(&state, rt.hotel_id);
        items.extend(rt.rooms.into_iter().map(|room| AdminRoomView {
            id: room.id,
            hotel_id: rt.hotel_id,
            hotel_name: name.clone(),
            room_type_id: rt.id,
            room_type_name: rt.info.name.clone(),
            room_number: room.number,
            status: room.status,
        }));
    }
    Ok(Json(query.page(items)))
}

#[derive(Debug, Deserialize)]
pub struct CreateRoom {
    room_type_id: Ulid,
    room_number: String,
    #[serde(default)]
    status: RoomStatus,
}

pub async fn create_room(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateRoom>, JsonRejection>,
) -> Result<(StatusCode, Json<RoomView>), ApiError> {
    let Json(body) = body?;
    let room = state
        .engine
        .create_room(&caller, body.room_type_id, &body.room_number, body.status)
        .await?;
    Ok((StatusCode::CREATED, Json(room.into())))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoom {
    room_number: Option<String>,
    status: Option<RoomStatus>,
}

pub async fn update_room(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<UpdateRoom>, JsonRejection>,
) -> Result<Json<RoomView>, ApiError> {
    let Json(body) = body?;
    let patch = RoomPatch {
        number: body.room_number,
        status: body.status,
    };
    let room = state.engine.update_room(&caller, parse_id(&id)?, patch).await?;
    Ok(Json(room.into()))
}

// ── Reports ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    from: Option<String>,
    to: Option<String>,
}

pub async fn occupancy(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> Result<Json<OccupancyView>, ApiError> {
    require_admin(&caller)?;
    let Query(query) = query?;
    let from = parse_day("from", query.from.as_deref().unwrap_or_default())?;
    let to = parse_day("to", query.to.as_deref().unwrap_or_default())?;
    let report = state.engine.occupancy(parse_id(&id)?, from, to).await?;
    Ok(Json(report.into()))
}

pub async fn top_users(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<UserBookingCountView>>, ApiError> {
    require_admin(&caller)?;
    let ranked = state.engine.top_users(parse_id(&id)?).await?;
    Ok(Json(ranked.into_iter().map(Into::into).collect()))
}

pub async fn user_bookings(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<BookingView>>, ApiError> {
    require_admin(&caller)?;
    let user_id: UserId = user_id
        .trim()
        .parse()
        .map_err(|_| ApiError::validation(format!("malformed user id {user_id:?}")))?;
    let bookings = state.engine.user_bookings(user_id).await?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}
