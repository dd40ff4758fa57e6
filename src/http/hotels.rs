use std::collections::BTreeMap;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{HotelFilter, HotelStatus};

use super::views::*;
use super::{ApiError, AppState, MaybeCaller, parse_day, parse_id, parse_opt_day};

#[derive(Debug, Deserialize)]
pub struct HotelListQuery {
    q: Option<String>,
    city: Option<String>,
}

/// Hotels with their room counts. Only admins see inactive hotels.
pub async fn list(
    State(state): State<AppState>,
    caller: MaybeCaller,
    query: Result<Query<HotelListQuery>, QueryRejection>,
) -> Result<Json<Vec<HotelView>>, ApiError> {
    let Query(query) = query?;
    let filter = HotelFilter {
        q: query.q.filter(|s| !s.trim().is_empty()),
        city: query.city.filter(|s| !s.trim().is_empty()),
        status: (!caller.is_admin()).then_some(HotelStatus::Active),
    };
    let mut out = Vec::new();
    for hotel in state.engine.list_hotels(&filter) {
        let summary = state.engine.inventory_summary(hotel.id).await?;
        out.push(HotelView::new(hotel, Some(summary)));
    }
    Ok(Json(out))
}

#[derive(Debug, Deserialize)]
pub struct StayQuery {
    check_in: Option<String>,
    check_out: Option<String>,
    guests: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HotelDetailView {
    hotel: HotelView,
    room_types: Vec<RoomTypeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    availability: Option<BTreeMap<Ulid, TypeAvailabilityView>>,
}

/// Hotel, its room types and rooms; with `check_in`/`check_out` also the
/// per-type availability for those nights. Inactive hotels exist only for admins.
pub async fn detail(
    State(state): State<AppState>,
    caller: MaybeCaller,
    Path(id): Path<String>,
    query: Result<Query<StayQuery>, QueryRejection>,
) -> Result<Json<HotelDetailView>, ApiError> {
    let Query(query) = query?;
    let id = parse_id(&id)?;
    let hotel = state.engine.get_hotel(id)?;
    if !hotel.is_active() && !caller.is_admin() {
        return Err(EngineError::NotFound(id).into());
    }
    let summary = state.engine.inventory_summary(id).await?;
    let room_types = state.engine.room_types(id).await?;

    let check_in = parse_opt_day("check_in", query.check_in.as_deref())?;
    let check_out = parse_opt_day("check_out", query.check_out.as_deref())?;
    let availability = match (check_in, check_out) {
        (Some(check_in), Some(check_out)) => {
            let per_type = state
                .engine
                .hotel_availability(id, check_in, check_out, query.guests.unwrap_or(1))
                .await?;
            Some(per_type.into_iter().map(|(rt, a)| (rt, a.into())).collect())
        }
        _ => None,
    };

    Ok(Json(HotelDetailView {
        hotel: HotelView::new(hotel, Some(summary)),
        room_types: room_types.into_iter().map(RoomTypeView::from).collect(),
        availability,
    }))
}

/// Room type id → `{any_available, available_count}`.
pub async fn availability_map(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<StayQuery>, QueryRejection>,
) -> Result<Json<BTreeMap<Ulid, TypeAvailabilityView>>, ApiError> {
    let Query(query) = query?;
    let id = parse_id(&id)?;
    let check_in = parse_day("check_in", query.check_in.as_deref().unwrap_or_default())?;
    let check_out = parse_day("check_out", query.check_out.as_deref().unwrap_or_default())?;
    let per_type = state
        .engine
        .hotel_availability(id, check_in, check_out, query.guests.unwrap_or(1))
        .await?;
    Ok(Json(per_type.into_iter().map(|(rt, a)| (rt, a.into())).collect()))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    hotel_id: Option<String>,
    room_type_id: Option<String>,
    check_in: Option<String>,
    check_out: Option<String>,
    guests: Option<u32>,
}

pub async fn availability(
    State(state): State<AppState>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Json<AvailabilityView>, ApiError> {
    let Query(query) = query?;
    let (Some(hotel_id), Some(room_type_id)) = (query.hotel_id, query.room_type_id) else {
        return Err(ApiError::validation("hotel_id and room_type_id are required"));
    };
    let check_in = parse_day("check_in", query.check_in.as_deref().unwrap_or_default())?;
    let check_out = parse_day("check_out", query.check_out.as_deref().unwrap_or_default())?;
    let result = state
        .engine
        .availability(
            parse_id(&hotel_id)?,
            parse_id(&room_type_id)?,
            check_in,
            check_out,
            query.guests.unwrap_or(1),
        )
        .await?;
    Ok(Json(result.into()))
}
