use ulid::Ulid;

use crate::model::*;

use super::conflict::first_conflict;

// ── Availability Algorithm ────────────────────────────────────────

/// Rooms of one type free for every night of `query`, lowest room number first.
///
/// A room qualifies when its status is `available` and none of its stays
/// (pending or confirmed bookings) shares a night with the query. The whole
/// type offers nothing when it is inactive or `guests` exceeds its capacity.
/// Callers hold the room type lock, so the result is exactly what a commit
/// would see.
pub fn free_rooms(rt: &RoomTypeState, query: &Span, guests: u32) -> Vec<Ulid> {
    free_rooms_ignoring(rt, query, guests, None)
}

/// `free_rooms`, treating the stay of `ignore` as already gone. Used when a
/// booking moves, so its current nights never block its new ones.
pub fn free_rooms_ignoring(rt: &RoomTypeState, query: &Span, guests: u32, ignore: Option<Ulid>) -> Vec<Ulid> {
    if !rt.info.active || guests == 0 || guests > rt.info.capacity {
        return Vec::new();
    }
    rt.rooms
        .iter()
        .filter(|room| room.status == RoomStatus::Available)
        .filter(|room| first_conflict(room, query, ignore).is_none())
        .map(|room| room.id)
        .collect()
}

/// Room-nights inside `period` as `(booked, offered)`.
///
/// Every room that is not retired is offered for the whole period. A retired
/// room still holding stays in the period is offered too, so `booked` never
/// exceeds `offered`.
pub fn room_nights(rt: &RoomTypeState, period: &Span) -> (u64, u64) {
    let nights = period.nights() as u64;
    rt.rooms.iter().fold((0, 0), |(booked, offered), room| {
        let held: u64 = room
            .overlapping(period)
            .filter_map(|stay| stay.span.intersection(period))
            .map(|clamped| clamped.nights() as u64)
            .sum();
        let counted = room.status != RoomStatus::Retired || held > 0;
        (booked + held, offered + if counted { nights } else { 0 })
    })
}
