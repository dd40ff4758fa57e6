use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. Audit timestamps only; stays are calendar dates.
pub type Ms = i64;

/// User id as issued by the identity collaborator.
pub type UserId = u64;

/// Half-open night range `[start, end)`: `start` is the check-in day,
/// `end` the check-out day. Back-to-back stays do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Span {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn intersection(&self, other: &Span) -> Option<Span> {
        Span::try_new(self.start.max(other.start), self.end.min(other.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotelStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    #[default]
    Available,
    Maintenance,
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Pending and confirmed bookings hold their room.
    pub fn holds_room(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Verified identity of whoever is calling into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: UserId) -> Self {
        Self { user_id, role: Role::User }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self { user_id, role: Role::Admin }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ── Inventory ────────────────────────────────────────────────────

/// Mutable descriptive part of a hotel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelInfo {
    pub name: String,
    pub city: String,
    pub country: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub star_rating: Option<u8>,
    pub status: HotelStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotel {
    pub id: Ulid,
    pub info: HotelInfo,
    pub created_at: Ms,
}

impl Hotel {
    pub fn is_active(&self) -> bool {
        self.info.status == HotelStatus::Active
    }
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct HotelPatch {
    pub name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub star_rating: Option<u8>,
    pub status: Option<HotelStatus>,
}

impl HotelPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.city.is_none()
            && self.country.is_none()
            && self.address.is_none()
            && self.description.is_none()
            && self.star_rating.is_none()
            && self.status.is_none()
    }

    pub fn apply(self, current: &HotelInfo) -> HotelInfo {
        HotelInfo {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            city: self.city.unwrap_or_else(|| current.city.clone()),
            country: self.country.unwrap_or_else(|| current.country.clone()),
            address: self.address.or_else(|| current.address.clone()),
            description: self.description.or_else(|| current.description.clone()),
            star_rating: self.star_rating.or(current.star_rating),
            status: self.status.unwrap_or(current.status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTypeInfo {
    pub name: String,
    pub description: Option<String>,
    /// Max guests per room.
    pub capacity: u32,
    pub base_price: Decimal,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RoomTypePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<u32>,
    pub base_price: Option<Decimal>,
    pub active: Option<bool>,
}

impl RoomTypePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.capacity.is_none()
            && self.base_price.is_none()
            && self.active.is_none()
    }

    pub fn apply(self, current: &RoomTypeInfo) -> RoomTypeInfo {
        RoomTypeInfo {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            description: self.description.or_else(|| current.description.clone()),
            capacity: self.capacity.unwrap_or(current.capacity),
            base_price: self.base_price.unwrap_or(current.base_price),
            active: self.active.unwrap_or(current.active),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoomPatch {
    pub number: Option<String>,
    pub status: Option<RoomStatus>,
}

/// Ordering used for room assignment: numeric room numbers compare
/// numerically, everything else falls back to string order after them.
pub fn room_number_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// A room-night claim held by a non-cancelled booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stay {
    pub booking_id: Ulid,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub number: String,
    pub status: RoomStatus,
    /// Stays of pending/confirmed bookings, sorted by `span.start`.
    pub stays: Vec<Stay>,
}

impl RoomState {
    pub fn new(id: Ulid, number: String, status: RoomStatus) -> Self {
        Self {
            id,
            number,
            status,
            stays: Vec::new(),
        }
    }

    /// Insert stay maintaining sort order by span.start.
    pub fn insert_stay(&mut self, stay: Stay) {
        let pos = self
            .stays
            .binary_search_by_key(&stay.span.start, |s| s.span.start)
            .unwrap_or_else(|e| e);
        self.stays.insert(pos, stay);
    }

    pub fn remove_stay(&mut self, booking_id: Ulid) -> Option<Stay> {
        let pos = self.stays.iter().position(|s| s.booking_id == booking_id)?;
        Some(self.stays.remove(pos))
    }

    /// Stays whose nights intersect the query.
    /// Binary search skips every stay starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Stay> {
        let right_bound = self.stays.partition_point(|s| s.span.start < query.end);
        self.stays[..right_bound]
            .iter()
            .filter(move |s| s.span.end > query.start)
    }
}

/// Everything guarded by one room type lock: its rooms and the ledger
/// entries committed against them.
#[derive(Debug, Clone)]
pub struct RoomTypeState {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub info: RoomTypeInfo,
    /// Sorted by `room_number_order`, so iteration order is assignment order.
    pub rooms: Vec<RoomState>,
    pub bookings: HashMap<Ulid, Booking>,
}

impl RoomTypeState {
    pub fn new(id: Ulid, hotel_id: Ulid, info: RoomTypeInfo) -> Self {
        Self {
            id,
            hotel_id,
            info,
            rooms: Vec::new(),
            bookings: HashMap::new(),
        }
    }

    pub fn insert_room(&mut self, room: RoomState) {
        let pos = self
            .rooms
            .binary_search_by(|r| room_number_order(&r.number, &room.number))
            .unwrap_or_else(|e| e);
        self.rooms.insert(pos, room);
    }

    /// Re-sort after a room number change.
    pub fn resort_rooms(&mut self) {
        self.rooms.sort_by(|a, b| room_number_order(&a.number, &b.number));
    }

    pub fn room(&self, id: &Ulid) -> Option<&RoomState> {
        self.rooms.iter().find(|r| r.id == *id)
    }

    pub fn room_mut(&mut self, id: &Ulid) -> Option<&mut RoomState> {
        self.rooms.iter_mut().find(|r| r.id == *id)
    }

    pub fn snapshot(&self) -> RoomType {
        RoomType {
            id: self.id,
            hotel_id: self.hotel_id,
            info: self.info.clone(),
            rooms: self
                .rooms
                .iter()
                .map(|r| Room {
                    id: r.id,
                    room_type_id: self.id,
                    number: r.number.clone(),
                    status: r.status,
                })
                .collect(),
        }
    }
}

// ── Ledger ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: Option<BookingStatus>,
    pub to: BookingStatus,
    pub by: UserId,
    pub at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: Ulid,
    /// Commit order within the ledger.
    pub seq: u64,
    pub hotel_id: Ulid,
    pub room_type_id: Ulid,
    pub room_id: Ulid,
    pub guest_id: UserId,
    pub booked_by: UserId,
    pub span: Span,
    pub guests: u32,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub history: Vec<StatusChange>,
}

impl Booking {
    /// Guest or booker.
    pub fn involves(&self, user_id: UserId) -> bool {
        self.guest_id == user_id || self.booked_by == user_id
    }
}

/// Input to `Engine::create_booking`.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub hotel_id: Ulid,
    pub room_type_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub total_amount: Decimal,
    pub currency: String,
    /// Book on behalf of another user (admins only).
    pub guest_user_id: Option<UserId>,
}

/// Input to `Engine::modify_booking`; `None` keeps the current value.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingChange {
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<u32>,
}

/// Flat event types, no nesting beyond the info structs.
/// This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    HotelCreated {
        id: Ulid,
        info: HotelInfo,
        created_at: Ms,
    },
    HotelUpdated {
        id: Ulid,
        info: HotelInfo,
    },
    RoomTypeCreated {
        id: Ulid,
        hotel_id: Ulid,
        info: RoomTypeInfo,
    },
    RoomTypeUpdated {
        id: Ulid,
        info: RoomTypeInfo,
    },
    RoomCreated {
        id: Ulid,
        room_type_id: Ulid,
        number: String,
        status: RoomStatus,
    },
    RoomUpdated {
        id: Ulid,
        room_type_id: Ulid,
        number: String,
        status: RoomStatus,
    },
    BookingPlaced {
        id: Ulid,
        seq: u64,
        hotel_id: Ulid,
        room_type_id: Ulid,
        room_id: Ulid,
        guest_id: UserId,
        booked_by: UserId,
        span: Span,
        guests: u32,
        total_amount: Decimal,
        currency: String,
        status: BookingStatus,
        at: Ms,
    },
    BookingConfirmed {
        id: Ulid,
        room_type_id: Ulid,
        by: UserId,
        at: Ms,
    },
    BookingCancelled {
        id: Ulid,
        room_type_id: Ulid,
        by: UserId,
        at: Ms,
    },
    /// New nights or party size; `room_id` is the room now held.
    BookingModified {
        id: Ulid,
        room_type_id: Ulid,
        room_id: Ulid,
        span: Span,
        guests: u32,
        by: UserId,
        at: Ms,
    },
}

impl Event {
    /// Room type whose lock guards this event; `None` for hotel-level events.
    pub fn room_type_id(&self) -> Option<Ulid> {
        match self {
            Event::RoomTypeCreated { id, .. } | Event::RoomTypeUpdated { id, .. } => Some(*id),
            Event::RoomCreated { room_type_id, .. }
            | Event::RoomUpdated { room_type_id, .. }
            | Event::BookingPlaced { room_type_id, .. }
            | Event::BookingConfirmed { room_type_id, .. }
            | Event::BookingCancelled { room_type_id, .. }
            | Event::BookingModified { room_type_id, .. } => Some(*room_type_id),
            Event::HotelCreated { .. } | Event::HotelUpdated { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: Ulid,
    pub room_type_id: Ulid,
    pub number: String,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomType {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub info: RoomTypeInfo,
    pub rooms: Vec<Room>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub room_type_id: Ulid,
    /// Lowest room number first; the head is what a commit would assign.
    pub available_rooms: Vec<Ulid>,
    pub available_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomTypeAvailability {
    pub any_available: bool,
    pub available_count: usize,
}

/// Booking joined with the names a listing shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDetail {
    pub booking: Booking,
    pub hotel_name: String,
    pub room_type_name: String,
    pub room_number: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub user_id: Option<UserId>,
    pub hotel_id: Option<Ulid>,
    pub status: Option<BookingStatus>,
    /// Check-in on or after.
    pub from: Option<NaiveDate>,
    /// Check-out on or before.
    pub to: Option<NaiveDate>,
}

impl BookingFilter {
    pub fn matches(&self, b: &Booking) -> bool {
        self.user_id.is_none_or(|u| b.involves(u))
            && self.hotel_id.is_none_or(|h| b.hotel_id == h)
            && self.status.is_none_or(|s| b.status == s)
            && self.from.is_none_or(|d| b.span.start >= d)
            && self.to.is_none_or(|d| b.span.end <= d)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HotelFilter {
    /// Case-insensitive substring of name or city.
    pub q: Option<String>,
    pub city: Option<String>,
    pub status: Option<HotelStatus>,
}

impl HotelFilter {
    pub fn matches(&self, hotel: &Hotel) -> bool {
        let info = &hotel.info;
        let q_ok = self.q.as_deref().is_none_or(|q| {
            let q = q.to_lowercase();
            info.name.to_lowercase().contains(&q) || info.city.to_lowercase().contains(&q)
        });
        let city_ok = self
            .city
            .as_deref()
            .is_none_or(|c| info.city.eq_ignore_ascii_case(c));
        q_ok && city_ok && self.status.is_none_or(|s| info.status == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Vacancy {
    Available,
    Occupied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventorySummary {
    pub total_rooms: u32,
    pub total_available_rooms: u32,
    pub hotel_status: Vacancy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Occupancy {
    pub hotel_id: Ulid,
    pub period: Span,
    pub room_nights_booked: u64,
    pub room_nights_total: u64,
    pub occupancy_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserBookingCount {
    pub user_id: UserId,
    pub booking_count: u64,
}
