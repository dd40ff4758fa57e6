//! Response shapes. Money goes out as JSON numbers.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Serialize)]
pub struct HotelView {
    pub id: Ulid,
    pub name: String,
    pub city: String,
    pub country: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub star_rating: Option<u8>,
    pub status: HotelStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rooms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_available_rooms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotel_status: Option<Vacancy>,
}

impl HotelView {
    pub fn new(hotel: Hotel, summary: Option<InventorySummary>) -> Self {
        let HotelInfo {
            name,
            city,
            country,
            address,
            description,
            star_rating,
            status,
        } = hotel.info;
        Self {
            id: hotel.id,
            name,
            city,
            country,
            address,
            description,
            star_rating,
            status,
            total_rooms: summary.map(|s| s.total_rooms),
            total_available_rooms: summary.map(|s| s.total_available_rooms),
            hotel_status: summary.map(|s| s.hotel_status),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoomView {
    pub id: Ulid,
    pub room_type_id: Ulid,
    pub room_number: String,
    pub status: RoomStatus,
}

impl From<Room> for RoomView {
    fn from(r: Room) -> Self {
        Self {
            id: r.id,
            room_type_id: r.room_type_id,
            room_number: r.number,
            status: r.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoomTypeView {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub name: String,
    pub description: Option<String>,
    pub capacity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub base_price: Decimal,
    pub active: bool,
    pub rooms: Vec<RoomView>,
}

impl From<RoomType> for RoomTypeView {
    fn from(rt: RoomType) -> Self {
        Self {
            id: rt.id,
            hotel_id: rt.hotel_id,
            name: rt.info.name,
            description: rt.info.description,
            capacity: rt.info.capacity,
            base_price: rt.info.base_price,
            active: rt.info.active,
            rooms: rt.rooms.into_iter().map(RoomView::from).collect(),
        }
    }
}

/// Counts only; which room a booking would get stays private until commit.
/// Room type row of the admin inventory listing.
#[derive(Debug, Serialize)]
pub struct AdminRoomTypeView {
    #[serde(flatten)]
    pub room_type: RoomTypeView,
    pub hotel_name: String,
}

#[derive(Debug, Serialize)]
pub struct AdminRoomView {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub hotel_name: String,
    pub room_type_id: Ulid,
    pub room_type_name: String,
    pub room_number: String,
    pub status: RoomStatus,
}

/// One page of a listing plus the size of the whole result.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// `page` counts from 1; `limit` is clamped to 1..=100 and defaults to 20.
    pub fn of(items: Vec<T>, page: Option<usize>, limit: Option<usize>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(20).clamp(1, 100);
        let total = items.len();
        let items = items
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        Self {
            page,
            limit,
            total,
            items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AvailabilityView {
    pub room_type_id: Ulid,
    pub any_available: bool,
    pub available_count: usize,
}

impl From<Availability> for AvailabilityView {
    fn from(a: Availability) -> Self {
        Self {
            room_type_id: a.room_type_id,
            any_available: a.available_count > 0,
            available_count: a.available_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TypeAvailabilityView {
    pub any_available: bool,
    pub available_count: usize,
}

impl From<RoomTypeAvailability> for TypeAvailabilityView {
    fn from(a: RoomTypeAvailability) -> Self {
        Self {
            any_available: a.any_available,
            available_count: a.available_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub hotel_name: String,
    pub room_type_id: Ulid,
    pub room_type_name: String,
    pub room_id: Ulid,
    pub room_number: Option<String>,
    pub guest_user_id: UserId,
    pub booked_by_user_id: UserId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub nights: i64,
    pub num_guests: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub currency: String,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub history: Vec<StatusChange>,
}

impl From<BookingDetail> for BookingView {
    fn from(d: BookingDetail) -> Self {
        let b = d.booking;
        Self {
            id: b.id,
            hotel_id: b.hotel_id,
            hotel_name: d.hotel_name,
            room_type_id: b.room_type_id,
            room_type_name: d.room_type_name,
            room_id: b.room_id,
            room_number: d.room_number,
            guest_user_id: b.guest_id,
            booked_by_user_id: b.booked_by,
            check_in: b.span.start,
            check_out: b.span.end,
            nights: b.span.nights(),
            num_guests: b.guests,
            total_amount: b.total_amount,
            currency: b.currency,
            status: b.status,
            created_at: b.created_at,
            history: b.history,
        }
    }
}

/// Result of a booking state change.
#[derive(Debug, Serialize)]
pub struct BookingStatusView {
    pub booking_id: Ulid,
    pub status: BookingStatus,
}

impl From<&Booking> for BookingStatusView {
    fn from(b: &Booking) -> Self {
        Self {
            booking_id: b.id,
            status: b.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OccupancyView {
    pub hotel_id: Ulid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub room_nights_booked: u64,
    pub room_nights_total: u64,
    pub occupancy_rate: f64,
}

impl From<Occupancy> for OccupancyView {
    fn from(o: Occupancy) -> Self {
        Self {
            hotel_id: o.hotel_id,
            from: o.period.start,
            to: o.period.end,
            room_nights_booked: o.room_nights_booked,
            room_nights_total: o.room_nights_total,
            occupancy_rate: o.occupancy_rate,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserBookingCountView {
    pub user_id: UserId,
    pub bookings: u64,
}

impl From<UserBookingCount> for UserBookingCountView {
    fn from(c: UserBookingCount) -> Self {
        Self {
            user_id: c.user_id,
            bookings: c.booking_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HotelBookingCountView {
    pub user_id: UserId,
    pub hotel_id: Ulid,
    pub count: u64,
}
