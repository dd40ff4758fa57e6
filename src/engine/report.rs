use std::collections::HashMap;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_REPORT_NIGHTS;
use crate::model::*;

use super::availability::room_nights;
use super::{Engine, EngineError};

impl Engine {
    /// Room-nights sold against room-nights offered over `[from, to)`.
    /// Maintenance rooms are offered. Retired rooms are offered only for
    /// periods in which they still hold bookings.
    pub async fn occupancy(&self, hotel_id: Ulid, from: NaiveDate, to: NaiveDate) -> Result<Occupancy, EngineError> {
        let period = Span::try_new(from, to)
            .ok_or_else(|| EngineError::validation("report period must end after it starts"))?;
        if period.nights() > MAX_REPORT_NIGHTS {
            return Err(EngineError::LimitExceeded("report period too long"));
        }
        self.hotel(&hotel_id)?;

        let mut room_nights_booked = 0;
        let mut room_nights_total = 0;
        for id in self.room_type_ids(&hotel_id) {
            let rt = self.read_room_type(id).await?;
            let (booked, offered) = room_nights(&rt, &period);
            room_nights_booked += booked;
            room_nights_total += offered;
        }

        let occupancy_rate = if room_nights_total == 0 {
            0.0
        } else {
            room_nights_booked as f64 / room_nights_total as f64
        };
        Ok(Occupancy {
            hotel_id,
            period,
            room_nights_booked,
            room_nights_total,
            occupancy_rate,
        })
    }

    /// Guests ranked by non-cancelled bookings at the hotel. Ties go to
    /// whoever booked first.
    pub async fn top_users(&self, hotel_id: Ulid) -> Result<Vec<UserBookingCount>, EngineError> {
        self.hotel(&hotel_id)?;
        // user → (count, lowest seq)
        let mut tally: HashMap<UserId, (u64, u64)> = HashMap::new();
        for id in self.room_type_ids(&hotel_id) {
            let rt = self.read_room_type(id).await?;
            for b in rt.bookings.values().filter(|b| b.status.holds_room()) {
                let entry = tally.entry(b.guest_id).or_insert((0, b.seq));
                entry.0 += 1;
                entry.1 = entry.1.min(b.seq);
            }
        }

        let mut ranked: Vec<(UserId, u64, u64)> =
            tally.into_iter().map(|(user, (count, first))| (user, count, first)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        Ok(ranked
            .into_iter()
            .map(|(user_id, booking_count, _)| UserBookingCount {
                user_id,
                booking_count,
            })
            .collect())
    }

    /// Non-cancelled bookings where the user is guest or booker, newest
    /// check-in first.
    pub async fn user_bookings(&self, user_id: UserId) -> Result<Vec<BookingDetail>, EngineError> {
        let filter = BookingFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        let mut bookings = self.collect_bookings(&filter).await?;
        bookings.retain(|b| b.status.holds_room());
        self.with_details(bookings).await
    }

    /// Non-cancelled bookings at the hotel with `user_id` as the guest.
    pub async fn guest_booking_count(&self, user_id: UserId, hotel_id: Ulid) -> Result<u64, EngineError> {
        self.hotel(&hotel_id)?;
        let filter = BookingFilter {
            user_id: Some(user_id),
            hotel_id: Some(hotel_id),
            ..Default::default()
        };
        let bookings = self.collect_bookings(&filter).await?;
        Ok(bookings
            .iter()
            .filter(|b| b.guest_id == user_id && b.status.holds_room())
            .count() as u64)
    }

    /// Room counts by status, plus `Occupied` once no room is `available`.
    pub async fn inventory_summary(&self, hotel_id: Ulid) -> Result<InventorySummary, EngineError> {
        self.hotel(&hotel_id)?;
        let mut total_rooms = 0u32;
        let mut total_available_rooms = 0u32;
        for id in self.room_type_ids(&hotel_id) {
            let rt = self.read_room_type(id).await?;
            total_rooms += rt.rooms.len() as u32;
            total_available_rooms += rt
                .rooms
                .iter()
                .filter(|r| r.status == RoomStatus::Available)
                .count() as u32;
        }
        let hotel_status = if total_available_rooms == 0 {
            Vacancy::Occupied
        } else {
            Vacancy::Available
        };
        Ok(InventorySummary {
            total_rooms,
            total_available_rooms,
            hotel_status,
        })
    }
}
