use std::collections::HashMap;

use chrono::NaiveDate;
use futures::future::try_join_all;
use ulid::Ulid;

use crate::model::*;

use super::availability::free_rooms;
use super::conflict::{validate_guests, validate_query};
use super::{Engine, EngineError};

impl Engine {
    pub fn get_hotel(&self, id: Ulid) -> Result<Hotel, EngineError> {
        self.hotel(&id)
    }

    /// Hotels matching the filter, ordered by name.
    pub fn list_hotels(&self, filter: &HotelFilter) -> Vec<Hotel> {
        let mut hotels: Vec<Hotel> = self
            .hotels
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        hotels.sort_by(|a, b| a.info.name.cmp(&b.info.name).then(a.id.cmp(&b.id)));
        hotels
    }

    /// Room types of a hotel with their rooms, in creation order.
    pub async fn room_types(&self, hotel_id: Ulid) -> Result<Vec<RoomType>, EngineError> {
        self.hotel(&hotel_id)?;
        let mut out = Vec::new();
        for id in self.room_type_ids(&hotel_id) {
            let rt = self.read_room_type(id).await?;
            out.push(rt.snapshot());
        }
        Ok(out)
    }

    /// Room types across hotels, newest first, optionally for one hotel.
    pub async fn list_room_types(&self, hotel_id: Option<Ulid>) -> Result<Vec<RoomType>, EngineError> {
        let mut ids: Vec<Ulid> = match hotel_id {
            Some(hotel_id) => {
                self.hotel(&hotel_id)?;
                self.room_type_ids(&hotel_id)
            }
            None => self.room_types.iter().map(|e| *e.key()).collect(),
        };
        ids.sort_unstable_by(|a, b| b.cmp(a));
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.read_room_type(id).await?.snapshot());
        }
        Ok(out)
    }

    /// Free rooms of one type for `[check_in, check_out)`. Advisory: a
    /// commit re-checks under the write lock.
    pub async fn availability(
        &self,
        hotel_id: Ulid,
        room_type_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guests: u32,
    ) -> Result<Availability, EngineError> {
        let span = validate_query(check_in, check_out)?;
        validate_guests(guests)?;
        let hotel = self.hotel(&hotel_id)?;
        let rt = self.read_room_type(room_type_id).await?;
        if rt.hotel_id != hotel_id {
            return Err(EngineError::NotFound(room_type_id));
        }

        let available_rooms = if hotel.is_active() {
            free_rooms(&rt, &span, guests)
        } else {
            Vec::new()
        };
        tracing::debug!(
            room_type_id = %room_type_id,
            %span,
            free = available_rooms.len(),
            "availability"
        );
        Ok(Availability {
            room_type_id,
            available_count: available_rooms.len(),
            available_rooms,
        })
    }

    /// Availability of every active room type of a hotel. Each type is read
    /// under its own lock; types never wait on each other.
    pub async fn hotel_availability(
        &self,
        hotel_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guests: u32,
    ) -> Result<Vec<(Ulid, RoomTypeAvailability)>, EngineError> {
        let span = validate_query(check_in, check_out)?;
        validate_guests(guests)?;
        let hotel_active = self.hotel(&hotel_id)?.is_active();

        let per_type = self.room_type_ids(&hotel_id).into_iter().map(|id| async move {
            let rt = self.read_room_type(id).await?;
            if !rt.info.active {
                return Ok::<_, EngineError>(None);
            }
            let count = if hotel_active {
                free_rooms(&rt, &span, guests).len()
            } else {
                0
            };
            Ok(Some((
                id,
                RoomTypeAvailability {
                    any_available: count > 0,
                    available_count: count,
                },
            )))
        });

        Ok(try_join_all(per_type).await?.into_iter().flatten().collect())
    }

    /// One booking, visible to its guest, its booker and admins.
    pub async fn get_booking(&self, caller: &Caller, id: Ulid) -> Result<Booking, EngineError> {
        let room_type_id = self.booking_room_type(&id)?;
        let rt = self.read_room_type(room_type_id).await?;
        let booking = rt.bookings.get(&id).ok_or(EngineError::NotFound(id))?;
        if !caller.is_admin() && !booking.involves(caller.user_id) {
            return Err(EngineError::Forbidden);
        }
        Ok(booking.clone())
    }

    pub async fn get_booking_detail(&self, caller: &Caller, id: Ulid) -> Result<BookingDetail, EngineError> {
        let booking = self.get_booking(caller, id).await?;
        let mut details = self.with_details(vec![booking]).await?;
        details.pop().ok_or(EngineError::NotFound(id))
    }

    /// Non-admins see only bookings where they are guest or booker, whatever
    /// the filter says. Newest check-in first, then latest commit.
    pub async fn list_bookings(
        &self,
        caller: &Caller,
        filter: &BookingFilter,
    ) -> Result<Vec<BookingDetail>, EngineError> {
        let mut filter = filter.clone();
        if !caller.is_admin() {
            filter.user_id = Some(caller.user_id);
        }
        let bookings = self.collect_bookings(&filter).await?;
        self.with_details(bookings).await
    }

    /// Bookings matching `filter`, sorted check-in desc then seq desc.
    pub(super) async fn collect_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, EngineError> {
        let mut out = Vec::new();
        if let Some(uid) = filter.user_id {
            // the per-user index names the room types worth locking
            let ids = self
                .user_bookings
                .get(&uid)
                .map(|e| e.value().clone())
                .unwrap_or_default();
            let mut grouped: HashMap<Ulid, Vec<Ulid>> = HashMap::new();
            for id in ids {
                if let Ok(rt_id) = self.booking_room_type(&id) {
                    grouped.entry(rt_id).or_default().push(id);
                }
            }
            for (rt_id, ids) in grouped {
                let rt = self.read_room_type(rt_id).await?;
                out.extend(
                    ids.iter()
                        .filter_map(|id| rt.bookings.get(id))
                        .filter(|b| filter.matches(b))
                        .cloned(),
                );
            }
        } else {
            let rt_ids: Vec<Ulid> = match filter.hotel_id {
                Some(hotel_id) => self.room_type_ids(&hotel_id),
                None => self.room_types.iter().map(|e| *e.key()).collect(),
            };
            for rt_id in rt_ids {
                let rt = self.read_room_type(rt_id).await?;
                out.extend(rt.bookings.values().filter(|b| filter.matches(b)).cloned());
            }
        }
        out.sort_by(|a, b| b.span.start.cmp(&a.span.start).then(b.seq.cmp(&a.seq)));
        Ok(out)
    }

    /// Join bookings with hotel name, room type name and room number.
    pub(super) async fn with_details(&self, bookings: Vec<Booking>) -> Result<Vec<BookingDetail>, EngineError> {
        let mut names: HashMap<Ulid, (String, HashMap<Ulid, String>)> = HashMap::new();
        let mut out = Vec::with_capacity(bookings.len());
        for booking in bookings {
            if !names.contains_key(&booking.room_type_id) {
                let rt = self.read_room_type(booking.room_type_id).await?;
                let rooms = rt.rooms.iter().map(|r| (r.id, r.number.clone())).collect();
                names.insert(booking.room_type_id, (rt.info.name.clone(), rooms));
            }
            let hotel_name = self
                .hotels
                .get(&booking.hotel_id)
                .map(|h| h.info.name.clone())
                .unwrap_or_default();
            let (room_type_name, room_number) = match names.get(&booking.room_type_id) {
                Some((name, rooms)) => (name.clone(), rooms.get(&booking.room_id).cloned()),
                None => (String::new(), None),
            };
            out.push(BookingDetail {
                booking,
                hotel_name,
                room_type_name,
                room_number,
            });
        }
        Ok(out)
    }
}
