use std::collections::HashMap;
use std::sync::atomic::Ordering;

use tokio::sync::oneshot;
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{free_rooms, free_rooms_ignoring};
use super::conflict::*;
use super::{Engine, EngineError, WalCommand};

fn require_admin(caller: &Caller) -> Result<(), EngineError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(EngineError::Forbidden)
    }
}

impl Engine {
    // ── Inventory administration ─────────────────────────────────

    pub async fn create_hotel(&self, caller: &Caller, info: HotelInfo) -> Result<Hotel, EngineError> {
        require_admin(caller)?;
        validate_hotel_info(&info)?;
        let _catalog = self.catalog_lock.lock().await;
        if self.hotels.len() >= MAX_HOTELS {
            return Err(EngineError::LimitExceeded("too many hotels"));
        }

        let id = Ulid::new();
        let event = Event::HotelCreated {
            id,
            info,
            created_at: now_ms(),
        };
        self.persist_catalog(id, &event).await?;
        info!(hotel_id = %id, by = caller.user_id, "hotel created");
        self.hotel(&id)
    }

    pub async fn update_hotel(
        &self,
        caller: &Caller,
        id: Ulid,
        patch: HotelPatch,
    ) -> Result<Hotel, EngineError> {
        require_admin(caller)?;
        let _catalog = self.catalog_lock.lock().await;
        let current = self.hotel(&id)?;
        if patch.is_empty() {
            return Ok(current);
        }
        let info = patch.apply(&current.info);
        validate_hotel_info(&info)?;

        let event = Event::HotelUpdated { id, info };
        self.persist_catalog(id, &event).await?;
        info!(hotel_id = %id, by = caller.user_id, "hotel updated");
        self.hotel(&id)
    }

    pub async fn create_room_type(
        &self,
        caller: &Caller,
        hotel_id: Ulid,
        info: RoomTypeInfo,
    ) -> Result<RoomType, EngineError> {
        require_admin(caller)?;
        validate_room_type_info(&info)?;
        let _catalog = self.catalog_lock.lock().await;
        self.hotel(&hotel_id)?;
        if self.room_type_ids(&hotel_id).len() >= MAX_ROOM_TYPES_PER_HOTEL {
            return Err(EngineError::LimitExceeded("too many room types for hotel"));
        }

        let id = Ulid::new();
        let event = Event::RoomTypeCreated { id, hotel_id, info };
        self.persist_catalog(hotel_id, &event).await?;
        info!(room_type_id = %id, hotel_id = %hotel_id, "room type created");

        let rt = self.read_room_type(id).await?;
        Ok(rt.snapshot())
    }

    pub async fn update_room_type(
        &self,
        caller: &Caller,
        id: Ulid,
        patch: RoomTypePatch,
    ) -> Result<RoomType, EngineError> {
        require_admin(caller)?;
        let _catalog = self.catalog_lock.lock().await;
        let mut rt = self.write_room_type(id).await?;
        if patch.is_empty() {
            return Ok(rt.snapshot());
        }
        let info = patch.apply(&rt.info);
        validate_room_type_info(&info)?;

        let event = Event::RoomTypeUpdated { id, info };
        self.persist_and_apply(&mut rt, &event).await?;
        info!(room_type_id = %id, active = rt.info.active, "room type updated");
        Ok(rt.snapshot())
    }

    pub async fn create_room(
        &self,
        caller: &Caller,
        room_type_id: Ulid,
        number: &str,
        status: RoomStatus,
    ) -> Result<Room, EngineError> {
        require_admin(caller)?;
        let number = number.trim().to_string();
        validate_room_number(&number)?;
        let _catalog = self.catalog_lock.lock().await;
        let mut rt = self.write_room_type(room_type_id).await?;
        if rt.rooms.len() >= MAX_ROOMS_PER_TYPE {
            return Err(EngineError::LimitExceeded("too many rooms for room type"));
        }
        if self.room_numbers.contains_key(&(rt.hotel_id, number.clone())) {
            return Err(EngineError::AlreadyExists(format!("room number {number}")));
        }

        let id = Ulid::new();
        let event = Event::RoomCreated {
            id,
            room_type_id,
            number: number.clone(),
            status,
        };
        self.persist_and_apply(&mut rt, &event).await?;
        info!(room_id = %id, room_type_id = %room_type_id, number = %number, "room created");
        Ok(Room {
            id,
            room_type_id,
            number,
            status,
        })
    }

    /// Renumber a room or change its status. Existing bookings keep the room.
    pub async fn update_room(
        &self,
        caller: &Caller,
        id: Ulid,
        patch: RoomPatch,
    ) -> Result<Room, EngineError> {
        require_admin(caller)?;
        let _catalog = self.catalog_lock.lock().await;
        let room_type_id = self
            .room_to_type
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let mut rt = self.write_room_type(room_type_id).await?;
        let current = rt.room(&id).ok_or(EngineError::NotFound(id))?;

        let number = match patch.number {
            Some(n) => {
                let n = n.trim().to_string();
                validate_room_number(&n)?;
                if n != current.number && self.room_numbers.contains_key(&(rt.hotel_id, n.clone())) {
                    return Err(EngineError::AlreadyExists(format!("room number {n}")));
                }
                n
            }
            None => current.number.clone(),
        };
        let status = patch.status.unwrap_or(current.status);

        let event = Event::RoomUpdated {
            id,
            room_type_id,
            number: number.clone(),
            status,
        };
        self.persist_and_apply(&mut rt, &event).await?;
        info!(room_id = %id, number = %number, ?status, "room updated");
        Ok(Room {
            id,
            room_type_id,
            number,
            status,
        })
    }

    // ── Booking transactions ─────────────────────────────────────

    /// Check availability and commit a booking as one step under the room
    /// type's write lock. Assigns the free room with the lowest number.
    pub async fn create_booking(&self, caller: &Caller, req: BookingRequest) -> Result<Booking, EngineError> {
        let today = (!self.config.allow_past_check_in).then(|| self.today());
        let span = validate_stay(req.check_in, req.check_out, today)?;
        validate_guests(req.guests)?;
        validate_amount(req.total_amount)?;
        let currency = normalize_currency(&req.currency)?;

        // non-admins always book for themselves
        let guest_id = match req.guest_user_id {
            Some(uid) if caller.is_admin() => uid,
            _ => caller.user_id,
        };

        let hotel = self.hotel(&req.hotel_id)?;
        if !hotel.is_active() {
            return Err(EngineError::validation("hotel is not accepting bookings"));
        }

        let mut rt = self.write_room_type_with_retry(req.room_type_id).await?;
        if rt.hotel_id != req.hotel_id {
            return Err(EngineError::NotFound(req.room_type_id));
        }
        if !rt.info.active {
            return Err(EngineError::validation("room type is not bookable"));
        }
        if req.guests > rt.info.capacity {
            return Err(EngineError::Validation(format!(
                "num_guests {} exceeds room capacity {}",
                req.guests, rt.info.capacity
            )));
        }

        let Some(&room_id) = free_rooms(&rt, &span, req.guests).first() else {
            metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL, "reason" => "capacity")
                .increment(1);
            info!(room_type_id = %rt.id, %span, "booking rejected: no free room");
            return Err(EngineError::Capacity {
                room_type_id: rt.id,
            });
        };

        let id = Ulid::new();
        let status = if self.config.pending_bookings {
            BookingStatus::Pending
        } else {
            BookingStatus::Confirmed
        };
        let event = Event::BookingPlaced {
            id,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            hotel_id: req.hotel_id,
            room_type_id: rt.id,
            room_id,
            guest_id,
            booked_by: caller.user_id,
            span,
            guests: req.guests,
            total_amount: req.total_amount,
            currency,
            status,
            at: now_ms(),
        };
        self.persist_and_apply(&mut rt, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_COMMITTED_TOTAL).increment(1);
        info!(booking_id = %id, room_id = %room_id, guest_id, %span, %status, "booking committed");

        rt.bookings.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Admin: pending → confirmed. Confirming a confirmed booking is a no-op.
    pub async fn confirm_booking(&self, caller: &Caller, id: Ulid) -> Result<Booking, EngineError> {
        require_admin(caller)?;
        let room_type_id = self.booking_room_type(&id)?;
        let mut rt = self.write_room_type_with_retry(room_type_id).await?;
        let booking = rt.bookings.get(&id).ok_or(EngineError::NotFound(id))?;
        match booking.status {
            BookingStatus::Confirmed => return Ok(booking.clone()),
            BookingStatus::Cancelled => return Err(EngineError::AlreadyCancelled(id)),
            BookingStatus::Pending => {}
        }

        let event = Event::BookingConfirmed {
            id,
            room_type_id,
            by: caller.user_id,
            at: now_ms(),
        };
        self.persist_and_apply(&mut rt, &event).await?;
        info!(booking_id = %id, by = caller.user_id, "booking confirmed");
        rt.bookings.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Guest, booker or admin may cancel. The room's nights free up at once.
    pub async fn cancel_booking(&self, caller: &Caller, id: Ulid) -> Result<Booking, EngineError> {
        let room_type_id = self.booking_room_type(&id)?;
        let mut rt = self.write_room_type_with_retry(room_type_id).await?;
        let booking = rt.bookings.get(&id).ok_or(EngineError::NotFound(id))?;
        if !caller.is_admin() && !booking.involves(caller.user_id) {
            warn!(booking_id = %id, user_id = caller.user_id, "cancel refused: not the guest or booker");
            return Err(EngineError::Forbidden);
        }
        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(EngineError::AlreadyCancelled(id));
        }
        if self.config.cancel_cutoff && !caller.is_admin() && self.today() >= booking.span.start {
            return Err(EngineError::validation(
                "bookings cannot be cancelled on or after the check-in date",
            ));
        }

        let event = Event::BookingCancelled {
            id,
            room_type_id,
            by: caller.user_id,
            at: now_ms(),
        };
        self.persist_and_apply(&mut rt, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        info!(booking_id = %id, by = caller.user_id, "booking cancelled");
        rt.bookings.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Move a booking to new nights or change its party size, re-checked
    /// under the room type's write lock. The booking's own stay never blocks
    /// it: the current room is kept when it is still free, otherwise the
    /// lowest-numbered free room is taken. The price is left as booked.
    pub async fn modify_booking(
        &self,
        caller: &Caller,
        id: Ulid,
        change: BookingChange,
    ) -> Result<Booking, EngineError> {
        if let Some(guests) = change.guests {
            validate_guests(guests)?;
        }
        let room_type_id = self.booking_room_type(&id)?;
        let mut rt = self.write_room_type_with_retry(room_type_id).await?;
        let booking = rt.bookings.get(&id).ok_or(EngineError::NotFound(id))?;
        if !caller.is_admin() && !booking.involves(caller.user_id) {
            warn!(booking_id = %id, user_id = caller.user_id, "modify refused: not the guest or booker");
            return Err(EngineError::Forbidden);
        }
        if !booking.status.holds_room() {
            return Err(EngineError::AlreadyCancelled(id));
        }
        if self.config.cancel_cutoff && !caller.is_admin() && self.today() >= booking.span.start {
            return Err(EngineError::validation(
                "bookings cannot be changed on or after the check-in date",
            ));
        }

        let check_in = change.check_in.unwrap_or(booking.span.start);
        let check_out = change.check_out.unwrap_or(booking.span.end);
        let moved_in = check_in != booking.span.start;
        let today = (moved_in && !self.config.allow_past_check_in).then(|| self.today());
        let span = validate_stay(check_in, check_out, today)?;
        let guests = change.guests.unwrap_or(booking.guests);
        if span == booking.span && guests == booking.guests {
            return Ok(booking.clone());
        }
        if !rt.info.active {
            return Err(EngineError::validation("room type is not bookable"));
        }
        if guests > rt.info.capacity {
            return Err(EngineError::Validation(format!(
                "num_guests {guests} exceeds room capacity {}",
                rt.info.capacity
            )));
        }

        let current_room = booking.room_id;
        let free = free_rooms_ignoring(&rt, &span, guests, Some(id));
        let room_id = if free.contains(&current_room) {
            current_room
        } else if let Some(&lowest) = free.first() {
            lowest
        } else {
            metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL, "reason" => "capacity")
                .increment(1);
            info!(booking_id = %id, %span, "booking change rejected: no free room");
            return Err(EngineError::Capacity {
                room_type_id: rt.id,
            });
        };

        let event = Event::BookingModified {
            id,
            room_type_id,
            room_id,
            span,
            guests,
            by: caller.user_id,
            at: now_ms(),
        };
        self.persist_and_apply(&mut rt, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_MODIFIED_TOTAL).increment(1);
        info!(booking_id = %id, room_id = %room_id, %span, guests, by = caller.user_id, "booking modified");
        rt.bookings.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub(super) fn booking_room_type(&self, id: &Ulid) -> Result<Ulid, EngineError> {
        self.booking_to_type
            .get(id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*id))
    }

    // ── WAL maintenance ──────────────────────────────────────────

    /// Rewrite the WAL as the shortest event sequence that rebuilds the
    /// current state, booking history included. Holds the catalog lock and a
    /// read lock on every room type until the swap is done, so no append can
    /// land between snapshot and rename.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog_lock.lock().await;

        let mut hotels: Vec<Hotel> = self.hotels.iter().map(|e| e.value().clone()).collect();
        hotels.sort_by_key(|h| (h.created_at, h.id));

        let mut rt_ids: Vec<Ulid> = self.room_types.iter().map(|e| *e.key()).collect();
        rt_ids.sort();
        let mut guards = Vec::with_capacity(rt_ids.len());
        for id in rt_ids {
            guards.push(self.read_room_type(id).await?);
        }

        let mut events = Vec::new();
        for hotel in &hotels {
            events.push(Event::HotelCreated {
                id: hotel.id,
                info: hotel.info.clone(),
                created_at: hotel.created_at,
            });
        }

        // room types in per-hotel creation order
        let position: HashMap<Ulid, usize> = hotels
            .iter()
            .flat_map(|h| self.room_type_ids(&h.id))
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        guards.sort_by_key(|g| position.get(&g.id).copied().unwrap_or(usize::MAX));

        let mut bookings: Vec<&Booking> = Vec::new();
        for rt in &guards {
            events.push(Event::RoomTypeCreated {
                id: rt.id,
                hotel_id: rt.hotel_id,
                info: rt.info.clone(),
            });
            for room in &rt.rooms {
                events.push(Event::RoomCreated {
                    id: room.id,
                    room_type_id: rt.id,
                    number: room.number.clone(),
                    status: room.status,
                });
            }
            bookings.extend(rt.bookings.values());
        }

        bookings.sort_by_key(|b| b.seq);
        for b in bookings {
            let Some((placed, transitions)) = b.history.split_first() else { continue };
            events.push(Event::BookingPlaced {
                id: b.id,
                seq: b.seq,
                hotel_id: b.hotel_id,
                room_type_id: b.room_type_id,
                room_id: b.room_id,
                guest_id: b.guest_id,
                booked_by: b.booked_by,
                span: b.span,
                guests: b.guests,
                total_amount: b.total_amount,
                currency: b.currency.clone(),
                status: placed.to,
                at: placed.at,
            });
            for change in transitions {
                events.push(match change.to {
                    BookingStatus::Cancelled => Event::BookingCancelled {
                        id: b.id,
                        room_type_id: b.room_type_id,
                        by: change.by,
                        at: change.at,
                    },
                    _ => Event::BookingConfirmed {
                        id: b.id,
                        room_type_id: b.room_type_id,
                        by: change.by,
                        at: change.at,
                    },
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;

        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
