mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod report;

pub use availability::{free_rooms, room_nights};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::warn;
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedRoomType = Arc<RwLock<RoomTypeState>>;

// ── Group-commit WAL writer ──────────────────────────────

type Reply = oneshot::Sender<io::Result<()>>;

pub(super) enum WalCommand {
    Append { event: Event, response: Reply },
    /// Replace the log with a snapshot of the current state.
    Compact { events: Vec<Event>, response: Reply },
    AppendsSinceCompact { response: oneshot::Sender<u64> },
}

/// Owns the WAL. Appends that queue up while one batch is being written
/// share the next fsync; every waiter hears back only once its record is
/// durable. Other commands run between batches, never inside one.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut pending: Vec<(Event, Reply)> = Vec::new();
    while let Some(first) = rx.recv().await {
        let mut deferred = None;
        match first {
            WalCommand::Append { event, response } => pending.push((event, response)),
            other => deferred = Some(other),
        }
        while deferred.is_none() {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => pending.push((event, response)),
                Ok(other) => deferred = Some(other),
                Err(_) => break,
            }
        }
        if !pending.is_empty() {
            commit_batch(&mut wal, &mut pending);
        }
        match deferred {
            Some(WalCommand::Compact { events, response }) => {
                let _ = response.send(wal.rewrite(&events));
            }
            Some(WalCommand::AppendsSinceCompact { response }) => {
                let _ = response.send(wal.appends_since_compact());
            }
            Some(WalCommand::Append { .. }) | None => {}
        }
    }
}

/// Write and fsync `batch` as one unit, then answer each waiter with the
/// shared outcome. A failed batch leaves nothing behind in the log.
fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, Reply)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let outcome = wal.append_batch(batch.iter().map(|(event, _)| event));

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &outcome {
        tracing::error!(batch = batch.len(), "wal commit failed: {e}");
    }
    for (_, reply) in batch.drain(..) {
        let r = match &outcome {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = reply.send(r);
    }
}

/// Booking policy knobs. Defaults match the production behaviour.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single room type lock wait.
    pub lock_timeout: Duration,
    /// Extra lock attempts for `create_booking` after a timeout.
    pub commit_retries: u32,
    /// First retry delay; doubles per attempt.
    pub retry_backoff: Duration,
    pub allow_past_check_in: bool,
    /// New bookings start `pending` and need an admin confirm.
    pub pending_bookings: bool,
    /// Non-admins cannot cancel on or after the check-in date.
    pub cancel_cutoff: bool,
    /// Fixed "today" for tests; `None` uses the UTC calendar date.
    pub today: Option<NaiveDate>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2_000),
            commit_retries: 3,
            retry_backoff: Duration::from_millis(25),
            allow_past_check_in: false,
            pending_bookings: false,
            cancel_cutoff: true,
            today: None,
        }
    }
}

pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) hotels: DashMap<Ulid, Hotel>,
    pub(super) room_types: DashMap<Ulid, SharedRoomType>,
    /// Hotel → its room types, in creation order.
    pub(super) hotel_room_types: DashMap<Ulid, Vec<Ulid>>,
    /// Reverse lookup: room id → room type id
    pub(super) room_to_type: DashMap<Ulid, Ulid>,
    /// (hotel id, room number) → room id. Keeps numbers unique per hotel.
    pub(super) room_numbers: DashMap<(Ulid, String), Ulid>,
    /// Reverse lookup: booking id → room type id
    pub(super) booking_to_type: DashMap<Ulid, Ulid>,
    /// Bookings where the user is guest or booker.
    pub(super) user_bookings: DashMap<UserId, Vec<Ulid>>,
    pub(super) next_seq: AtomicU64,
    /// Serializes inventory administration and compaction.
    pub(super) catalog_lock: Mutex<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, config: EngineConfig) -> io::Result<Self> {
        let (wal, events) = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            config,
            hotels: DashMap::new(),
            room_types: DashMap::new(),
            hotel_room_types: DashMap::new(),
            room_to_type: DashMap::new(),
            room_numbers: DashMap::new(),
            booking_to_type: DashMap::new(),
            user_bookings: DashMap::new(),
            next_seq: AtomicU64::new(1),
            catalog_lock: Mutex::new(()),
            wal_tx,
            notify,
        };

        // Sole owner of every lock here, so try_write never contends. Never
        // block_on a lock: this runs inside the runtime.
        for event in &events {
            match event.room_type_id() {
                Some(rt_id) if !matches!(event, Event::RoomTypeCreated { .. }) => {
                    let Some(rt) = engine.room_type_arc(&rt_id) else {
                        warn!("replay: event for unknown room type {rt_id}, skipping");
                        continue;
                    };
                    let mut guard = rt
                        .try_write()
                        .map_err(|_| io::Error::other("replay: room type lock contended"))?;
                    engine.apply_locked(&mut guard, event);
                }
                _ => engine.apply_catalog(event),
            }
        }

        tracing::info!(
            events = events.len(),
            hotels = engine.hotels.len(),
            room_types = engine.room_types.len(),
            bookings = engine.booking_to_type.len(),
            "engine state replayed from {}",
            wal_path.display()
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Calendar date used for the check-in and cancel-cutoff policies.
    pub fn today(&self) -> NaiveDate {
        self.config
            .today
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }

    /// Apply events that touch no room type lock: hotel records and the
    /// creation of a room type itself.
    fn apply_catalog(&self, event: &Event) {
        match event {
            Event::HotelCreated { id, info, created_at } => {
                self.hotels.insert(
                    *id,
                    Hotel {
                        id: *id,
                        info: info.clone(),
                        created_at: *created_at,
                    },
                );
                self.hotel_room_types.entry(*id).or_default();
            }
            Event::HotelUpdated { id, info } => {
                if let Some(mut hotel) = self.hotels.get_mut(id) {
                    hotel.info = info.clone();
                }
            }
            Event::RoomTypeCreated { id, hotel_id, info } => {
                let rt = RoomTypeState::new(*id, *hotel_id, info.clone());
                self.room_types.insert(*id, Arc::new(RwLock::new(rt)));
                self.hotel_room_types.entry(*hotel_id).or_default().push(*id);
            }
            _ => {}
        }
    }

    /// Apply an event to a room type (no locking; caller holds the write lock).
    fn apply_locked(&self, rt: &mut RoomTypeState, event: &Event) {
        match event {
            Event::RoomTypeUpdated { info, .. } => {
                rt.info = info.clone();
            }
            Event::RoomCreated { id, number, status, .. } => {
                rt.insert_room(RoomState::new(*id, number.clone(), *status));
                self.room_to_type.insert(*id, rt.id);
                self.room_numbers.insert((rt.hotel_id, number.clone()), *id);
            }
            Event::RoomUpdated { id, number, status, .. } => {
                let hotel_id = rt.hotel_id;
                let Some(room) = rt.room_mut(id) else { return };
                room.status = *status;
                if room.number != *number {
                    let old = std::mem::replace(&mut room.number, number.clone());
                    self.room_numbers.remove(&(hotel_id, old));
                    self.room_numbers.insert((hotel_id, number.clone()), *id);
                    rt.resort_rooms();
                }
            }
            Event::BookingPlaced {
                id,
                seq,
                hotel_id,
                room_type_id,
                room_id,
                guest_id,
                booked_by,
                span,
                guests,
                total_amount,
                currency,
                status,
                at,
            } => {
                if status.holds_room()
                    && let Some(room) = rt.room_mut(room_id)
                {
                    room.insert_stay(Stay {
                        booking_id: *id,
                        span: *span,
                    });
                }
                rt.bookings.insert(
                    *id,
                    Booking {
                        id: *id,
                        seq: *seq,
                        hotel_id: *hotel_id,
                        room_type_id: *room_type_id,
                        room_id: *room_id,
                        guest_id: *guest_id,
                        booked_by: *booked_by,
                        span: *span,
                        guests: *guests,
                        total_amount: *total_amount,
                        currency: currency.clone(),
                        status: *status,
                        created_at: *at,
                        history: vec![StatusChange {
                            from: None,
                            to: *status,
                            by: *booked_by,
                            at: *at,
                        }],
                    },
                );
                self.booking_to_type.insert(*id, *room_type_id);
                self.user_bookings.entry(*guest_id).or_default().push(*id);
                if booked_by != guest_id {
                    self.user_bookings.entry(*booked_by).or_default().push(*id);
                }
                self.next_seq.fetch_max(seq + 1, Ordering::SeqCst);
            }
            Event::BookingConfirmed { id, by, at, .. } => {
                if let Some(b) = rt.bookings.get_mut(id) {
                    b.history.push(StatusChange {
                        from: Some(b.status),
                        to: BookingStatus::Confirmed,
                        by: *by,
                        at: *at,
                    });
                    b.status = BookingStatus::Confirmed;
                }
            }
            Event::BookingCancelled { id, by, at, .. } => {
                let Some(b) = rt.bookings.get_mut(id) else { return };
                b.history.push(StatusChange {
                    from: Some(b.status),
                    to: BookingStatus::Cancelled,
                    by: *by,
                    at: *at,
                });
                b.status = BookingStatus::Cancelled;
                let room_id = b.room_id;
                if let Some(room) = rt.room_mut(&room_id) {
                    room.remove_stay(*id);
                }
            }
            Event::BookingModified {
                id,
                room_id,
                span,
                guests,
                ..
            } => {
                let Some(b) = rt.bookings.get_mut(id) else { return };
                let previous_room = std::mem::replace(&mut b.room_id, *room_id);
                b.span = *span;
                b.guests = *guests;
                let holds = b.status.holds_room();
                if let Some(room) = rt.room_mut(&previous_room) {
                    room.remove_stay(*id);
                }
                if holds && let Some(room) = rt.room_mut(room_id) {
                    room.insert_stay(Stay {
                        booking_id: *id,
                        span: *span,
                    });
                }
            }
            Event::HotelCreated { .. } | Event::HotelUpdated { .. } | Event::RoomTypeCreated { .. } => {}
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append, apply to the locked room type, notify the hotel's listeners.
    pub(super) async fn persist_and_apply(
        &self,
        rt: &mut RoomTypeState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_locked(rt, event);
        self.notify.send(rt.hotel_id, event);
        Ok(())
    }

    /// Same as `persist_and_apply` for hotel-level events. Caller holds `catalog_lock`.
    pub(super) async fn persist_catalog(&self, hotel_id: Ulid, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_catalog(event);
        self.notify.send(hotel_id, event);
        Ok(())
    }

    pub(super) fn room_type_arc(&self, id: &Ulid) -> Option<SharedRoomType> {
        self.room_types.get(id).map(|e| e.value().clone())
    }

    pub(super) fn hotel(&self, id: &Ulid) -> Result<Hotel, EngineError> {
        self.hotels
            .get(id)
            .map(|h| h.value().clone())
            .ok_or(EngineError::NotFound(*id))
    }

    pub(super) fn room_type_ids(&self, hotel_id: &Ulid) -> Vec<Ulid> {
        self.hotel_room_types
            .get(hotel_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default()
    }

    /// Write lock on one room type, bounded by `lock_timeout`.
    pub(super) async fn write_room_type(
        &self,
        id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<RoomTypeState>, EngineError> {
        let rt = self.room_type_arc(&id).ok_or(EngineError::NotFound(id))?;
        match tokio::time::timeout(self.config.lock_timeout, rt.write_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL, "mode" => "write")
                    .increment(1);
                warn!("write lock wait on room type {id} timed out");
                Err(EngineError::Transient("room type busy"))
            }
        }
    }

    pub(super) async fn read_room_type(
        &self,
        id: Ulid,
    ) -> Result<OwnedRwLockReadGuard<RoomTypeState>, EngineError> {
        let rt = self.room_type_arc(&id).ok_or(EngineError::NotFound(id))?;
        match tokio::time::timeout(self.config.lock_timeout, rt.read_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL, "mode" => "read")
                    .increment(1);
                warn!("read lock wait on room type {id} timed out");
                Err(EngineError::Transient("room type busy"))
            }
        }
    }

    /// `write_room_type`, retried `commit_retries` times with doubling backoff.
    pub(super) async fn write_room_type_with_retry(
        &self,
        id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<RoomTypeState>, EngineError> {
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 0;
        loop {
            match self.write_room_type(id).await {
                Err(e) if e.is_retryable() && attempt < self.config.commit_retries => {
                    attempt += 1;
                    tracing::debug!("retrying lock on room type {id} (attempt {attempt})");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                other => return other,
            }
        }
    }
}
