mod availability;
mod error;
mod mutations;
mod pricing;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{booked_ranges, conflict, is_available, merge_overlapping};
pub use error::EngineError;
pub use pricing::{night_multiplier, quote};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::ledger::Ledger;
use crate::model::*;
use crate::notify::NotifyHub;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit ledger channel ──────────────────────────

pub(super) enum LedgerCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the ledger file and batches appends for group
/// commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn ledger_writer_loop(mut ledger: Ledger, mut rx: mpsc::Receiver<LedgerCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            LedgerCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(LedgerCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut ledger, &mut batch);
                            handle_non_append(&mut ledger, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut ledger, &mut batch);
                }
            }
            other => handle_non_append(&mut ledger, other),
        }
    }
}

fn flush_and_respond(ledger: &mut Ledger, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::LEDGER_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(ledger, batch);
    metrics::histogram!(crate::observability::LEDGER_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    ledger: &mut Ledger,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = ledger.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = ledger.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(ledger: &mut Ledger, cmd: LedgerCommand) {
    match cmd {
        LedgerCommand::Compact { events, response } => {
            let result = Ledger::write_compact_file(ledger.path(), &events)
                .and_then(|()| ledger.swap_compact_file());
            let _ = response.send(result);
        }
        LedgerCommand::AppendsSinceCompact { response } => {
            let _ = response.send(ledger.appends_since_compact());
        }
        LedgerCommand::Append { .. } => unreachable!(),
    }
}

/// The booking core: room catalog, pricing rule store, and booking ledger
/// behind per-room locks.
///
/// Reads run unsynchronized (read guards); only the reservation commit and
/// admin mutations take a room's write guard. Bookings for different rooms
/// never contend.
pub struct Engine {
    pub rooms: DashMap<Ulid, SharedRoomState>,
    /// Global seasonal pricing rules. Read-only to the booking workflow.
    pub(super) seasons: RwLock<Vec<Season>>,
    /// Every booking ever taken, including those of deleted rooms.
    /// Room deletion does not cascade: historical bookings stay
    /// addressable for status updates and listing.
    pub(super) bookings: DashMap<Ulid, Booking>,
    /// Reverse lookup: booking id → room id.
    pub(super) booking_to_room: DashMap<Ulid, Ulid>,
    pub(super) ledger_tx: mpsc::Sender<LedgerCommand>,
    pub notify: Arc<NotifyHub>,
}

/// Apply a room-scoped event to a RoomState (no locking — caller holds the
/// write guard) and keep the global booking indexes in step.
fn apply_to_room(
    rs: &mut RoomState,
    event: &Event,
    bookings: &DashMap<Ulid, Booking>,
    index: &DashMap<Ulid, Ulid>,
) {
    match event {
        Event::RoomUpdated {
            name,
            description,
            base_price,
            capacity,
            amenities,
            images,
            ..
        } => {
            rs.name = name.clone();
            rs.description = description.clone();
            rs.base_price = *base_price;
            rs.capacity = *capacity;
            rs.amenities = amenities.clone();
            rs.images = images.clone();
        }
        Event::BookingCreated {
            id,
            room_id,
            guest_name,
            guest_phone,
            stay,
            total,
            status,
            created_at,
        } => {
            let booking = Booking {
                id: *id,
                room_id: *room_id,
                guest_name: guest_name.clone(),
                guest_phone: guest_phone.clone(),
                stay: *stay,
                total: *total,
                status: *status,
                created_at: *created_at,
            };
            rs.insert_booking(booking.clone());
            bookings.insert(*id, booking);
            index.insert(*id, *room_id);
        }
        Event::BookingStatusSet { id, status } => {
            if let Some(b) = rs.booking_mut(*id) {
                b.status = *status;
            }
            if let Some(mut b) = bookings.get_mut(id) {
                b.status = *status;
            }
        }
        // Room create/delete and season events are handled at the map level
        _ => {}
    }
}

impl Engine {
    pub fn new(ledger_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Ledger::replay(&ledger_path)?;
        let ledger = Ledger::open(&ledger_path)?;
        let (ledger_tx, ledger_rx) = mpsc::channel(4096);
        tokio::spawn(ledger_writer_loop(ledger, ledger_rx));

        let engine = Self {
            rooms: DashMap::new(),
            seasons: RwLock::new(Vec::new()),
            bookings: DashMap::new(),
            booking_to_room: DashMap::new(),
            ledger_tx,
            notify,
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this runs inside an async context.
        for event in &events {
            match event {
                Event::RoomCreated {
                    id,
                    name,
                    description,
                    base_price,
                    capacity,
                    amenities,
                    images,
                } => {
                    let rs = RoomState::new(
                        *id,
                        RoomDraft {
                            name: name.clone(),
                            description: description.clone(),
                            base_price: *base_price,
                            capacity: *capacity,
                            amenities: amenities.clone(),
                            images: images.clone(),
                        },
                    );
                    engine.rooms.insert(*id, Arc::new(RwLock::new(rs)));
                }
                Event::RoomDeleted { id } => {
                    // Non-cascading: the global booking maps keep the
                    // room's history
                    engine.rooms.remove(id);
                }
                Event::SeasonAdded {
                    id,
                    label,
                    start,
                    end,
                    multiplier,
                } => {
                    let mut seasons = engine
                        .seasons
                        .try_write()
                        .expect("replay: uncontended write");
                    seasons.push(Season {
                        id: *id,
                        label: label.clone(),
                        start: *start,
                        end: *end,
                        multiplier: *multiplier,
                    });
                }
                Event::SeasonUpdated {
                    id,
                    label,
                    start,
                    end,
                    multiplier,
                } => {
                    let mut seasons = engine
                        .seasons
                        .try_write()
                        .expect("replay: uncontended write");
                    if let Some(s) = seasons.iter_mut().find(|s| s.id == *id) {
                        s.label = label.clone();
                        s.start = *start;
                        s.end = *end;
                        s.multiplier = *multiplier;
                    }
                }
                Event::SeasonRemoved { id } => {
                    let mut seasons = engine
                        .seasons
                        .try_write()
                        .expect("replay: uncontended write");
                    seasons.retain(|s| s.id != *id);
                }
                Event::BookingCreated { id, room_id, .. } => {
                    match engine.rooms.get(room_id) {
                        Some(entry) => {
                            let rs_arc = entry.value().clone();
                            let mut guard =
                                rs_arc.try_write().expect("replay: uncontended write");
                            apply_to_room(
                                &mut guard,
                                event,
                                &engine.bookings,
                                &engine.booking_to_room,
                            );
                        }
                        None => {
                            // Orphaned booking of a deleted room: index it
                            // globally so status updates still resolve
                            if let Event::BookingCreated {
                                guest_name,
                                guest_phone,
                                stay,
                                total,
                                status,
                                created_at,
                                ..
                            } = event
                            {
                                engine.bookings.insert(
                                    *id,
                                    Booking {
                                        id: *id,
                                        room_id: *room_id,
                                        guest_name: guest_name.clone(),
                                        guest_phone: guest_phone.clone(),
                                        stay: *stay,
                                        total: *total,
                                        status: *status,
                                        created_at: *created_at,
                                    },
                                );
                                engine.booking_to_room.insert(*id, *room_id);
                            }
                        }
                    }
                }
                Event::BookingStatusSet { id, status } => {
                    if let Some(room_id) = engine.booking_to_room.get(id).map(|e| *e.value())
                        && let Some(entry) = engine.rooms.get(&room_id) {
                            let rs_arc = entry.value().clone();
                            let mut guard =
                                rs_arc.try_write().expect("replay: uncontended write");
                            apply_to_room(
                                &mut guard,
                                event,
                                &engine.bookings,
                                &engine.booking_to_room,
                            );
                            continue;
                        }
                    if let Some(mut b) = engine.bookings.get_mut(id) {
                        b.status = *status;
                    }
                }
                Event::RoomUpdated { id, .. } => {
                    if let Some(entry) = engine.rooms.get(id) {
                        let rs_arc = entry.value().clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_room(
                            &mut guard,
                            event,
                            &engine.bookings,
                            &engine.booking_to_room,
                        );
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write an event to the ledger via the background group-commit writer.
    pub(super) async fn ledger_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.ledger_tx
            .send(LedgerCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::LedgerError("ledger writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::LedgerError("ledger writer dropped response".into()))?
            .map_err(|e| EngineError::LedgerError(e.to_string()))
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// Ledger-append + apply + notify in one call. Eliminates the repeated
    /// 3-line pattern in the mutations.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.ledger_append(event).await?;
        apply_to_room(rs, event, &self.bookings, &self.booking_to_room);
        self.notify.send(room_id, event);
        Ok(())
    }
}
