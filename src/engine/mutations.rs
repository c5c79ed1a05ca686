use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{conflict, now_ms, today_utc, validate_stay};
use super::pricing::quote;
use super::{Engine, EngineError, LedgerCommand};

fn validate_room_draft(draft: &RoomDraft) -> Result<(), EngineError> {
    if draft.name.is_empty() {
        return Err(EngineError::InvalidInput("room name must not be empty"));
    }
    if draft.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    if draft.description.len() > MAX_TEXT_LEN {
        return Err(EngineError::LimitExceeded("room description too long"));
    }
    if draft.base_price <= 0 {
        return Err(EngineError::InvalidInput("base price must be positive"));
    }
    if draft.capacity == 0 {
        return Err(EngineError::InvalidInput("capacity must be positive"));
    }
    if draft.amenities.len() > MAX_LIST_ITEMS || draft.images.len() > MAX_LIST_ITEMS {
        return Err(EngineError::LimitExceeded("too many amenities or images"));
    }
    if draft.amenities.iter().chain(&draft.images).any(|s| s.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("list entry too long"));
    }
    Ok(())
}

fn validate_season_draft(draft: &SeasonDraft) -> Result<(), EngineError> {
    if draft.label.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("season label too long"));
    }
    // Inclusive range: a single-date season has start == end
    if draft.start > draft.end {
        return Err(EngineError::InvalidInput("season start after end"));
    }
    if !draft.multiplier.is_finite() || draft.multiplier < 0.0 {
        return Err(EngineError::InvalidInput("multiplier must be a finite number >= 0"));
    }
    Ok(())
}

fn room_event(id: Ulid, draft: &RoomDraft, created: bool) -> Event {
    if created {
        Event::RoomCreated {
            id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            base_price: draft.base_price,
            capacity: draft.capacity,
            amenities: draft.amenities.clone(),
            images: draft.images.clone(),
        }
    } else {
        Event::RoomUpdated {
            id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            base_price: draft.base_price,
            capacity: draft.capacity,
            amenities: draft.amenities.clone(),
            images: draft.images.clone(),
        }
    }
}

impl Engine {
    // ── Room catalog (admin) ─────────────────────────────────

    pub async fn create_room(&self, id: Ulid, draft: RoomDraft) -> Result<(), EngineError> {
        validate_room_draft(&draft)?;
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = room_event(id, &draft, true);
        self.ledger_append(&event).await?;
        self.rooms
            .insert(id, Arc::new(RwLock::new(RoomState::new(id, draft))));
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn update_room(&self, id: Ulid, draft: RoomDraft) -> Result<(), EngineError> {
        validate_room_draft(&draft)?;
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        let event = room_event(id, &draft, false);
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Remove a room from the catalog. Non-cascading: the room's historical
    /// bookings remain addressable for status updates and listing, they
    /// just reference an id that no longer resolves.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.rooms.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::RoomDeleted { id };
        self.ledger_append(&event).await?;
        self.rooms.remove(&id);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        Ok(())
    }

    // ── Pricing rule store (admin) ───────────────────────────

    pub async fn add_season(&self, id: Ulid, draft: SeasonDraft) -> Result<(), EngineError> {
        validate_season_draft(&draft)?;
        let mut seasons = self.seasons.write().await;
        if seasons.len() >= MAX_SEASONS {
            return Err(EngineError::LimitExceeded("too many seasons"));
        }
        if seasons.iter().any(|s| s.id == id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::SeasonAdded {
            id,
            label: draft.label.clone(),
            start: draft.start,
            end: draft.end,
            multiplier: draft.multiplier,
        };
        self.ledger_append(&event).await?;
        seasons.push(Season {
            id,
            label: draft.label,
            start: draft.start,
            end: draft.end,
            multiplier: draft.multiplier,
        });
        Ok(())
    }

    pub async fn update_season(&self, id: Ulid, draft: SeasonDraft) -> Result<(), EngineError> {
        validate_season_draft(&draft)?;
        let mut seasons = self.seasons.write().await;
        if !seasons.iter().any(|s| s.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::SeasonUpdated {
            id,
            label: draft.label.clone(),
            start: draft.start,
            end: draft.end,
            multiplier: draft.multiplier,
        };
        self.ledger_append(&event).await?;
        if let Some(s) = seasons.iter_mut().find(|s| s.id == id) {
            s.label = draft.label;
            s.start = draft.start;
            s.end = draft.end;
            s.multiplier = draft.multiplier;
        }
        Ok(())
    }

    pub async fn remove_season(&self, id: Ulid) -> Result<(), EngineError> {
        let mut seasons = self.seasons.write().await;
        if !seasons.iter().any(|s| s.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::SeasonRemoved { id };
        self.ledger_append(&event).await?;
        seasons.retain(|s| s.id != id);
        Ok(())
    }

    // ── Reservation workflow ─────────────────────────────────

    /// Validate, check availability, price, and commit a booking.
    ///
    /// The availability check runs twice: an optimistic pass for fast
    /// feedback, then an authoritative re-check inside the per-room write
    /// guard, atomic with the ledger insert. Two concurrent attempts on
    /// overlapping dates serialize at the write guard; the second observes
    /// the first's freshly committed booking and is rejected with RaceLost.
    pub async fn reserve(&self, req: ReserveRequest) -> Result<Booking, EngineError> {
        // Gate 1: input validation
        let stay = validate_stay(req.check_in, req.check_out)?;
        if stay.nights() > MAX_STAY_NIGHTS {
            return Err(EngineError::LimitExceeded("stay too long"));
        }
        if req.check_in < today_utc() {
            return Err(EngineError::PastCheckIn(req.check_in));
        }
        if req.guest_name.trim().is_empty() {
            return Err(EngineError::InvalidInput("guest name must not be empty"));
        }
        if req.guest_name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("guest name too long"));
        }
        if req.guest_phone.is_empty() || req.guest_phone.len() > MAX_PHONE_LEN {
            return Err(EngineError::InvalidInput("guest phone missing or too long"));
        }
        let rs = self
            .get_room(&req.room_id)
            .ok_or(EngineError::NotFound(req.room_id))?;

        // Gate 2: optimistic availability check (read lock only)
        let base_price = {
            let guard = rs.read().await;
            if let Some(existing) = conflict(&guard, &stay) {
                return Err(EngineError::RoomUnavailable(existing));
            }
            guard.base_price
        };

        // Gate 3: price the stay
        let priced = {
            let seasons = self.seasons.read().await;
            quote(base_price, &stay, &seasons)
        };

        let booking = Booking {
            id: Ulid::new(),
            room_id: req.room_id,
            guest_name: req.guest_name,
            guest_phone: req.guest_phone,
            stay,
            total: priced.total,
            status: if req.paid {
                BookingStatus::Paid
            } else {
                BookingStatus::Pending
            },
            created_at: now_ms(),
        };

        // Gate 4: commit. Re-check and insert under the room's write guard —
        // the only step that needs exclusivity.
        let mut guard = rs.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        if let Some(existing) = conflict(&guard, &stay) {
            return Err(EngineError::RaceLost(existing));
        }
        let event = Event::BookingCreated {
            id: booking.id,
            room_id: booking.room_id,
            guest_name: booking.guest_name.clone(),
            guest_phone: booking.guest_phone.clone(),
            stay: booking.stay,
            total: booking.total,
            status: booking.status,
            created_at: booking.created_at,
        };
        self.persist_and_apply(req.room_id, &mut guard, &event).await?;
        drop(guard);

        tracing::info!(
            booking = %booking.id,
            room = %booking.room_id,
            check_in = %booking.stay.check_in,
            check_out = %booking.stay.check_out,
            total = booking.total,
            "booking reserved"
        );
        Ok(booking)
    }

    /// Unconditional status overwrite, admin-only at the HTTP layer. No
    /// transition table: PAID may move back to PENDING. Works for bookings
    /// of deleted rooms too.
    pub async fn set_status(
        &self,
        booking_id: Ulid,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        if !self.bookings.contains_key(&booking_id) {
            return Err(EngineError::NotFound(booking_id));
        }
        let room_id = self
            .room_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let event = Event::BookingStatusSet { id: booking_id, status };

        match self.get_room(&room_id) {
            Some(rs) => {
                let mut guard = rs.write().await;
                self.persist_and_apply(room_id, &mut guard, &event).await?;
            }
            None => {
                // Room was deleted — update the historical record only
                self.ledger_append(&event).await?;
                if let Some(mut b) = self.bookings.get_mut(&booking_id) {
                    b.status = status;
                }
            }
        }

        self.bookings
            .get(&booking_id)
            .map(|b| b.value().clone())
            .ok_or(EngineError::NotFound(booking_id))
    }

    // ── Ledger maintenance ───────────────────────────────────

    /// Compact the ledger by rewriting it with only the events needed to
    /// recreate the current state: seasons, rooms, and every booking with
    /// its final status baked in (including orphans of deleted rooms).
    pub async fn compact_ledger(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        {
            let seasons = self.seasons.read().await;
            for s in seasons.iter() {
                events.push(Event::SeasonAdded {
                    id: s.id,
                    label: s.label.clone(),
                    start: s.start,
                    end: s.end,
                    multiplier: s.multiplier,
                });
            }
        }

        let room_arcs: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs in room_arcs {
            let guard = rs.read().await;
            events.push(Event::RoomCreated {
                id: guard.id,
                name: guard.name.clone(),
                description: guard.description.clone(),
                base_price: guard.base_price,
                capacity: guard.capacity,
                amenities: guard.amenities.clone(),
                images: guard.images.clone(),
            });
            for b in &guard.bookings {
                events.push(booking_created_event(b));
            }
        }

        // Orphaned bookings: rooms deleted, history retained
        for entry in self.bookings.iter() {
            let b = entry.value();
            if !self.rooms.contains_key(&b.room_id) {
                events.push(booking_created_event(b));
            }
        }

        let (tx, rx) = oneshot::channel();
        self.ledger_tx
            .send(LedgerCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::LedgerError("ledger writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::LedgerError("ledger writer dropped response".into()))?
            .map_err(|e| EngineError::LedgerError(e.to_string()))
    }

    pub async fn ledger_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .ledger_tx
            .send(LedgerCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn booking_created_event(b: &Booking) -> Event {
    Event::BookingCreated {
        id: b.id,
        room_id: b.room_id,
        guest_name: b.guest_name.clone(),
        guest_phone: b.guest_phone.clone(),
        stay: b.stay,
        total: b.total,
        status: b.status,
        created_at: b.created_at,
    }
}
