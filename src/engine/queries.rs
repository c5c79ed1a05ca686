use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_QUERY_WINDOW_DAYS;
use crate::model::*;

use super::availability::{booked_ranges, is_available, validate_stay};
use super::pricing::quote;
use super::{Engine, EngineError};

impl Engine {
    // ── Room catalog ─────────────────────────────────────────

    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let arcs: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(arcs.len());
        for rs in arcs {
            out.push(RoomInfo::from_state(&*rs.read().await));
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub async fn room_info(&self, id: Ulid) -> Result<RoomInfo, EngineError> {
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(RoomInfo::from_state(&guard))
    }

    pub async fn list_seasons(&self) -> Vec<Season> {
        self.seasons.read().await.clone()
    }

    // ── Availability ─────────────────────────────────────────

    /// Point check: can `check_in..check_out` be booked on this room right
    /// now? Advisory only — `reserve` re-checks under the write guard.
    pub async fn check_availability(
        &self,
        room_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, EngineError> {
        let stay = validate_stay(check_in, check_out)?;
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(is_available(&guard, &stay))
    }

    /// Occupied ranges within a window, for the date picker. The window is
    /// capped so a single request can't walk years of calendar.
    pub async fn availability_window(
        &self,
        room_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Stay>, EngineError> {
        let window = validate_stay(from, to)?;
        if window.nights() > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(booked_ranges(&guard, &window))
    }

    // ── Pricing ──────────────────────────────────────────────

    /// Quote a stay without reserving. Past dates are allowed here: the
    /// quote is a pure price lookup, useful for reviewing old invoices.
    pub async fn quote_room(
        &self,
        room_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Quote, EngineError> {
        let stay = validate_stay(check_in, check_out)?;
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let base_price = rs.read().await.base_price;
        let seasons = self.seasons.read().await;
        Ok(quote(base_price, &stay, &seasons))
    }

    // ── Booking ledger (admin) ───────────────────────────────

    pub fn get_booking(&self, id: Ulid) -> Option<Booking> {
        self.bookings.get(&id).map(|b| b.value().clone())
    }

    /// Bookings for one room, newest first. Falls back to a scan of the
    /// global map so history of deleted rooms stays visible.
    pub async fn bookings_for_room(&self, room_id: Ulid) -> Vec<Booking> {
        let mut out: Vec<Booking> = match self.get_room(&room_id) {
            Some(rs) => rs.read().await.bookings.clone(),
            None => self
                .bookings
                .iter()
                .filter(|e| e.value().room_id == room_id)
                .map(|e| e.value().clone())
                .collect(),
        };
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Every booking in the system, newest first. Includes orphans of
    /// deleted rooms.
    pub fn list_bookings(&self) -> Vec<Booking> {
        let mut out: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }
}
