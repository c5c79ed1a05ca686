use chrono::{Datelike, NaiveDate, Utc};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Today as a UTC calendar date. The core never consults local time, so a
/// night can't shift by one day depending on the server's timezone.
pub(crate) fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Build a `Stay` from raw check-in/check-out dates, rejecting inverted or
/// empty ranges and dates outside the supported calendar window.
pub(crate) fn validate_stay(
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> Result<Stay, EngineError> {
    if check_in >= check_out {
        return Err(EngineError::InvalidDateRange { check_in, check_out });
    }
    if check_in.year() < MIN_VALID_YEAR || check_out.year() > MAX_VALID_YEAR {
        return Err(EngineError::LimitExceeded("date out of supported range"));
    }
    Ok(Stay::new(check_in, check_out))
}

// ── Availability Checker ──────────────────────────────────────────

/// First committed (PENDING/PAID) booking whose stay overlaps `stay`.
/// FAILED bookings do not hold the room and are skipped.
pub fn conflict(room: &RoomState, stay: &Stay) -> Option<Ulid> {
    room.overlapping(stay)
        .find(|b| b.status.holds_room())
        .map(|b| b.id)
}

/// No side effects: an O(n) scan over the room's booking history.
pub fn is_available(room: &RoomState, stay: &Stay) -> bool {
    conflict(room, stay).is_none()
}

/// Occupied date ranges clamped to `window`, merged into disjoint ranges.
/// Feeds the booking form's date picker (grayed-out dates).
pub fn booked_ranges(room: &RoomState, window: &Stay) -> Vec<Stay> {
    let mut occupied: Vec<Stay> = room
        .overlapping(window)
        .filter(|b| b.status.holds_room())
        .map(|b| {
            Stay::new(
                b.stay.check_in.max(window.check_in),
                b.stay.check_out.min(window.check_out),
            )
        })
        .collect();
    occupied.sort_by_key(|s| s.check_in);
    merge_overlapping(&occupied)
}

/// Merge sorted overlapping/adjacent stays into disjoint ranges.
pub fn merge_overlapping(sorted: &[Stay]) -> Vec<Stay> {
    let mut merged: Vec<Stay> = Vec::new();
    for &stay in sorted {
        if let Some(last) = merged.last_mut()
            && stay.check_in <= last.check_out {
                last.check_out = last.check_out.max(stay.check_out);
                continue;
            }
        merged.push(stay);
    }
    merged
}
