use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used only for record timestamps.
pub type Ms = i64;

/// Half-open stay `[check_in, check_out)` over whole UTC calendar dates.
///
/// The night of `check_out` is NOT occupied: a guest may check in on the
/// same calendar date another guest checks out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "Stay check_in must be before check_out");
        Self { check_in, check_out }
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn contains_night(&self, night: NaiveDate) -> bool {
        self.check_in <= night && night < self.check_out
    }

    /// Iterate the occupied nights, `check_in` inclusive to `check_out` exclusive.
    pub fn nights_iter(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.check_out;
        self.check_in.iter_days().take_while(move |d| *d < end)
    }
}

/// Booking lifecycle status. A plain enumerated field: the admin panel may
/// overwrite it in any direction, there is no guarded transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Paid,
    Failed,
}

impl BookingStatus {
    /// FAILED bookings do not hold the room.
    pub fn holds_room(&self) -> bool {
        !matches!(self, BookingStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub guest_name: String,
    pub guest_phone: String,
    pub stay: Stay,
    /// Total computed at booking time and persisted; never recomputed later.
    pub total: i64,
    pub status: BookingStatus,
    pub created_at: Ms,
}

/// Seasonal pricing rule over an inclusive date range `[start, end]`.
/// Rules may overlap; the maximum applicable multiplier wins per night.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: Ulid,
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub multiplier: f64,
}

impl Season {
    pub fn applies_to(&self, night: NaiveDate) -> bool {
        self.start <= night && night <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: String,
    pub description: String,
    /// Base nightly price in whole currency units (> 0).
    pub base_price: i64,
    pub capacity: u32,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    /// All bookings ever taken on this room, sorted by `stay.check_in`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(id: Ulid, draft: RoomDraft) -> Self {
        Self {
            id,
            name: draft.name,
            description: draft.description,
            base_price: draft.base_price,
            capacity: draft.capacity,
            amenities: draft.amenities,
            images: draft.images,
            bookings: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by check-in date.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.stay.check_in, |b| b.stay.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Return only bookings whose stay overlaps the query window.
    /// Uses binary search to skip bookings checking in at or after `query.check_out`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound checks in at or after
        // query.check_out → can't overlap.
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < query.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > query.check_in)
    }
}

/// Admin-supplied room fields, shared between create and update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDraft {
    pub name: String,
    pub description: String,
    pub base_price: i64,
    pub capacity: u32,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Admin-supplied season fields, shared between create and update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonDraft {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub multiplier: f64,
}

/// A reservation attempt from the public booking form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub room_id: Ulid,
    pub guest_name: String,
    pub guest_phone: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    /// Out-of-band payment already confirmed (cash / WhatsApp flow):
    /// insert the booking directly as PAID instead of PENDING.
    #[serde(default)]
    pub paid: bool,
}

/// The event types — flat, no nesting. This is the ledger record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: String,
        description: String,
        base_price: i64,
        capacity: u32,
        amenities: Vec<String>,
        images: Vec<String>,
    },
    RoomUpdated {
        id: Ulid,
        name: String,
        description: String,
        base_price: i64,
        capacity: u32,
        amenities: Vec<String>,
        images: Vec<String>,
    },
    RoomDeleted {
        id: Ulid,
    },
    SeasonAdded {
        id: Ulid,
        label: String,
        start: NaiveDate,
        end: NaiveDate,
        multiplier: f64,
    },
    SeasonUpdated {
        id: Ulid,
        label: String,
        start: NaiveDate,
        end: NaiveDate,
        multiplier: f64,
    },
    SeasonRemoved {
        id: Ulid,
    },
    BookingCreated {
        id: Ulid,
        room_id: Ulid,
        guest_name: String,
        guest_phone: String,
        stay: Stay,
        total: i64,
        status: BookingStatus,
        created_at: Ms,
    },
    BookingStatusSet {
        id: Ulid,
        status: BookingStatus,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Catalog view of a room (no booking history).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: String,
    pub description: String,
    pub base_price: i64,
    pub capacity: u32,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
}

impl RoomInfo {
    pub fn from_state(rs: &RoomState) -> Self {
        Self {
            id: rs.id,
            name: rs.name.clone(),
            description: rs.description.clone(),
            base_price: rs.base_price,
            capacity: rs.capacity,
            amenities: rs.amenities.clone(),
            images: rs.images.clone(),
        }
    }
}

/// One priced night inside a quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NightCharge {
    pub date: NaiveDate,
    pub multiplier: f64,
    /// Unrounded charge for this night; rounding happens only on the total.
    pub amount: f64,
}

/// Result of pricing a stay. `avg_per_night` is informational for display
/// and never used to recompute a commitment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub total: i64,
    pub avg_per_night: i64,
    pub nights: i64,
    pub nightly: Vec<NightCharge>,
}
