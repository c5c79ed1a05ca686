//! Hard caps on user-controlled input. Generous for a farmstay, tight
//! enough that a misbehaving client cannot balloon memory or the ledger.

pub const MAX_ROOMS: usize = 1024;
pub const MAX_SEASONS: usize = 4096;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TEXT_LEN: usize = 8192;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_LIST_ITEMS: usize = 64;

/// Longest bookable stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 90;

/// Widest availability/quote query window, in nights.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 2 * 366;

/// Calendar dates outside this year range are rejected outright.
pub const MIN_VALID_YEAR: i32 = 2000;
pub const MAX_VALID_YEAR: i32 = 2100;
