use chrono::NaiveDate;
use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Malformed range: check-out not strictly after check-in.
    InvalidDateRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    /// Check-in before today (UTC calendar date). No retroactive bookings.
    PastCheckIn(NaiveDate),
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    /// Room occupied, detected at the optimistic check. Carries the
    /// conflicting booking id.
    RoomUnavailable(Ulid),
    /// Room occupied, detected at the commit-time authoritative re-check:
    /// a concurrent reservation won the room between check and commit.
    RaceLost(Ulid),
    /// Ledger write failed. The whole reserve call is safe to retry:
    /// availability is re-validated on every attempt.
    LedgerError(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::LedgerError(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidDateRange { check_in, check_out } => {
                write!(f, "invalid date range: [{check_in}, {check_out})")
            }
            EngineError::PastCheckIn(check_in) => {
                write!(f, "check-in {check_in} is in the past")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::RoomUnavailable(id) => {
                write!(f, "room unavailable: conflicts with booking {id}")
            }
            EngineError::RaceLost(id) => {
                write!(f, "reservation lost race to booking {id}")
            }
            EngineError::LedgerError(e) => write!(f, "ledger error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
