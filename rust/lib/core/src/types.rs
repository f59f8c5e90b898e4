use chrono::{DateTime, Utc};

/// Wall-clock timestamp used for health bookkeeping.
pub type Timestamp = DateTime<Utc>;

/// Get the current time.
pub fn now() -> Timestamp {
    Utc::now()
}
