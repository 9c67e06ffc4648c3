use time::OffsetDateTime;

use crate::Id;

/// Key of the record holding the data of session `id`.
pub fn session_key(prefix: &str, id: &Id) -> String {
    format!("{prefix}{id}")
}

/// Key of the list holding the session ids of `user_id`.
pub fn device_key(prefix: &str, user_id: &str) -> String {
    format!("{prefix}{user_id}")
}

/// Seconds from `now` until `expires`, rounded up and never negative.
pub fn ttl_from_expiry(expires: OffsetDateTime, now: OffsetDateTime) -> u64 {
    let millis = (expires - now).whole_milliseconds();
    if millis <= 0 {
        return 0;
    }

    ((millis + 999) / 1000) as u64
}
