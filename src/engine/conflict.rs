use chrono::{DateTime, Utc};

use crate::limits::MAX_STAY_MS;
use crate::model::*;

use super::availability::find_conflict;
use super::EngineError;

pub(crate) fn validate_stay(check_in: &DateTime<Utc>, check_out: &DateTime<Utc>) -> Result<(), EngineError> {
    if check_in >= check_out {
        return Err(EngineError::validation(
            "check_out_date",
            "check-out date must be after check-in date",
        ));
    }
    if (*check_out - *check_in).num_milliseconds() > MAX_STAY_MS {
        return Err(EngineError::validation("check_out_date", "stay too long"));
    }
    Ok(())
}

pub(crate) fn check_no_conflict(
    room_id: Id,
    check_in: &DateTime<Utc>,
    check_out: &DateTime<Utc>,
    bookings: &[Booking],
    exclude: Option<Id>,
) -> Result<(), EngineError> {
    match find_conflict(room_id, check_in, check_out, bookings, exclude) {
        Some(existing) => {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            Err(EngineError::Conflict {
                room_id,
                booking_id: existing.booking_id,
            })
        }
        None => Ok(()),
    }
}
