use chrono::{DateTime, Utc};

use crate::model::*;

/// Half-open range intersection: `[a_start, a_end)` and `[b_start, b_end)` share
/// at least one instant. A checkout equal to the next check-in is not an overlap.
pub fn overlaps<T: PartialOrd>(a_start: &T, a_end: &T, b_start: &T, b_end: &T) -> bool {
    a_start < b_end && b_start < a_end
}

/// First active booking on `room_id` whose stay overlaps `[check_in, check_out)`.
/// `exclude` skips the booking being updated so it never conflicts with itself.
pub fn find_conflict<'a>(
    room_id: Id,
    check_in: &DateTime<Utc>,
    check_out: &DateTime<Utc>,
    bookings: &'a [Booking],
    exclude: Option<Id>,
) -> Option<&'a Booking> {
    bookings
        .iter()
        .filter(|b| b.room_id == room_id)
        .filter(|b| b.status.is_active())
        .filter(|b| exclude != Some(b.booking_id))
        .find(|b| overlaps(check_in, check_out, &b.check_in_date, &b.check_out_date))
}

pub fn is_room_available(
    room_id: Id,
    check_in: &DateTime<Utc>,
    check_out: &DateTime<Utc>,
    bookings: &[Booking],
    exclude: Option<Id>,
) -> bool {
    find_conflict(room_id, check_in, check_out, bookings, exclude).is_none()
}

/// True iff any of the guest's bookings is Confirmed or CheckedIn.
pub fn has_active_bookings(guest_id: Id, bookings: &[Booking]) -> bool {
    bookings
        .iter()
        .any(|b| b.guest_id == guest_id && b.status.is_active())
}

/// Rooms bookable for the whole stay. Rooms under maintenance are never offered.
pub fn available_rooms<'a>(
    check_in: &DateTime<Utc>,
    check_out: &DateTime<Utc>,
    rooms: &'a [Room],
    bookings: &[Booking],
) -> Vec<&'a Room> {
    rooms
        .iter()
        .filter(|r| r.status != RoomStatus::Maintenance)
        .filter(|r| is_room_available(r.room_id, check_in, check_out, bookings, None))
        .collect()
}

/// Status every room should have according to the booking set: Occupied iff some
/// booking on it is CheckedIn, Available otherwise. Returns only rooms that differ.
pub fn reconcile_statuses(rooms: &[Room], bookings: &[Booking]) -> (usize, Vec<StatusChange>) {
    let occupied: std::collections::HashSet<Id> = bookings
        .iter()
        .filter(|b| b.status == BookingStatus::CheckedIn)
        .map(|b| b.room_id)
        .collect();

    let changes = rooms
        .iter()
        .filter_map(|room| {
            let target = if occupied.contains(&room.room_id) {
                RoomStatus::Occupied
            } else {
                RoomStatus::Available
            };
            (room.status != target).then(|| StatusChange {
                room_id: room.room_id,
                room_number: room.room_number.clone(),
                from: room.status,
                to: target,
            })
        })
        .collect();

    (occupied.len(), changes)
}
