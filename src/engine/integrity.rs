use crate::model::*;

pub fn validate_guest_exists(guest_id: Id, guests: &[Guest]) -> bool {
    guests.iter().any(|g| g.guest_id == guest_id)
}

pub fn validate_room_exists(room_id: Id, rooms: &[Room]) -> bool {
    rooms.iter().any(|r| r.room_id == room_id)
}

pub fn validate_room_type_exists(room_type_id: Id, room_types: &[RoomType]) -> bool {
    room_types.iter().any(|rt| rt.room_type_id == room_type_id)
}

pub fn validate_booking_exists(booking_id: Id, bookings: &[Booking]) -> bool {
    bookings.iter().any(|b| b.booking_id == booking_id)
}

/// `max(id) + 1`, or 1 for an empty collection. IDs are never reused while
/// the current maximum survives.
pub fn next_id<T>(items: &[T], id_of: impl Fn(&T) -> Id) -> Id {
    items.iter().map(id_of).max().unwrap_or(0) + 1
}

/// Index of the record with `id`, for in-place updates.
pub(crate) fn position<T: Record>(items: &[T], id: Id) -> Option<usize> {
    items.iter().position(|item| item.id() == id)
}
