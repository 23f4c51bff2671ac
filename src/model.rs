use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Primary key of every record. Assigned as `max(existing) + 1`.
pub type Id = u64;

/// The six collections the record store persists, one JSON file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    Guests,
    Rooms,
    RoomTypes,
    Bookings,
    Payments,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Guests,
        Collection::Rooms,
        Collection::RoomTypes,
        Collection::Bookings,
        Collection::Payments,
        Collection::Users,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Collection::Guests => "guests.json",
            Collection::Rooms => "rooms.json",
            Collection::RoomTypes => "room_types.json",
            Collection::Bookings => "bookings.json",
            Collection::Payments => "payments.json",
            Collection::Users => "users.json",
        }
    }

    /// Singular noun used in error messages ("Guest not found").
    pub fn entity(self) -> &'static str {
        match self {
            Collection::Guests => "Guest",
            Collection::Rooms => "Room",
            Collection::RoomTypes => "Room type",
            Collection::Bookings => "Booking",
            Collection::Payments => "Payment",
            Collection::Users => "User",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A row of one of the persisted collections.
pub trait Record: Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> Id;
}

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    pub guest_id: Id,
    pub full_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    pub address: String,
}

impl Record for Guest {
    const COLLECTION: Collection = Collection::Guests;

    fn id(&self) -> Id {
        self.guest_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Occupied,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: Id,
    pub room_number: String,
    pub room_type_id: Id,
    pub status: RoomStatus,
}

impl Record for Room {
    const COLLECTION: Collection = Collection::Rooms;

    fn id(&self) -> Id {
        self.room_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomType {
    pub room_type_id: Id,
    pub type_name: String,
    pub price: f64,
}

impl Record for RoomType {
    const COLLECTION: Collection = Collection::RoomTypes;

    fn id(&self) -> Id {
        self.room_type_id
    }
}

/// A room joined with its type, as the room listing returns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomWithType {
    #[serde(flatten)]
    pub room: Room,
    pub room_type: Option<RoomType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    CheckedIn,
    CheckedOut,
    Cancelled,
}

impl BookingStatus {
    /// Active bookings count against room availability.
    pub fn is_active(self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::CheckedIn)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: Id,
    pub guest_id: Id,
    pub room_id: Id,
    #[serde(with = "timestamp")]
    pub check_in_date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub check_out_date: DateTime<Utc>,
    pub status: BookingStatus,
}

impl Record for Booking {
    const COLLECTION: Collection = Collection::Bookings;

    fn id(&self) -> Id {
        self.booking_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    #[serde(rename = "Credit Card")]
    CreditCard,
    #[serde(rename = "Debit Card")]
    DebitCard,
    Online,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Id,
    pub booking_id: Id,
    pub amount: f64,
    pub method: PaymentMethod,
    #[serde(with = "timestamp")]
    pub payment_date: DateTime<Utc>,
}

impl Record for Payment {
    const COLLECTION: Collection = Collection::Payments;

    fn id(&self) -> Id {
        self.payment_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Receptionist,
    Manager,
}

/// Stored user row. `password` holds an argon2 PHC string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: Id,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub role: Role,
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> Id {
        self.user_id
    }
}

/// External representation of a user: never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: Id,
    pub username: String,
    pub role: Role,
}

impl From<&User> for UserInfo {
    fn from(u: &User) -> Self {
        Self {
            user_id: u.user_id,
            username: u.username.clone(),
            role: u.role,
        }
    }
}

// ── Operation results ────────────────────────────────────────────

/// What a cascade guest deletion removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuestRemoval {
    pub guest_id: Id,
    pub bookings_removed: usize,
    pub rooms_freed: Vec<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub room_id: Id,
    pub room_number: String,
    pub from: RoomStatus,
    pub to: RoomStatus,
}

/// Whether one room is free for a requested stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomAvailability {
    pub room_id: Id,
    pub available: bool,
    pub conflicting_booking_id: Option<Id>,
}

/// Outcome of a full room-status reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub occupied: usize,
    pub changes: Vec<StatusChange>,
}

/// ISO-8601 timestamps. Writes RFC 3339 with millisecond precision; reads
/// RFC 3339 and the minute-precision form `2024-01-10T14:00Z`.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid ISO-8601 timestamp: {raw}")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            return Some(t.with_timezone(&Utc));
        }
        let naive = raw.strip_suffix('Z')?;
        NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M")
            .ok()
            .map(|n| n.and_utc())
    }

    /// Same as the parent module, for `Option` fields in partial updates.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            match raw {
                None => Ok(None),
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid ISO-8601 timestamp: {raw}"))),
            }
        }
    }
}
