//! Request payloads and their shape checks.
//!
//! Everything here is checked before the engine loads a collection; checks
//! that need stored records (references, uniqueness, overlaps) live in the
//! engine.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::engine::EngineError;
use crate::limits::*;
use crate::model::*;

pub trait Validate {
    fn validate(&self) -> Result<(), EngineError>;
}

fn text(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), EngineError> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(EngineError::validation(field, format!("{field} is required")));
    }
    if len < min {
        return Err(EngineError::validation(
            field,
            format!("{field} must be at least {min} characters"),
        ));
    }
    if value.chars().count() > max {
        return Err(EngineError::validation(field, format!("{field} is too long")));
    }
    Ok(())
}

fn optional<T>(value: &Option<T>, check: impl FnOnce(&T) -> Result<(), EngineError>) -> Result<(), EngineError> {
    match value {
        Some(v) => check(v),
        None => Ok(()),
    }
}

fn positive_id(field: &'static str, id: Id) -> Result<(), EngineError> {
    if id == 0 {
        return Err(EngineError::validation(field, format!("invalid {field}")));
    }
    Ok(())
}

fn positive_amount(field: &'static str, value: f64) -> Result<(), EngineError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(EngineError::validation(field, format!("{field} must be positive")));
    }
    Ok(())
}

/// Empty is allowed; anything else must look like `local@domain.tld`.
fn email(value: &str) -> Result<(), EngineError> {
    if value.is_empty() {
        return Ok(());
    }
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(EngineError::validation("email", "invalid email format"));
    }
    Ok(())
}

// ── Guests ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewGuest {
    pub full_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    pub address: String,
}

impl Validate for NewGuest {
    fn validate(&self) -> Result<(), EngineError> {
        text("full_name", &self.full_name, 1, MAX_FULL_NAME_LEN)?;
        email(&self.email)?;
        text("address", &self.address, 1, MAX_ADDRESS_LEN)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuestPatch {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl Validate for GuestPatch {
    fn validate(&self) -> Result<(), EngineError> {
        optional(&self.full_name, |v| text("full_name", v, 1, MAX_FULL_NAME_LEN))?;
        optional(&self.email, |v| email(v))?;
        optional(&self.address, |v| text("address", v, 1, MAX_ADDRESS_LEN))
    }
}

impl GuestPatch {
    pub fn apply(self, guest: &mut Guest) {
        if let Some(v) = self.full_name {
            guest.full_name = v;
        }
        if let Some(v) = self.phone {
            guest.phone = v;
        }
        if let Some(v) = self.email {
            guest.email = v;
        }
        if let Some(v) = self.address {
            guest.address = v;
        }
    }
}

// ── Rooms and room types ─────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoom {
    pub room_number: String,
    pub room_type_id: Id,
    pub status: Option<RoomStatus>,
}

impl Validate for NewRoom {
    fn validate(&self) -> Result<(), EngineError> {
        text("room_number", &self.room_number, 1, MAX_ROOM_NUMBER_LEN)?;
        positive_id("room_type_id", self.room_type_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomPatch {
    pub room_number: Option<String>,
    pub room_type_id: Option<Id>,
    pub status: Option<RoomStatus>,
}

impl Validate for RoomPatch {
    fn validate(&self) -> Result<(), EngineError> {
        optional(&self.room_number, |v| text("room_number", v, 1, MAX_ROOM_NUMBER_LEN))?;
        optional(&self.room_type_id, |&v| positive_id("room_type_id", v))
    }
}

impl RoomPatch {
    pub fn apply(self, room: &mut Room) {
        if let Some(v) = self.room_number {
            room.room_number = v;
        }
        if let Some(v) = self.room_type_id {
            room.room_type_id = v;
        }
        if let Some(v) = self.status {
            room.status = v;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoomType {
    pub type_name: String,
    pub price: f64,
}

impl Validate for NewRoomType {
    fn validate(&self) -> Result<(), EngineError> {
        text("type_name", &self.type_name, 1, MAX_TYPE_NAME_LEN)?;
        positive_amount("price", self.price)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomTypePatch {
    pub type_name: Option<String>,
    pub price: Option<f64>,
}

impl Validate for RoomTypePatch {
    fn validate(&self) -> Result<(), EngineError> {
        optional(&self.type_name, |v| text("type_name", v, 1, MAX_TYPE_NAME_LEN))?;
        optional(&self.price, |&v| positive_amount("price", v))
    }
}

impl RoomTypePatch {
    pub fn apply(self, room_type: &mut RoomType) {
        if let Some(v) = self.type_name {
            room_type.type_name = v;
        }
        if let Some(v) = self.price {
            room_type.price = v;
        }
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub guest_id: Id,
    pub room_id: Id,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub check_in_date: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub check_out_date: DateTime<Utc>,
    pub status: Option<BookingStatus>,
}

impl Validate for NewBooking {
    fn validate(&self) -> Result<(), EngineError> {
        positive_id("guest_id", self.guest_id)?;
        positive_id("room_id", self.room_id)?;
        crate::engine::validate_stay(&self.check_in_date, &self.check_out_date)
    }
}

/// Partial booking update. Date order is checked by the engine on the merged
/// range, since either end may come from the stored booking.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingPatch {
    pub guest_id: Option<Id>,
    pub room_id: Option<Id>,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub check_in_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub check_out_date: Option<DateTime<Utc>>,
    pub status: Option<BookingStatus>,
}

impl Validate for BookingPatch {
    fn validate(&self) -> Result<(), EngineError> {
        optional(&self.guest_id, |&v| positive_id("guest_id", v))?;
        optional(&self.room_id, |&v| positive_id("room_id", v))
    }
}

impl BookingPatch {
    /// The booking as it would look after the patch.
    pub fn merged(&self, current: &Booking) -> Booking {
        Booking {
            booking_id: current.booking_id,
            guest_id: self.guest_id.unwrap_or(current.guest_id),
            room_id: self.room_id.unwrap_or(current.room_id),
            check_in_date: self.check_in_date.unwrap_or(current.check_in_date),
            check_out_date: self.check_out_date.unwrap_or(current.check_out_date),
            status: self.status.unwrap_or(current.status),
        }
    }

    pub fn touches_stay(&self) -> bool {
        self.room_id.is_some() || self.check_in_date.is_some() || self.check_out_date.is_some()
    }
}

// ── Payments ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
    pub booking_id: Id,
    pub amount: f64,
    pub method: PaymentMethod,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub payment_date: DateTime<Utc>,
}

impl Validate for NewPayment {
    fn validate(&self) -> Result<(), EngineError> {
        positive_id("booking_id", self.booking_id)?;
        positive_amount("amount", self.amount)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentPatch {
    pub booking_id: Option<Id>,
    pub amount: Option<f64>,
    pub method: Option<PaymentMethod>,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub payment_date: Option<DateTime<Utc>>,
}

impl Validate for PaymentPatch {
    fn validate(&self) -> Result<(), EngineError> {
        optional(&self.booking_id, |&v| positive_id("booking_id", v))?;
        optional(&self.amount, |&v| positive_amount("amount", v))
    }
}

impl PaymentPatch {
    pub fn apply(self, payment: &mut Payment) {
        if let Some(v) = self.booking_id {
            payment.booking_id = v;
        }
        if let Some(v) = self.amount {
            payment.amount = v;
        }
        if let Some(v) = self.method {
            payment.method = v;
        }
        if let Some(v) = self.payment_date {
            payment.payment_date = v;
        }
    }
}

// ── Users ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl Validate for NewUser {
    fn validate(&self) -> Result<(), EngineError> {
        text("username", &self.username, MIN_USERNAME_LEN, MAX_USERNAME_LEN)?;
        password(&self.password)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
}

impl Validate for UserPatch {
    fn validate(&self) -> Result<(), EngineError> {
        optional(&self.username, |v| text("username", v, MIN_USERNAME_LEN, MAX_USERNAME_LEN))?;
        optional(&self.password, |v| password(v))
    }
}

fn password(value: &str) -> Result<(), EngineError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(EngineError::validation(
            "password",
            format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Validate for Credentials {
    fn validate(&self) -> Result<(), EngineError> {
        if self.username.is_empty() {
            return Err(EngineError::validation("username", "username is required"));
        }
        if self.password.is_empty() {
            return Err(EngineError::validation("password", "password is required"));
        }
        Ok(())
    }
}
