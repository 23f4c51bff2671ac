use std::collections::HashSet;

use tracing::{info, warn};

use crate::auth;
use crate::model::*;
use crate::store::Changeset;
use crate::validate::*;

use super::availability::{has_active_bookings, reconcile_statuses};
use super::conflict::{check_no_conflict, validate_stay};
use super::integrity::*;
use super::{not_found, Engine, EngineError};

fn reference<T: Record>(id: Id) -> EngineError {
    EngineError::Reference {
        collection: T::COLLECTION,
        id,
    }
}

fn admin_count(users: &[User]) -> usize {
    users.iter().filter(|u| u.role == Role::Admin).count()
}

impl Engine {
    // ── Guests ───────────────────────────────────────────────────

    pub async fn create_guest(&self, input: NewGuest) -> Result<Guest, EngineError> {
        input.validate()?;
        let _guard = self.lock().await;
        let mut guests: Vec<Guest> = self.load().await?;
        let guest = Guest {
            guest_id: next_id(&guests, |g| g.guest_id),
            full_name: input.full_name,
            phone: input.phone,
            email: input.email,
            address: input.address,
        };
        guests.push(guest.clone());
        self.save(&guests).await?;
        Ok(guest)
    }

    pub async fn update_guest(&self, id: Id, patch: GuestPatch) -> Result<Guest, EngineError> {
        patch.validate()?;
        let _guard = self.lock().await;
        let mut guests: Vec<Guest> = self.load().await?;
        let index = position(&guests, id).ok_or_else(|| not_found::<Guest>(id))?;
        patch.apply(&mut guests[index]);
        let updated = guests[index].clone();
        self.save(&guests).await?;
        Ok(updated)
    }

    /// Remove a guest together with all of their bookings, freeing the rooms
    /// held by the active ones. One commit; nothing is written when the guest
    /// does not exist.
    pub async fn delete_guest(&self, id: Id) -> Result<GuestRemoval, EngineError> {
        let _guard = self.lock().await;
        let mut guests: Vec<Guest> = self.load().await?;
        if !validate_guest_exists(id, &guests) {
            return Err(not_found::<Guest>(id));
        }
        let (mut bookings, mut rooms) = futures::try_join!(self.load::<Booking>(), self.load::<Room>())?;
        if has_active_bookings(id, &bookings) {
            warn!("guest {id} still has active bookings; removing them");
        }

        let active_rooms: HashSet<Id> = bookings
            .iter()
            .filter(|b| b.guest_id == id && b.status.is_active())
            .map(|b| b.room_id)
            .collect();
        let mut rooms_freed = Vec::new();
        for room in rooms.iter_mut().filter(|r| active_rooms.contains(&r.room_id)) {
            if room.status != RoomStatus::Available {
                room.status = RoomStatus::Available;
                rooms_freed.push(room.room_id);
            }
        }

        let before = bookings.len();
        bookings.retain(|b| b.guest_id != id);
        let bookings_removed = before - bookings.len();
        guests.retain(|g| g.guest_id != id);

        let mut changes = Changeset::new();
        if bookings_removed > 0 {
            changes.save(&bookings)?;
        }
        if !rooms_freed.is_empty() {
            changes.save(&rooms)?;
        }
        changes.save(&guests)?;
        self.commit(changes).await?;

        info!("deleted guest {id} with {bookings_removed} bookings, freed rooms {rooms_freed:?}");
        Ok(GuestRemoval {
            guest_id: id,
            bookings_removed,
            rooms_freed,
        })
    }

    // ── Room types ───────────────────────────────────────────────

    pub async fn create_room_type(&self, input: NewRoomType) -> Result<RoomType, EngineError> {
        input.validate()?;
        let _guard = self.lock().await;
        let mut room_types: Vec<RoomType> = self.load().await?;
        let room_type = RoomType {
            room_type_id: next_id(&room_types, |rt| rt.room_type_id),
            type_name: input.type_name,
            price: input.price,
        };
        room_types.push(room_type.clone());
        self.save(&room_types).await?;
        Ok(room_type)
    }

    pub async fn update_room_type(&self, id: Id, patch: RoomTypePatch) -> Result<RoomType, EngineError> {
        patch.validate()?;
        let _guard = self.lock().await;
        let mut room_types: Vec<RoomType> = self.load().await?;
        let index = position(&room_types, id).ok_or_else(|| not_found::<RoomType>(id))?;
        patch.apply(&mut room_types[index]);
        let updated = room_types[index].clone();
        self.save(&room_types).await?;
        Ok(updated)
    }

    /// Rejected while any room still has this type.
    pub async fn delete_room_type(&self, id: Id) -> Result<(), EngineError> {
        let _guard = self.lock().await;
        let (mut room_types, rooms) = futures::try_join!(self.load::<RoomType>(), self.load::<Room>())?;
        if !validate_room_type_exists(id, &room_types) {
            return Err(not_found::<RoomType>(id));
        }
        let dependents = rooms.iter().filter(|r| r.room_type_id == id).count();
        if dependents > 0 {
            return Err(EngineError::InUse {
                collection: Collection::RoomTypes,
                id,
                dependents,
            });
        }
        room_types.retain(|rt| rt.room_type_id != id);
        self.save(&room_types).await
    }

    // ── Rooms ────────────────────────────────────────────────────

    pub async fn create_room(&self, input: NewRoom) -> Result<Room, EngineError> {
        input.validate()?;
        let _guard = self.lock().await;
        let (mut rooms, room_types) = futures::try_join!(self.load::<Room>(), self.load::<RoomType>())?;
        if !validate_room_type_exists(input.room_type_id, &room_types) {
            return Err(reference::<RoomType>(input.room_type_id));
        }
        if rooms.iter().any(|r| r.room_number == input.room_number) {
            return Err(EngineError::Duplicate {
                field: "room_number",
                value: input.room_number,
            });
        }
        let room = Room {
            room_id: next_id(&rooms, |r| r.room_id),
            room_number: input.room_number,
            room_type_id: input.room_type_id,
            status: input.status.unwrap_or(RoomStatus::Available),
        };
        rooms.push(room.clone());
        self.save(&rooms).await?;
        Ok(room)
    }

    pub async fn update_room(&self, id: Id, patch: RoomPatch) -> Result<Room, EngineError> {
        patch.validate()?;
        let _guard = self.lock().await;
        let mut rooms: Vec<Room> = self.load().await?;
        let index = position(&rooms, id).ok_or_else(|| not_found::<Room>(id))?;

        if let Some(type_id) = patch.room_type_id {
            let room_types: Vec<RoomType> = self.load().await?;
            if !validate_room_type_exists(type_id, &room_types) {
                return Err(reference::<RoomType>(type_id));
            }
        }
        if let Some(number) = &patch.room_number
            && rooms.iter().any(|r| r.room_id != id && &r.room_number == number)
        {
            return Err(EngineError::Duplicate {
                field: "room_number",
                value: number.clone(),
            });
        }

        patch.apply(&mut rooms[index]);
        let updated = rooms[index].clone();
        self.save(&rooms).await?;
        Ok(updated)
    }

    /// Rejected while an active booking still holds the room.
    pub async fn delete_room(&self, id: Id) -> Result<(), EngineError> {
        let _guard = self.lock().await;
        let (mut rooms, bookings) = futures::try_join!(self.load::<Room>(), self.load::<Booking>())?;
        if !validate_room_exists(id, &rooms) {
            return Err(not_found::<Room>(id));
        }
        let dependents = bookings
            .iter()
            .filter(|b| b.room_id == id && b.status.is_active())
            .count();
        if dependents > 0 {
            return Err(EngineError::InUse {
                collection: Collection::Rooms,
                id,
                dependents,
            });
        }
        rooms.retain(|r| r.room_id != id);
        self.save(&rooms).await
    }

    // ── Bookings ─────────────────────────────────────────────────

    /// Book a room. The guest and room must exist and no active booking on the
    /// room may overlap the stay. The room is marked Occupied in the same commit.
    pub async fn create_booking(&self, input: NewBooking) -> Result<Booking, EngineError> {
        input.validate()?;
        let _guard = self.lock().await;
        let (guests, mut rooms, mut bookings) = futures::try_join!(
            self.load::<Guest>(),
            self.load::<Room>(),
            self.load::<Booking>()
        )?;

        if !validate_guest_exists(input.guest_id, &guests) {
            return Err(reference::<Guest>(input.guest_id));
        }
        let room_index = position(&rooms, input.room_id).ok_or_else(|| reference::<Room>(input.room_id))?;
        check_no_conflict(
            input.room_id,
            &input.check_in_date,
            &input.check_out_date,
            &bookings,
            None,
        )?;

        let booking = Booking {
            booking_id: next_id(&bookings, |b| b.booking_id),
            guest_id: input.guest_id,
            room_id: input.room_id,
            check_in_date: input.check_in_date,
            check_out_date: input.check_out_date,
            status: input.status.unwrap_or(BookingStatus::Confirmed),
        };
        bookings.push(booking.clone());

        let mut changes = Changeset::new();
        changes.save(&bookings)?;
        if rooms[room_index].status != RoomStatus::Occupied {
            rooms[room_index].status = RoomStatus::Occupied;
            changes.save(&rooms)?;
        }
        self.commit(changes).await?;

        info!(
            "booking {} room {} {} -> {}",
            booking.booking_id, booking.room_id, booking.check_in_date, booking.check_out_date
        );
        Ok(booking)
    }

    /// Partial update. The availability scan runs on the merged booking, with
    /// the booking itself excluded, whenever the room or dates change or the
    /// update makes an inactive booking active again.
    pub async fn update_booking(&self, id: Id, patch: BookingPatch) -> Result<Booking, EngineError> {
        patch.validate()?;
        let _guard = self.lock().await;
        let mut bookings: Vec<Booking> = self.load().await?;
        let index = position(&bookings, id).ok_or_else(|| not_found::<Booking>(id))?;
        let current = &bookings[index];
        let merged = patch.merged(current);

        if let Some(guest_id) = patch.guest_id {
            let guests: Vec<Guest> = self.load().await?;
            if !validate_guest_exists(guest_id, &guests) {
                return Err(reference::<Guest>(guest_id));
            }
        }

        let reactivated = !current.status.is_active() && merged.status.is_active();
        if patch.touches_stay() || reactivated {
            let rooms: Vec<Room> = self.load().await?;
            if !validate_room_exists(merged.room_id, &rooms) {
                return Err(reference::<Room>(merged.room_id));
            }
            validate_stay(&merged.check_in_date, &merged.check_out_date)?;
            if merged.status.is_active() {
                check_no_conflict(
                    merged.room_id,
                    &merged.check_in_date,
                    &merged.check_out_date,
                    &bookings,
                    Some(id),
                )?;
            }
        }

        bookings[index] = merged.clone();
        self.save(&bookings).await?;
        Ok(merged)
    }

    /// Hard delete. Room status is left to reconciliation.
    pub async fn delete_booking(&self, id: Id) -> Result<(), EngineError> {
        let _guard = self.lock().await;
        let mut bookings: Vec<Booking> = self.load().await?;
        if !validate_booking_exists(id, &bookings) {
            return Err(not_found::<Booking>(id));
        }
        bookings.retain(|b| b.booking_id != id);
        self.save(&bookings).await
    }

    // ── Payments ─────────────────────────────────────────────────

    pub async fn create_payment(&self, input: NewPayment) -> Result<Payment, EngineError> {
        input.validate()?;
        let _guard = self.lock().await;
        let (bookings, mut payments) = futures::try_join!(self.load::<Booking>(), self.load::<Payment>())?;
        if !validate_booking_exists(input.booking_id, &bookings) {
            return Err(reference::<Booking>(input.booking_id));
        }
        let payment = Payment {
            payment_id: next_id(&payments, |p| p.payment_id),
            booking_id: input.booking_id,
            amount: input.amount,
            method: input.method,
            payment_date: input.payment_date,
        };
        payments.push(payment.clone());
        self.save(&payments).await?;
        Ok(payment)
    }

    pub async fn update_payment(&self, id: Id, patch: PaymentPatch) -> Result<Payment, EngineError> {
        patch.validate()?;
        let _guard = self.lock().await;
        let mut payments: Vec<Payment> = self.load().await?;
        let index = position(&payments, id).ok_or_else(|| not_found::<Payment>(id))?;
        if let Some(booking_id) = patch.booking_id {
            let bookings: Vec<Booking> = self.load().await?;
            if !validate_booking_exists(booking_id, &bookings) {
                return Err(reference::<Booking>(booking_id));
            }
        }
        patch.apply(&mut payments[index]);
        let updated = payments[index].clone();
        self.save(&payments).await?;
        Ok(updated)
    }

    pub async fn delete_payment(&self, id: Id) -> Result<(), EngineError> {
        let _guard = self.lock().await;
        let mut payments: Vec<Payment> = self.load().await?;
        if position(&payments, id).is_none() {
            return Err(not_found::<Payment>(id));
        }
        payments.retain(|p| p.payment_id != id);
        self.save(&payments).await
    }

    // ── Users ────────────────────────────────────────────────────

    pub async fn register_user(&self, input: NewUser) -> Result<UserInfo, EngineError> {
        input.validate()?;
        let hash = auth::hash_password(&input.password)?;
        let _guard = self.lock().await;
        let users: Vec<User> = self.load().await?;
        self.insert_user(users, input, hash).await
    }

    /// Append a user to the loaded `users`. Caller holds the write lock.
    async fn insert_user(&self, mut users: Vec<User>, input: NewUser, hash: String) -> Result<UserInfo, EngineError> {
        if users.iter().any(|u| u.username == input.username) {
            return Err(EngineError::Duplicate {
                field: "username",
                value: input.username,
            });
        }
        let user = User {
            user_id: next_id(&users, |u| u.user_id),
            username: input.username,
            password: hash,
            role: input.role,
        };
        users.push(user.clone());
        self.save(&users).await?;
        info!("registered user {} as {:?}", user.username, user.role);
        Ok(UserInfo::from(&user))
    }

    pub async fn update_user(&self, id: Id, patch: UserPatch) -> Result<UserInfo, EngineError> {
        patch.validate()?;
        let hash = patch.password.as_deref().map(auth::hash_password).transpose()?;
        let _guard = self.lock().await;
        let mut users: Vec<User> = self.load().await?;
        let index = position(&users, id).ok_or_else(|| not_found::<User>(id))?;

        if let Some(username) = &patch.username
            && users.iter().any(|u| u.user_id != id && &u.username == username)
        {
            return Err(EngineError::Duplicate {
                field: "username",
                value: username.clone(),
            });
        }
        let demoted = users[index].role == Role::Admin && patch.role.is_some_and(|r| r != Role::Admin);
        if demoted && admin_count(&users) <= 1 {
            return Err(EngineError::LastAdmin);
        }

        let user = &mut users[index];
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(hash) = hash {
            user.password = hash;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        let info = UserInfo::from(&*user);
        self.save(&users).await?;
        Ok(info)
    }

    pub async fn delete_user(&self, id: Id) -> Result<(), EngineError> {
        let _guard = self.lock().await;
        let mut users: Vec<User> = self.load().await?;
        let index = position(&users, id).ok_or_else(|| not_found::<User>(id))?;
        if users[index].role == Role::Admin && admin_count(&users) <= 1 {
            return Err(EngineError::LastAdmin);
        }
        users.remove(index);
        self.save(&users).await
    }

    /// The user whose name and password match. Unknown names and wrong
    /// passwords fail identically.
    pub async fn login(&self, credentials: Credentials) -> Result<UserInfo, EngineError> {
        credentials.validate()?;
        let users: Vec<User> = self.load().await?;
        let user = users.iter().find(|u| u.username == credentials.username);
        match user {
            Some(user) if auth::verify_password(&credentials.password, &user.password) => {
                Ok(UserInfo::from(user))
            }
            _ => {
                metrics::counter!(crate::observability::LOGIN_FAILURES_TOTAL).increment(1);
                warn!("failed login for {}", credentials.username);
                Err(EngineError::InvalidCredentials)
            }
        }
    }

    /// Create an Admin when none exists. Returns `None` if one already does.
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> Result<Option<UserInfo>, EngineError> {
        let input = NewUser {
            username: username.to_string(),
            password: password.to_string(),
            role: Role::Admin,
        };
        input.validate()?;
        let hash = auth::hash_password(&input.password)?;
        let _guard = self.lock().await;
        let users: Vec<User> = self.load().await?;
        if admin_count(&users) > 0 {
            return Ok(None);
        }
        self.insert_user(users, input, hash).await.map(Some)
    }

    // ── Maintenance ──────────────────────────────────────────────

    /// Set every room with a CheckedIn booking Occupied and every other room
    /// Available. Writes only when some status changed.
    pub async fn reconcile_room_statuses(&self) -> Result<ReconcileReport, EngineError> {
        let _guard = self.lock().await;
        let (mut rooms, bookings) = futures::try_join!(self.load::<Room>(), self.load::<Booking>())?;
        let (occupied, changes) = reconcile_statuses(&rooms, &bookings);
        if changes.is_empty() {
            return Ok(ReconcileReport { occupied, changes });
        }

        for change in &changes {
            if let Some(index) = position(&rooms, change.room_id) {
                rooms[index].status = change.to;
            }
            info!(
                "room {} ({}): {:?} -> {:?}",
                change.room_number, change.room_id, change.from, change.to
            );
        }
        self.save(&rooms).await?;
        metrics::counter!(crate::observability::ROOMS_RECONCILED_TOTAL).increment(changes.len() as u64);
        Ok(ReconcileReport { occupied, changes })
    }

    /// Snapshot every collection into backup storage.
    pub async fn backup(&self) -> Result<Vec<String>, EngineError> {
        let _guard = self.lock().await;
        let written = self.store.backup().await?;
        info!("backed up {} collections", written.len());
        Ok(written)
    }
}
