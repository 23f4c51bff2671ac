use chrono::{DateTime, Utc};

use crate::model::*;

use super::availability::{available_rooms, find_conflict};
use super::conflict::validate_stay;
use super::{find, Engine, EngineError};

fn with_type(room: Room, room_types: &[RoomType]) -> RoomWithType {
    let room_type = room_types
        .iter()
        .find(|rt| rt.room_type_id == room.room_type_id)
        .cloned();
    RoomWithType { room, room_type }
}

impl Engine {
    pub async fn list_guests(&self) -> Result<Vec<Guest>, EngineError> {
        self.load().await
    }

    pub async fn get_guest(&self, id: Id) -> Result<Guest, EngineError> {
        find(self.load().await?, id)
    }

    /// Every room joined with its type; a dangling type reference joins as `None`.
    pub async fn list_rooms(&self) -> Result<Vec<RoomWithType>, EngineError> {
        let (rooms, room_types) = futures::try_join!(self.load::<Room>(), self.load::<RoomType>())?;
        Ok(rooms
            .into_iter()
            .map(|room| with_type(room, &room_types))
            .collect())
    }

    pub async fn get_room(&self, id: Id) -> Result<RoomWithType, EngineError> {
        let (rooms, room_types) = futures::try_join!(self.load::<Room>(), self.load::<RoomType>())?;
        Ok(with_type(find(rooms, id)?, &room_types))
    }

    pub async fn list_room_types(&self) -> Result<Vec<RoomType>, EngineError> {
        self.load().await
    }

    pub async fn get_room_type(&self, id: Id) -> Result<RoomType, EngineError> {
        find(self.load().await?, id)
    }

    pub async fn list_bookings(&self) -> Result<Vec<Booking>, EngineError> {
        self.load().await
    }

    pub async fn get_booking(&self, id: Id) -> Result<Booking, EngineError> {
        find(self.load().await?, id)
    }

    pub async fn list_payments(&self) -> Result<Vec<Payment>, EngineError> {
        self.load().await
    }

    pub async fn get_payment(&self, id: Id) -> Result<Payment, EngineError> {
        find(self.load().await?, id)
    }

    pub async fn list_users(&self) -> Result<Vec<UserInfo>, EngineError> {
        let users: Vec<User> = self.load().await?;
        Ok(users.iter().map(UserInfo::from).collect())
    }

    pub async fn get_user(&self, id: Id) -> Result<UserInfo, EngineError> {
        let user: User = find(self.load().await?, id)?;
        Ok(UserInfo::from(&user))
    }

    pub async fn room_availability(
        &self,
        room_id: Id,
        check_in: &DateTime<Utc>,
        check_out: &DateTime<Utc>,
    ) -> Result<RoomAvailability, EngineError> {
        validate_stay(check_in, check_out)?;
        let (rooms, bookings) = futures::try_join!(self.load::<Room>(), self.load::<Booking>())?;
        let room = find(rooms, room_id)?;
        let conflict = find_conflict(room.room_id, check_in, check_out, &bookings, None);
        Ok(RoomAvailability {
            room_id,
            available: conflict.is_none(),
            conflicting_booking_id: conflict.map(|b| b.booking_id),
        })
    }

    /// Rooms bookable for the whole stay, joined with their types.
    pub async fn find_available_rooms(
        &self,
        check_in: &DateTime<Utc>,
        check_out: &DateTime<Utc>,
    ) -> Result<Vec<RoomWithType>, EngineError> {
        validate_stay(check_in, check_out)?;
        let (rooms, room_types, bookings) = futures::try_join!(
            self.load::<Room>(),
            self.load::<RoomType>(),
            self.load::<Booking>()
        )?;
        Ok(available_rooms(check_in, check_out, &rooms, &bookings)
            .into_iter()
            .map(|room| with_type(room.clone(), &room_types))
            .collect())
    }
}
