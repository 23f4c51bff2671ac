//! Request routing: method + path to a [`Route`].

use chrono::{DateTime, Utc};
use hyper::Method;
use serde::Deserialize;

use crate::engine::EngineError;
use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    ListGuests,
    CreateGuest,
    GetGuest(Id),
    UpdateGuest(Id),
    DeleteGuest(Id),
    ListRooms,
    CreateRoom,
    GetRoom(Id),
    UpdateRoom(Id),
    DeleteRoom(Id),
    /// `GET /api/rooms/{id}/availability?check_in=..&check_out=..`
    RoomAvailability(Id),
    /// `GET /api/rooms/available?check_in=..&check_out=..`
    AvailableRooms,
    ListRoomTypes,
    CreateRoomType,
    GetRoomType(Id),
    UpdateRoomType(Id),
    DeleteRoomType(Id),
    ListBookings,
    CreateBooking,
    GetBooking(Id),
    UpdateBooking(Id),
    DeleteBooking(Id),
    ListPayments,
    CreatePayment,
    GetPayment(Id),
    UpdatePayment(Id),
    DeletePayment(Id),
    ListUsers,
    CreateUser,
    GetUser(Id),
    UpdateUser(Id),
    DeleteUser(Id),
    Login,
    Register,
    WhoAmI,
    Reconcile,
    Backup,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RouteError {
    NotFound,
    /// The path exists but not for this method.
    MethodNotAllowed,
    /// A `{id}` segment that is not a positive integer.
    BadId(String),
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::NotFound => write!(f, "Not found"),
            RouteError::MethodNotAllowed => write!(f, "Method not allowed"),
            RouteError::BadId(raw) => write!(f, "invalid id: {raw}"),
        }
    }
}

impl std::error::Error for RouteError {}

/// The collection routes that share list/create/get/update/delete shapes.
#[derive(Clone, Copy)]
enum Resource {
    Guests,
    Rooms,
    RoomTypes,
    Bookings,
    Payments,
    Users,
}

impl Resource {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "guests" => Some(Resource::Guests),
            "rooms" => Some(Resource::Rooms),
            "room-types" | "room_types" => Some(Resource::RoomTypes),
            "bookings" => Some(Resource::Bookings),
            "payments" => Some(Resource::Payments),
            "users" => Some(Resource::Users),
            _ => None,
        }
    }

    fn collection_route(self, method: &Method) -> Option<Route> {
        let route = match (self, method) {
            (Resource::Guests, &Method::GET) => Route::ListGuests,
            (Resource::Guests, &Method::POST) => Route::CreateGuest,
            (Resource::Rooms, &Method::GET) => Route::ListRooms,
            (Resource::Rooms, &Method::POST) => Route::CreateRoom,
            (Resource::RoomTypes, &Method::GET) => Route::ListRoomTypes,
            (Resource::RoomTypes, &Method::POST) => Route::CreateRoomType,
            (Resource::Bookings, &Method::GET) => Route::ListBookings,
            (Resource::Bookings, &Method::POST) => Route::CreateBooking,
            (Resource::Payments, &Method::GET) => Route::ListPayments,
            (Resource::Payments, &Method::POST) => Route::CreatePayment,
            (Resource::Users, &Method::GET) => Route::ListUsers,
            (Resource::Users, &Method::POST) => Route::CreateUser,
            _ => return None,
        };
        Some(route)
    }

    fn item_route(self, method: &Method, id: Id) -> Option<Route> {
        let route = match (self, method) {
            (Resource::Guests, &Method::GET) => Route::GetGuest(id),
            (Resource::Guests, &Method::PUT) => Route::UpdateGuest(id),
            (Resource::Guests, &Method::DELETE) => Route::DeleteGuest(id),
            (Resource::Rooms, &Method::GET) => Route::GetRoom(id),
            (Resource::Rooms, &Method::PUT) => Route::UpdateRoom(id),
            (Resource::Rooms, &Method::DELETE) => Route::DeleteRoom(id),
            (Resource::RoomTypes, &Method::GET) => Route::GetRoomType(id),
            (Resource::RoomTypes, &Method::PUT) => Route::UpdateRoomType(id),
            (Resource::RoomTypes, &Method::DELETE) => Route::DeleteRoomType(id),
            (Resource::Bookings, &Method::GET) => Route::GetBooking(id),
            (Resource::Bookings, &Method::PUT) => Route::UpdateBooking(id),
            (Resource::Bookings, &Method::DELETE) => Route::DeleteBooking(id),
            (Resource::Payments, &Method::GET) => Route::GetPayment(id),
            (Resource::Payments, &Method::PUT) => Route::UpdatePayment(id),
            (Resource::Payments, &Method::DELETE) => Route::DeletePayment(id),
            (Resource::Users, &Method::GET) => Route::GetUser(id),
            (Resource::Users, &Method::PUT) => Route::UpdateUser(id),
            (Resource::Users, &Method::DELETE) => Route::DeleteUser(id),
            _ => return None,
        };
        Some(route)
    }
}

fn parse_id(raw: &str) -> Result<Id, RouteError> {
    match raw.parse::<Id>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(RouteError::BadId(raw.to_string())),
    }
}

fn only(method: &Method, allowed: Method, route: Route) -> Result<Route, RouteError> {
    if *method == allowed {
        Ok(route)
    } else {
        Err(RouteError::MethodNotAllowed)
    }
}

pub fn parse_route(method: &Method, path: &str) -> Result<Route, RouteError> {
    let path = path.trim_end_matches('/');
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let ["api", rest @ ..] = segments.as_slice() else {
        return Err(RouteError::NotFound);
    };

    match rest {
        ["auth", "login"] => only(method, Method::POST, Route::Login),
        ["auth", "register"] => only(method, Method::POST, Route::Register),
        ["auth", "me"] => only(method, Method::GET, Route::WhoAmI),
        ["maintenance", "reconcile"] => only(method, Method::POST, Route::Reconcile),
        ["maintenance", "backup"] => only(method, Method::POST, Route::Backup),
        ["rooms", "available"] => only(method, Method::GET, Route::AvailableRooms),
        ["rooms", id, "availability"] => {
            let id = parse_id(id)?;
            only(method, Method::GET, Route::RoomAvailability(id))
        }
        [segment] => {
            let resource = Resource::from_segment(segment).ok_or(RouteError::NotFound)?;
            resource
                .collection_route(method)
                .ok_or(RouteError::MethodNotAllowed)
        }
        [segment, id] => {
            let resource = Resource::from_segment(segment).ok_or(RouteError::NotFound)?;
            let id = parse_id(id)?;
            resource
                .item_route(method, id)
                .ok_or(RouteError::MethodNotAllowed)
        }
        _ => Err(RouteError::NotFound),
    }
}

/// `check_in` / `check_out` of an availability query.
#[derive(Debug, Deserialize)]
pub struct StayQuery {
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub check_in: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub check_out: DateTime<Utc>,
}

pub fn parse_stay_query(query: Option<&str>) -> Result<StayQuery, EngineError> {
    serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| EngineError::validation("query", e.to_string()))
}
