use std::net::SocketAddr;

use crate::api::Route;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests served. Labels: route, status.
pub const REQUESTS_TOTAL: &str = "frontdesk_requests_total";

/// Histogram: request latency in seconds. Labels: route.
pub const REQUEST_DURATION_SECONDS: &str = "frontdesk_request_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "frontdesk_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "frontdesk_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "frontdesk_connections_rejected_total";

/// Counter: store commits. Labels: status.
pub const COMMITS_TOTAL: &str = "frontdesk_commits_total";

/// Histogram: store commit duration in seconds.
pub const COMMIT_DURATION_SECONDS: &str = "frontdesk_commit_duration_seconds";

/// Histogram: collections written per commit.
pub const COMMIT_COLLECTIONS: &str = "frontdesk_commit_collections";

// ── Domain ──────────────────────────────────────────────────────

/// Counter: booking requests rejected for overlapping an active booking.
pub const BOOKING_CONFLICTS_TOTAL: &str = "frontdesk_booking_conflicts_total";

/// Counter: failed logins.
pub const LOGIN_FAILURES_TOTAL: &str = "frontdesk_login_failures_total";

/// Counter: room statuses rewritten by reconciliation.
pub const ROOMS_RECONCILED_TOTAL: &str = "frontdesk_rooms_reconciled_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a route to a short label for metrics.
pub fn route_label(route: &Route) -> &'static str {
    match route {
        Route::ListGuests => "list_guests",
        Route::CreateGuest => "create_guest",
        Route::GetGuest(_) => "get_guest",
        Route::UpdateGuest(_) => "update_guest",
        Route::DeleteGuest(_) => "delete_guest",
        Route::ListRooms => "list_rooms",
        Route::CreateRoom => "create_room",
        Route::GetRoom(_) => "get_room",
        Route::UpdateRoom(_) => "update_room",
        Route::DeleteRoom(_) => "delete_room",
        Route::RoomAvailability(_) => "room_availability",
        Route::AvailableRooms => "available_rooms",
        Route::ListRoomTypes => "list_room_types",
        Route::CreateRoomType => "create_room_type",
        Route::GetRoomType(_) => "get_room_type",
        Route::UpdateRoomType(_) => "update_room_type",
        Route::DeleteRoomType(_) => "delete_room_type",
        Route::ListBookings => "list_bookings",
        Route::CreateBooking => "create_booking",
        Route::GetBooking(_) => "get_booking",
        Route::UpdateBooking(_) => "update_booking",
        Route::DeleteBooking(_) => "delete_booking",
        Route::ListPayments => "list_payments",
        Route::CreatePayment => "create_payment",
        Route::GetPayment(_) => "get_payment",
        Route::UpdatePayment(_) => "update_payment",
        Route::DeletePayment(_) => "delete_payment",
        Route::ListUsers => "list_users",
        Route::CreateUser => "create_user",
        Route::GetUser(_) => "get_user",
        Route::UpdateUser(_) => "update_user",
        Route::DeleteUser(_) => "delete_user",
        Route::Login => "login",
        Route::Register => "register",
        Route::WhoAmI => "whoami",
        Route::Reconcile => "reconcile",
        Route::Backup => "backup",
    }
}
