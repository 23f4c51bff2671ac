pub const MAX_FULL_NAME_LEN: usize = 100;
pub const MAX_ADDRESS_LEN: usize = 200;
pub const MAX_TYPE_NAME_LEN: usize = 50;
pub const MAX_ROOM_NUMBER_LEN: usize = 20;
pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 50;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Requests with larger bodies are rejected before parsing.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Longest stay accepted by booking validation (one year).
pub const MAX_STAY_MS: i64 = 366 * 24 * 3_600_000;
