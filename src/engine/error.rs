use crate::model::{Collection, Id};

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or missing input field.
    Validation { field: &'static str, reason: String },
    /// Foreign key points at a record that does not exist.
    Reference { collection: Collection, id: Id },
    /// Requested stay overlaps an active booking on the same room.
    Conflict { room_id: Id, booking_id: Id },
    NotFound { collection: Collection, id: Id },
    /// Unique field already taken.
    Duplicate { field: &'static str, value: String },
    /// Delete blocked by records still pointing at the target.
    InUse { collection: Collection, id: Id, dependents: usize },
    LastAdmin,
    InvalidCredentials,
    /// The change is committed but some of its files are not in place yet.
    Unpublished(String),
    Storage(String),
}

impl EngineError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation { field, reason } => write!(f, "invalid {field}: {reason}"),
            EngineError::Reference { collection, .. } => {
                write!(f, "{} not found", collection.entity())
            }
            EngineError::Conflict { room_id, booking_id } => write!(
                f,
                "Room {room_id} is not available for the selected dates (conflicts with booking {booking_id})"
            ),
            EngineError::NotFound { collection, id } => {
                write!(f, "{} not found (ID: {id})", collection.entity())
            }
            EngineError::Duplicate { field, value } => write!(f, "{field} '{value}' already exists"),
            EngineError::InUse {
                collection,
                id,
                dependents,
            } => write!(
                f,
                "cannot delete {} {id}: still referenced by {dependents} record(s)",
                collection.entity().to_lowercase()
            ),
            EngineError::LastAdmin => write!(f, "cannot remove the last admin user"),
            EngineError::InvalidCredentials => write!(f, "invalid credentials"),
            EngineError::Unpublished(e) => write!(f, "change saved but not yet visible: {e}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}
