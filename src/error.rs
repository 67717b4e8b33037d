//! Error taxonomy shared by the store and every query in the crate.

use rusqlite::ErrorCode;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("cannot move project {project} under {parent}: it would create a cycle")]
    Cycle { project: Uuid, parent: Uuid },

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("store did not respond in time: {0}")]
    StoreTimeout(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("project {0} was modified concurrently, reload and retry")]
    Conflict(Uuid),

    #[error("store error: {0}")]
    Store(#[source] rusqlite::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Self::StoreTimeout(e.to_string())
            }
            _ => Self::Store(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_errors_map_to_store_timeout() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        assert!(matches!(Error::from(busy), Error::StoreTimeout(_)));
    }

    #[test]
    fn other_sqlite_errors_stay_store_errors() {
        let err = Error::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn not_found_message_names_entity_and_key() {
        let err = Error::not_found("project", "ecookbook");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "project not found: ecookbook");
    }
}
