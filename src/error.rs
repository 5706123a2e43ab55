use serde_json::json;

/// Failure kinds surfaced by every core operation.
///
/// Handlers map each variant onto a stable wire code via [`CoreError::code`].
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    DuplicateRecord(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::DuplicateRecord(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DuplicateRecord(_) => "duplicate_record",
            Self::InvalidState(_) => "invalid_state",
            Self::Validation(_) => "bad_params",
            Self::Store(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            _ => None,
        }
    }
}

/// True when SQLite rejected a write because of a UNIQUE or PRIMARY KEY index.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, _) => {
            f.code == rusqlite::ErrorCode::ConstraintViolation
                && (f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Translate a unique-index failure into `DuplicateRecord`, passing anything else through.
pub fn map_unique(e: rusqlite::Error, message: impl Into<String>) -> CoreError {
    if is_unique_violation(&e) {
        CoreError::DuplicateRecord(message.into())
    } else {
        CoreError::Store(e)
    }
}
