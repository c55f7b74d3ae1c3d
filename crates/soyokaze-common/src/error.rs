use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// The database could not be opened or configured. Callers treat this as
    /// fatal and must not continue against the store.
    #[error("database initialization failed: {0}")]
    Initialization(String),

    #[error("database error: {0}")]
    Database(String),

    /// A single migration failed. Its transaction has been rolled back and no
    /// later migration was attempted.
    #[error("migration {version} ({name}) failed: {reason}")]
    Migration {
        version: u32,
        name: String,
        reason: String,
    },

    #[error("invalid migration registry: {0}")]
    InvalidRegistry(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error must abort application startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Initialization(_) | Error::Migration { .. } | Error::InvalidRegistry(_)
        )
    }
}
