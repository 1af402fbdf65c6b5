//! Error types for the sync server.

use serde::Serialize;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("sync counter error: {0}")]
    SyncCount(#[from] SyncCountError),
}

/// Configuration-related errors, surfaced at process startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage Gateway errors, classified from the underlying driver.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("duplicate key on column {column}")]
    DuplicateKey { column: String },

    #[error("deadlock detected, retry the transaction")]
    Deadlock,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("statement syntax error: {0}")]
    Syntax(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("other storage error: {0}")]
    Other(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("pool build error: {0}")]
    PoolBuild(#[from] deadpool_postgres::BuildError),

    #[error("pool runtime error: {0}")]
    PoolRuntime(#[from] deadpool_postgres::PoolError),
}

impl DatabaseError {
    /// Classify a raw `tokio_postgres::Error` by its SQLSTATE code, mapping
    /// the well-known classes into a small taxonomy. Falls back to `Other`
    /// for anything not specifically handled.
    pub fn classify(err: tokio_postgres::Error) -> Self {
        let Some(db_err) = err.as_db_error() else {
            return Self::Connection(err.to_string());
        };

        match db_err.code().code() {
            "23505" => {
                let column = db_err
                    .constraint()
                    .map(constraint_to_column)
                    .unwrap_or("unknown")
                    .to_string();
                Self::DuplicateKey { column }
            }
            "40P01" | "40001" => Self::Deadlock,
            code if code.starts_with("08") => Self::Connection(db_err.message().to_string()),
            code if code.starts_with("42") => Self::Syntax(db_err.message().to_string()),
            _ => Self::Other(db_err.message().to_string()),
        }
    }
}

/// Maps a Postgres constraint name to the column it enforces uniqueness on.
///
/// Kept as a fixed table rather than parsing the constraint name, since the
/// migration files are the only source of truth for constraint naming.
fn constraint_to_column(constraint: &str) -> &'static str {
    match constraint {
        "users_email_key" => "email",
        "clients_uuid_key" => "uuid",
        _ => "unknown",
    }
}

/// Credential Store errors.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("email is not unique")]
    EmailNotUnique,

    #[error("client UUID is not unique")]
    ClientUuidNotUnique,

    #[error("authentication failed")]
    AuthFail,

    #[error("password does not meet the minimum length")]
    PasswordTooShort,

    #[error("invalid email address")]
    InvalidEmail,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Request Envelope / protocol-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("invalid application key")]
    InvalidKey,

    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("unknown object class: {0}")]
    UnknownObjectClass(String),
}

/// Sync Counter Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncCountError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("full sync required: client's lastSync is older than retained history")]
    FullSyncRequired,
}

/// Stable wire-level error codes (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ApiErrorCode {
    Success = 0,
    InternalServerError = 1,
    MalformedRequest = 2,
    InvalidKey = 3,
    InvalidEmail = 4,
    InvalidPassword = 5,
    AuthFail = 6,
    InvalidJsonObject = 7,
    EmailNotUnique = 8,
    ClientUuidNotUnique = 9,
    FullSyncRequired = 10,
}

impl ApiErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<&CredentialError> for ApiErrorCode {
    fn from(err: &CredentialError) -> Self {
        match err {
            CredentialError::EmailNotUnique => ApiErrorCode::EmailNotUnique,
            CredentialError::ClientUuidNotUnique => ApiErrorCode::ClientUuidNotUnique,
            CredentialError::AuthFail => ApiErrorCode::AuthFail,
            CredentialError::PasswordTooShort => ApiErrorCode::InvalidPassword,
            CredentialError::InvalidEmail => ApiErrorCode::InvalidEmail,
            CredentialError::Database(_) => ApiErrorCode::InternalServerError,
        }
    }
}

impl From<&ProtocolError> for ApiErrorCode {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedRequest(_) => ApiErrorCode::MalformedRequest,
            ProtocolError::InvalidKey => ApiErrorCode::InvalidKey,
            ProtocolError::InvalidJson(_) => ApiErrorCode::InvalidJsonObject,
            ProtocolError::UnknownObjectClass(_) => ApiErrorCode::MalformedRequest,
        }
    }
}

impl From<&SyncCountError> for ApiErrorCode {
    fn from(err: &SyncCountError) -> Self {
        match err {
            SyncCountError::Database(_) => ApiErrorCode::InternalServerError,
            SyncCountError::FullSyncRequired => ApiErrorCode::FullSyncRequired,
        }
    }
}

impl From<&Error> for ApiErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Credential(e) => e.into(),
            Error::Protocol(e) => e.into(),
            Error::SyncCount(e) => e.into(),
            Error::Config(_) | Error::Database(_) => ApiErrorCode::InternalServerError,
        }
    }
}
