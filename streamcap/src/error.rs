//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// Remote failures carry the target name and the remote status code so the
/// caller can classify without re-parsing messages; rendering is confined to
/// the `#[error]` attributes.
#[derive(Error, Debug)]
pub enum Error {
    #[error("remote API overrun with too many requests while resolving {name} (status {status})")]
    RemoteRateLimited { name: String, status: u16 },

    #[error("unable to retrieve stream data for {name} (status {status})")]
    RemoteUnreachable { name: String, status: u16 },

    #[error("{name} is not a known streamer on this site")]
    RemoteNotFound { name: String },

    #[error("failed to start the recorder for {name}: {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("recorder process for {name} exited unexpectedly")]
    ProcessLost { name: String },

    #[error("store write did not apply: {operation}")]
    StoreWriteFailed { operation: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn rate_limited(name: impl Into<String>, status: u16) -> Self {
        Self::RemoteRateLimited {
            name: name.into(),
            status,
        }
    }

    pub fn unreachable(name: impl Into<String>, status: u16) -> Self {
        Self::RemoteUnreachable {
            name: name.into(),
            status,
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::RemoteNotFound { name: name.into() }
    }

    pub fn store_write(operation: impl Into<String>) -> Self {
        Self::StoreWriteFailed {
            operation: operation.into(),
        }
    }

    /// Whether the scheduler should recover locally (log + back off) rather
    /// than surface the failure to the requesting caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RemoteRateLimited { .. } | Self::RemoteUnreachable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_are_recoverable() {
        assert!(Error::rate_limited("alice", 429).is_recoverable());
        assert!(Error::unreachable("alice", 502).is_recoverable());
        assert!(!Error::not_found("alice").is_recoverable());
    }

    #[test]
    fn messages_carry_structured_fields() {
        let err = Error::rate_limited("alice", 429);
        assert!(err.to_string().contains("alice"));
        assert!(err.to_string().contains("429"));
    }
}
