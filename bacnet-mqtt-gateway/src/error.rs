use thiserror::Error;

/// Errors raised by a single reader wrapper or the pool that owns it.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("no wrapper available for operation")]
    NoWrapperAvailable,

    #[error("duplicate reader endpoint {ip}:{port} (first entry wins, reader {id} rejected)")]
    DuplicateEndpoint { id: String, ip: String, port: u16 },

    #[error("BACnet connection not established for reader {0}")]
    NotConnected(String),

    #[error("write verification failed: {actual} != {expected}")]
    WriteVerificationFailed { expected: String, actual: String },

    #[error("bulk read indexing error (malformed response), fallback required: {0}")]
    BulkIndexing(String),

    #[error("BACnet transport error: {0}")]
    Transport(String),
}

impl ReaderError {
    /// Fatal-for-this-operation errors abandon the whole bulk op and move on;
    /// everything else is isolated to the offending point (§7 BACnet transient).
    pub fn is_fatal_for_operation(&self) -> bool {
        matches!(
            self,
            ReaderError::NoWrapperAvailable | ReaderError::BulkIndexing(_)
        )
    }
}

/// Errors raised by the point store / device-status store, classified per §7.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("non-retryable store error: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// Classify a raw sqlx error the way `_is_retryable_error` does in the
    /// original Python store (sqlmodel_client.py).
    pub fn classify(err: &sqlx::Error) -> StoreError {
        let msg = err.to_string().to_lowercase();

        let non_retryable_patterns = [
            "could not refresh instance",
            "is not persistent within this session",
            "object is not bound to a session",
            "object is already attached to session",
        ];
        if non_retryable_patterns.iter().any(|p| msg.contains(p)) {
            return StoreError::Fatal(err.to_string());
        }

        let retryable_patterns = [
            "database is locked",
            "database table is locked",
            "disk i/o error",
            "cannot operate on a closed database",
            "attempt to write a readonly database",
            "no such table",
            "interrupted",
            "connection was invalidated",
            "pool timeout",
            "this connection is on a different thread",
            "greenlet_spawn has not been called",
        ];
        if retryable_patterns.iter().any(|p| msg.contains(p)) {
            return StoreError::Transient(err.to_string());
        }

        // Default: sqlx database/io errors are treated as transient, everything
        // else (e.g. row-not-found, decode) is fatal and not retried.
        match err {
            sqlx::Error::Database(_) | sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => {
                StoreError::Transient(err.to_string())
            }
            _ => StoreError::Fatal(err.to_string()),
        }
    }
}

/// Configuration errors are refused at startup; the agent never boots
/// degraded and silent (§7 Configuration).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required topic placeholder: {0}")]
    MissingPlaceholder(String),

    #[error("duplicate active reader endpoint {ip}:{port}")]
    DuplicateReaderEndpoint { ip: String, port: u16 },

    #[error("failed to load configuration file: {0}")]
    Load(String),

    #[error("failed to load credentials file: {0}")]
    Credentials(String),
}

/// Command-validation errors never crash the dispatcher; they become a
/// `success=false` response with a human-readable message (§7).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to parse command payload: {0}")]
    InvalidPayload(String),

    #[error("no handler registered for command {0:?}")]
    NoHandler(String),
}

/// Errors from the MQTT transport layer (§7 Transport transient).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mqtt connect failed: {0}")]
    Connect(String),

    #[error("mqtt publish failed: {0}")]
    Publish(String),

    #[error("TLS enabled but CA file missing: {0}")]
    MissingCaFile(String),
}
