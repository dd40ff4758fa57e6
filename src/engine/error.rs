use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed or policy-violating input.
    Validation(String),
    /// No free room of the type for the requested nights.
    Capacity { room_type_id: Ulid },
    NotFound(Ulid),
    Forbidden,
    AlreadyCancelled(Ulid),
    AlreadyExists(String),
    /// Lock wait timed out; safe to retry.
    Transient(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::Capacity { room_type_id } => {
                write!(f, "no room of type {room_type_id} free for the requested dates")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Forbidden => write!(f, "not allowed"),
            EngineError::AlreadyCancelled(id) => write!(f, "booking {id} is already cancelled"),
            EngineError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            EngineError::Transient(msg) => write!(f, "temporarily unavailable: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
