use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ChatError {
    /// Backend unreachable or answered garbage. Recovered by the next poll.
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// An element the render surface must provide is missing. Fatal.
    #[error("Structural integrity error: {0}")]
    StructuralIntegrity(String),

    /// The backend broke its contract (e.g. a message without id). Fatal.
    #[error("Validation gap: {0}")]
    ValidationGap(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The engine task is gone; its handle can no longer deliver commands.
    #[error("Chat engine stopped")]
    Stopped,
}

impl ChatError {
    /// Whether the engine can keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Storage(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("Backend answered with status {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Invalid route: {0}")]
    Route(String),
}
