use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn execution context: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to encode context request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Supervisor is shutting down")]
    ShuttingDown,
}
