use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine error: {0}")]
    Engine(#[from] scour_engine::EngineError),

    #[error("workspace root is not registered: {0}")]
    UnknownRoot(String),

    #[error("no workspace roots are open")]
    NoRoots,

    #[error("{0}")]
    Operation(String),

    #[error("service is shut down")]
    ShutDown,
}
