use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("no workspace roots are open")]
    NoRoots,

    #[error("search path '{path}' is ambiguous; it exists in: {candidates}")]
    AmbiguousPath { path: String, candidates: String },

    #[error("search path '{0}' is outside every workspace root")]
    PathOutOfScope(String),

    #[error("invalid search path pattern: {0}")]
    InvalidPattern(#[from] scour_glob::GlobError),

    #[error("index not ready for: {0}; run the index init action and retry")]
    InitTimeout(String),

    #[error("{0}")]
    Engine(String),

    #[error(transparent)]
    Indexer(#[from] scour_indexer::IndexerError),
}
