use thiserror::Error;

pub type Result<T> = std::result::Result<T, GlobError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GlobError {
    #[error("unterminated character class in pattern '{0}'")]
    UnterminatedClass(String),

    #[error("unterminated brace group in pattern '{0}'")]
    UnterminatedBrace(String),

    #[error("trailing unescaped backslash in pattern '{0}'")]
    TrailingEscape(String),

    #[error("pattern compiled to an invalid expression: {0}")]
    BadExpression(String),
}
