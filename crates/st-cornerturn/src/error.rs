use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unsupported for {dialect}: {reason}")]
    Unsupported { dialect: &'static str, reason: String },
    #[error("simulation error: {0}")]
    Sim(String),
    #[error("backend error: {0}")]
    Backend(String),
}

pub fn config(m: &str) -> Error {
    Error::Config(m.to_string())
}

pub fn unsupported(dialect: &'static str, reason: &str) -> Error {
    Error::Unsupported {
        dialect,
        reason: reason.to_string(),
    }
}

pub fn sim(m: &str) -> Error {
    Error::Sim(m.to_string())
}

pub fn backend(m: &str) -> Error {
    Error::Backend(m.to_string())
}
