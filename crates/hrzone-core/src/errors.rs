/// Core error type.
///
/// Adapter crates map their specific errors into this type. Nothing here is
/// user-facing: invalid user input is modelled by `validation::InvalidInput`
/// and never leaves the dialogue engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
