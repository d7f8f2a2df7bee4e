use thiserror::Error;

/// Wire-frame parsing errors.
///
/// These never escape the ingress loop: a malformed frame is counted and
/// dropped, not propagated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown frame type: {0}")]
    UnknownType(String),
    #[error("frame is missing field {0}")]
    MissingField(&'static str),
    #[error("bad numeric field {field}: {value}")]
    BadNumber { field: &'static str, value: String },
    #[error("bad depth level: {0}")]
    BadLevel(String),
    #[error("bad aggressor side: {0}")]
    BadSide(String),
}

/// Configuration validation errors. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("{field} = {value} outside allowed range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("regime long window ({long}) must exceed short window ({short})")]
    WindowOrder { short: usize, long: usize },
    #[error("failed to read config file: {0}")]
    Io(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
}

/// Top-level crate error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
