use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Credential exchange failed or the remote rejected the bearer token.
    Authentication(String),
    /// Transport-level failure talking to the remote API.
    Network(reqwest::Error),
    /// The remote API answered with a non-success status.
    Status { status: u16, message: String },
    Decode(serde_json::Error),
    /// An intent referenced a mode or field the device cannot honor.
    Validation(String),
    UnknownDevice(String),
    Config(String),
    Io(std::io::Error),
}

impl Error {
    /// Transport and HTTP status failures, as opposed to auth or validation.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Status { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Authentication(msg) => write!(f, "authentication error: {msg}"),
            Error::Network(e) => write!(f, "network error: {e}"),
            Error::Status { status, message } => write!(f, "http {status}: {message}"),
            Error::Decode(e) => write!(f, "decode error: {e}"),
            Error::Validation(msg) => write!(f, "validation error: {msg}"),
            Error::UnknownDevice(id) => write!(f, "unknown device: {id}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Network(e) => Some(e),
            Error::Decode(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
