use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Tool library '{name}' not found in {location} location")]
    LibraryNotFound { name: String, location: String },

    #[error("Invalid tool library {path}: {reason}")]
    InvalidLibrary { path: String, reason: String },

    #[error("Remote {operation} failed with status {status}: {body}")]
    RemoteStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;
