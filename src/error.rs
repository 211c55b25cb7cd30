use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("{0} is not supported by this source")]
    Unsupported(&'static str),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl SourceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        SourceError::NotFound { what: what.into() }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        SourceError::Parse(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
