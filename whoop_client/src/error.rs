use std::path::PathBuf;

use reqwest::header::InvalidHeaderValue;
use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can go wrong while talking to the Whoop API.
#[derive(Debug, Error)]
pub enum WhoopError {
    /// Caller supplied something the API would reject anyway (short state,
    /// page limit outside 1..=25, unparseable date, missing refresh token).
    #[error("validation error: {0}")]
    Validation(String),

    /// The token endpoint answered with something other than 200.
    #[error("authorization failed with status {0}")]
    Authorization(StatusCode),

    #[error("scope {0} not granted")]
    ScopeNotGranted(String),

    /// A resource endpoint answered with something other than 200.
    #[error("whoop api returned status {status} for {url}")]
    Api { status: StatusCode, url: String },

    #[error("collection returned no records")]
    EmptyCollection,

    #[error("token file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Header(#[from] InvalidHeaderValue),
}

impl WhoopError {
    pub(crate) fn validation(msg: impl Into<String>) -> WhoopError {
        WhoopError::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, WhoopError::Validation(_))
    }

    /// True for failures of the OAuth handshake itself, including a grant
    /// that came back without one of the requested scopes.
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            WhoopError::Authorization(_) | WhoopError::ScopeNotGranted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WhoopError>;
