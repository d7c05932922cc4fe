use reqwest::StatusCode;

// Error type shared by every download stage.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status code {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("invalid url: {0}")]
    Url(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("master playlist declares {0} variants, selection needs at least 2")]
    NotVariant(usize),

    #[error("variant playlist declares {0} encryption keys, expected exactly 1")]
    KeyCount(usize),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
