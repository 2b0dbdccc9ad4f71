use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("[api] network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("[api] {endpoint} rejected with status {status}")]
    Rejected { endpoint: String, status: u16 },

    #[error("[api] invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("[api] no attempt is being monitored")]
    NoAttempt,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("http client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),
}
