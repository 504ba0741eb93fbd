/// Failures talking to the Archivist backend. Nothing here is retried.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned {status} for {path}: {body}")]
    Status {
        status: reqwest::StatusCode,
        path: String,
        body: String,
    },

    #[error("unexpected response from {path}: {message}")]
    Decode { path: String, message: String },
}

impl ApiError {
    pub fn decode(path: &str, message: impl std::fmt::Display) -> Self {
        ApiError::Decode {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}
