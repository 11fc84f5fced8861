use burn::record::RecorderError;

/// Errors raised while preparing data, building the criterion or running the training loop.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record error: {0}")]
    Record(#[from] RecorderError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Malformed dataset: {0}")]
    Dataset(String),

    #[error("Tensor data error: {0}")]
    Tensor(String),
}

pub type Result<T> = core::result::Result<T, Error>;
