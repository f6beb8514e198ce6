use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Invalid swap record: {0}")]
    InvalidRecord(String),

    #[error("Rejected price {price} for {pool}: must be finite and positive")]
    InvalidPrice { pool: String, price: f64 },

    #[error("Unsupported snapshot version {0}")]
    SnapshotVersion(u32),
}
