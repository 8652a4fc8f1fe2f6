//! Error taxonomy for the anomaly service.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnomalyError>;

#[derive(Debug, Error)]
pub enum AnomalyError {
    /// A query or filtered scope produced zero rows.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid month {0:?}, expected YYYY-MM")]
    InvalidMonth(String),

    #[error("data source error: {0}")]
    Source(#[from] rusqlite::Error),

    /// Startup could not reach or prepare the data source.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(String),
}

impl AnomalyError {
    /// True for the "no data" outcome callers surface as not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AnomalyError::NotFound(_))
    }
}
