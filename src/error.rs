//! Error types shared across the query pipeline.
//!
//! [`ValidationError`] is the only error a caller can fix by correcting the
//! query. Everything else wrapped by [`TabularError`] is fatal for the request.

use crate::cache::CacheError;
use crate::store::StoreError;

/// A query failed argument cleaning or schema validation.
///
/// The `Display` text is the user-facing message carried by the error response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown attributes: {}", .0.join(", "))]
    UnknownParameters(Vec<String>),

    #[error("param `{0}` can only be used once in query string")]
    Repeated(String),

    #[error("param `{0}` can not be comma-separated")]
    NotAList(String),

    #[error("`{value}` is not valid for param `{param}`")]
    InvalidValue { param: String, value: String },

    #[error("`all` can not be combined with other values for param `{0}`")]
    MixedAll(String),

    #[error("`{0}` is not a valid data entry, expected `statistic:measure` or `statistic:measure(DIMENSION:value|value,DIMENSION)`")]
    MalformedData(String),

    #[error("param `data` is required")]
    MissingData,

    #[error("statistic `{0}` does not exist")]
    UnknownStatistic(String),

    #[error("measure `{measure}` does not exist for statistic `{statistic}`")]
    UnknownMeasure { statistic: String, measure: String },

    #[error("dimension `{dimension}` does not exist for measure `{measure}`")]
    UnknownDimension { measure: String, dimension: String },

    #[error("value `{value}` does not exist for dimension `{dimension}`")]
    UnknownValue { dimension: String, value: String },

    #[error("region level `{level}` is not available for measure `{measure}`")]
    LevelNotAvailable { measure: String, level: u8 },

    #[error("parent `{0}` does not exist")]
    UnknownParent(String),

    #[error("region `{0}` does not exist")]
    UnknownRegion(String),
}

/// Errors that can occur while answering a tabular query.
#[derive(Debug, thiserror::Error)]
pub enum TabularError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Fact store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt base table blob: {0}")]
    Blob(#[from] base64::DecodeError),
}

pub type TabularResult<T> = Result<T, TabularError>;
