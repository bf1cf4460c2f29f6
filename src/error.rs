// Error taxonomy shared by the backend clients and repositories
use crate::domain::query_condition::AggregateFunction;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatahubError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("receive error response from prometheus: {0}")]
    Backend(String),

    #[error("decode http response failed: {message}\n received response: {body}")]
    Decode { message: String, body: String },

    #[error(
        "wrap prometheus query expression with function failed: no mapping function for function: {0:?}"
    )]
    UnsupportedAggregation(AggregateFunction),

    #[error("get entities failed: result type not supported {0}")]
    UnsupportedResultType(String),

    #[error("error while building sample: {0}")]
    Sample(String),

    #[error("influxdb error: {0}")]
    Influx(String),

    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, DatahubError>;
