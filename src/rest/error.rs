use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered 200 but with an error/throttle body.
    #[error("provider error: {0}")]
    Api(String),

    #[error("response has no `{0}` section")]
    MissingSeries(String),

    #[error("bad value for `{field}`: {value}")]
    BadValue { field: String, value: String },
}

pub type RestResult<T> = Result<T, RestError>;
