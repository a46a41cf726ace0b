use thiserror::Error;
use url::Url;

use crate::errors::RequestFailure;

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("{0} cannot be base, provide valid URL")]
    CannotBeBase(Url),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Middleware(#[from] reqwest_middleware::Error),

    /// Terminal HTTP failure; not retried.
    #[error(transparent)]
    Failure(RequestFailure),

    /// 5xx or equivalent; retried until the transient budget runs out.
    #[error("transient failure: {0}")]
    Transient(RequestFailure),

    /// 429 from the registry; retried under a separate cap, never against
    /// the transient budget.
    #[error("rate limited by {0}")]
    RateLimited(Url),

    /// Registry declined every enabled submission attempt; carries the
    /// last rejection message.
    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiClientError {
    /// Retryable under the transient budget. Rate limiting is accounted
    /// separately and deliberately excluded here.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Reqwest(err) => err.is_timeout() || err.is_connect(),
            Self::Middleware(reqwest_middleware::Error::Reqwest(err)) => {
                err.is_timeout() || err.is_connect()
            }
            _ => false,
        }
    }

    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
