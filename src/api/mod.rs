// Re-export the API module components
pub use self::{
    client::{ApiClient, ClientOptions},
    errors::ApiClientError,
    models::{MatchKind, MatchStatus, SubmissionPayload, SubmitOutcome},
    rate_limit::RateLimiterMiddleware,
};

// Module declarations
mod client;
mod errors;
mod models;
mod rate_limit;
