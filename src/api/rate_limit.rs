use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

/// Token-bucket throttle applied to every outbound registry request.
///
/// With a burst of one this degenerates to a minimum spacing between
/// consecutive requests, which is exactly what the registry's abuse
/// controls expect from bulk tooling.
#[derive(Clone)]
pub struct RateLimiterMiddleware {
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl RateLimiterMiddleware {
    pub fn new(rate_limiter: DefaultDirectRateLimiter) -> Self {
        Self {
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    /// One request per `interval`, no burst. A zero interval yields `None`
    /// and the middleware should be left out entirely.
    pub fn with_min_interval(interval: Duration) -> Option<Self> {
        let quota = Quota::with_period(interval)?.allow_burst(NonZeroU32::MIN);
        Some(Self::new(RateLimiter::direct(quota)))
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimiterMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        self.rate_limiter.until_ready().await;
        next.run(req, extensions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_disables_limiter() {
        assert!(RateLimiterMiddleware::with_min_interval(Duration::ZERO).is_none());
    }

    #[test]
    fn test_non_zero_interval_builds() {
        assert!(RateLimiterMiddleware::with_min_interval(Duration::from_secs(3)).is_some());
    }

    #[tokio::test]
    async fn test_limiter_spaces_out_acquisitions() {
        let middleware =
            RateLimiterMiddleware::with_min_interval(Duration::from_millis(50)).unwrap();
        let started = std::time::Instant::now();
        middleware.rate_limiter.until_ready().await;
        middleware.rate_limiter.until_ready().await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
