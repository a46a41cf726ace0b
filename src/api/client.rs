use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use backon::{ExponentialBuilder, Retryable};
use log::{debug, warn};
use reqwest::{multipart, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use url::Url;

use crate::{address::ContractAddress, errors::RequestFailure};

use super::errors::ApiClientError;
use super::models::{
    CheckByAddressesEntry, Error, FilesAnyResponse, MatchKind, MatchStatus, SubmissionPayload,
    SubmitOutcome, VerifyResponse,
};
use super::rate_limit::RateLimiterMiddleware;

/// How many 429 responses a single logical request may absorb before the
/// call is surfaced as rate limited. Kept separate from `max_retries` so a
/// throttling registry doesn't eat the transient budget.
const RATE_LIMIT_RETRY_CAP: u32 = 2;

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// Minimum spacing between outbound requests; zero disables throttling.
    pub min_request_interval: Duration,
    pub max_retries: u32,
    pub min_retry_delay: Duration,
    pub try_full_match: bool,
    pub try_partial_match: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            min_request_interval: Duration::from_secs(3),
            max_retries: 3,
            min_retry_delay: Duration::from_millis(500),
            try_full_match: true,
            try_partial_match: true,
        }
    }
}

/// Rate-limited, retrying client for the contract-metadata registry.
pub struct ApiClient {
    base: Url,
    chain_id: u64,
    client: ClientWithMiddleware,
    options: ClientOptions,
    rate_limited: AtomicU64,
}

/// Result of one submission attempt at a fixed match level. A rejection is
/// the registry declining the payload, not a transport failure; the caller
/// may still fall back to a partial-match attempt.
enum SubmitAttempt {
    Accepted(SubmitOutcome),
    Rejected(String),
}

impl ApiClient {
    /// # Errors
    ///
    /// Fails if provided `Url` cannot be a base. We rely on that
    /// invariant in other methods.
    pub fn new(base: Url, chain_id: u64, options: ClientOptions) -> Result<Self, ApiClientError> {
        // Test here so that we are sure path_segments_mut succeeds
        if base.cannot_be_a_base() {
            return Err(ApiClientError::CannotBeBase(base));
        }

        let inner = reqwest::Client::builder().timeout(options.timeout).build()?;
        let mut builder = ClientBuilder::new(inner);
        if let Some(limiter) = RateLimiterMiddleware::with_min_interval(options.min_request_interval)
        {
            builder = builder.with(limiter);
        }

        Ok(Self {
            base,
            chain_id,
            client: builder.build(),
            options,
            rate_limited: AtomicU64::new(0),
        })
    }

    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Total number of 429 responses observed over the client's lifetime.
    pub fn rate_limited_count(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    fn url_with_segments(&self, segments: &[&str]) -> Result<Url, ApiClientError> {
        let mut url = self.base.clone();
        let url_clone = url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiClientError::CannotBeBase(url_clone))?
            .extend(segments);
        Ok(url)
    }

    /// # Errors
    ///
    /// Will return `Err` if the URL cannot be a base.
    pub fn full_match_url(&self, address: &ContractAddress) -> Result<Url, ApiClientError> {
        self.url_with_segments(&["files", &self.chain_id.to_string(), address.as_ref()])
    }

    /// # Errors
    ///
    /// Will return `Err` if the URL cannot be a base.
    pub fn any_match_url(&self, address: &ContractAddress) -> Result<Url, ApiClientError> {
        self.url_with_segments(&["files", "any", &self.chain_id.to_string(), address.as_ref()])
    }

    /// # Errors
    ///
    /// Will return `Err` if the URL cannot be a base.
    pub fn files_tree_url(&self, address: &ContractAddress) -> Result<Url, ApiClientError> {
        self.url_with_segments(&[
            "files",
            "tree",
            "any",
            &self.chain_id.to_string(),
            address.as_ref(),
        ])
    }

    /// # Errors
    ///
    /// Will return `Err` if the URL cannot be a base.
    pub fn check_by_addresses_url(&self, address: &ContractAddress) -> Result<Url, ApiClientError> {
        let mut url = self.url_with_segments(&["check-by-addresses"])?;
        url.query_pairs_mut()
            .append_pair("addresses", address.as_ref())
            .append_pair("chainIds", &self.chain_id.to_string());
        Ok(url)
    }

    /// Probes the registry tier by tier and returns on the first positive
    /// signal. `Ok(MatchStatus::NotFound)` means every tier reported a
    /// definitive negative; an `Err` is inconclusive and must not be cached
    /// as unverified.
    ///
    /// # Errors
    ///
    /// Will return `Err` on a transport failure or a non-404 HTTP failure
    /// that survived the retry budget.
    pub async fn check_verified(
        &self,
        address: &ContractAddress,
    ) -> Result<MatchStatus, ApiClientError> {
        let full_url = self.full_match_url(address)?;
        if self.get_checked(&full_url).await?.is_some() {
            debug!("{address}: full match record found");
            return Ok(MatchStatus::FullMatch);
        }

        let any_url = self.any_match_url(address)?;
        if let Some(body) = self.get_checked(&any_url).await? {
            let files: FilesAnyResponse = parse_json(&any_url, &body)?;
            let status = if files.status == "full" {
                MatchStatus::FullMatch
            } else {
                MatchStatus::PartialMatch
            };
            debug!("{address}: match record found with status {status}");
            return Ok(status);
        }

        let tree_url = self.files_tree_url(address)?;
        if self.get_checked(&tree_url).await?.is_some() {
            debug!("{address}: source files exist in the registry");
            return Ok(MatchStatus::FilesExist);
        }

        let check_url = self.check_by_addresses_url(address)?;
        if let Some(body) = self.get_checked(&check_url).await? {
            let entries: Vec<CheckByAddressesEntry> = parse_json(&check_url, &body)?;
            for entry in entries {
                if !entry.address.eq_ignore_ascii_case(address.as_ref()) {
                    continue;
                }
                match entry.status.as_deref() {
                    Some("perfect") => return Ok(MatchStatus::FullMatch),
                    Some("partial") => return Ok(MatchStatus::PartialMatch),
                    _ => {}
                }
            }
        }

        Ok(MatchStatus::NotFound)
    }

    /// Submits a contract for verification: a full-match attempt first,
    /// then one partial-match attempt with the same payload when enabled.
    ///
    /// # Errors
    ///
    /// Will return `Err` on transport failure, or with the registry's last
    /// rejection message when no enabled match level succeeded.
    pub async fn submit(
        &self,
        address: &ContractAddress,
        payload: &SubmissionPayload,
    ) -> Result<SubmitOutcome, ApiClientError> {
        let mut rejection = "no submission attempt was enabled".to_string();

        if self.options.try_full_match {
            match self.submit_attempt(address, payload, MatchKind::Full).await? {
                SubmitAttempt::Accepted(outcome) => return Ok(outcome),
                SubmitAttempt::Rejected(msg) => {
                    debug!("{address}: full match submission rejected: {msg}");
                    rejection = msg;
                }
            }
        }

        if self.options.try_partial_match {
            match self
                .submit_attempt(address, payload, MatchKind::Partial)
                .await?
            {
                SubmitAttempt::Accepted(outcome) => return Ok(outcome),
                SubmitAttempt::Rejected(msg) => {
                    debug!("{address}: partial match submission rejected: {msg}");
                    rejection = msg;
                }
            }
        }

        Err(ApiClientError::Rejected(rejection))
    }

    async fn submit_attempt(
        &self,
        address: &ContractAddress,
        payload: &SubmissionPayload,
        kind: MatchKind,
    ) -> Result<SubmitAttempt, ApiClientError> {
        let url = self.base.clone();
        let body = match self
            .send_with_retry(|| async {
                let form = multipart::Form::new()
                    .text("address", address.to_string())
                    .text("chain", self.chain_id.to_string())
                    .text("match", kind.as_str())
                    .text(
                        format!("files[{}]", payload.file_name),
                        payload.source.clone(),
                    )
                    .text("files[metadata.json]", payload.metadata_json.clone());

                let response = self.client.post(url.clone()).multipart(form).send().await?;
                self.read_checked(&url, response).await
            })
            .await
        {
            Ok(body) => body,
            // A 400 is the registry declining this match level, not a
            // transport failure; the next enabled level still gets its try
            Err(ApiClientError::Failure(failure))
                if failure.status == StatusCode::BAD_REQUEST =>
            {
                return Ok(SubmitAttempt::Rejected(failure.msg));
            }
            Err(err) => return Err(err),
        };

        let Some(body) = body else {
            // Submission endpoints answer 404 only for unknown chains
            return Ok(SubmitAttempt::Rejected(format!(
                "registry does not serve chain {}",
                self.chain_id
            )));
        };

        match parse_json::<VerifyResponse>(&url, &body)? {
            VerifyResponse::Verified { result } => {
                let granted = result
                    .iter()
                    .find(|item| item.address.eq_ignore_ascii_case(address.as_ref()))
                    .map(|item| item.status.clone())
                    .unwrap_or_default();
                let response = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
                match granted.as_str() {
                    "perfect" => Ok(SubmitAttempt::Accepted(SubmitOutcome {
                        status: MatchStatus::FullMatch,
                        response,
                    })),
                    "partial" if kind == MatchKind::Partial || self.options.try_partial_match => {
                        Ok(SubmitAttempt::Accepted(SubmitOutcome {
                            status: MatchStatus::PartialMatch,
                            response,
                        }))
                    }
                    other => Ok(SubmitAttempt::Rejected(format!(
                        "registry reported status {other:?}"
                    ))),
                }
            }
            VerifyResponse::Error { error } => Ok(SubmitAttempt::Rejected(error)),
        }
    }

    async fn get_checked(&self, url: &Url) -> Result<Option<String>, ApiClientError> {
        self.send_with_retry(|| async {
            let response = self.client.get(url.clone()).send().await?;
            self.read_checked(url, response).await
        })
        .await
    }

    /// Maps one HTTP exchange into the error taxonomy: 200 body, 404 as a
    /// definitive negative, 429 counted and retryable under its own cap,
    /// 5xx transient, anything else terminal. A 400 carrying a registry
    /// error document is surfaced with that message.
    async fn read_checked(
        &self,
        url: &Url,
        response: Response,
    ) -> Result<Option<String>, ApiClientError> {
        match response.status() {
            StatusCode::OK => Ok(Some(response.text().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => {
                self.rate_limited.fetch_add(1, Ordering::Relaxed);
                Err(ApiClientError::RateLimited(url.clone()))
            }
            StatusCode::BAD_REQUEST => {
                let body = response.text().await?;
                let msg = serde_json::from_str::<Error>(&body)
                    .map_or(body, |document| document.error);
                Err(ApiClientError::Failure(RequestFailure::new(
                    url.clone(),
                    StatusCode::BAD_REQUEST,
                    msg,
                )))
            }
            status if status.is_server_error() => Err(ApiClientError::Transient(
                RequestFailure::new(url.clone(), status, response.text().await?),
            )),
            status => Err(ApiClientError::Failure(RequestFailure::new(
                url.clone(),
                status,
                response.text().await?,
            ))),
        }
    }

    /// Retries `run` with exponential backoff. Transient failures consume
    /// the configured `max_retries` budget; 429s are allowed
    /// `RATE_LIMIT_RETRY_CAP` extra attempts on top of it.
    async fn send_with_retry<F, Fut, T>(&self, run: F) -> Result<T, ApiClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiClientError>>,
    {
        let max_retries = self.options.max_retries;
        let mut transient_attempts = 0u32;
        let mut limited_attempts = 0u32;

        run.retry(
            ExponentialBuilder::default()
                .with_min_delay(self.options.min_retry_delay)
                .with_max_delay(Duration::from_secs(60))
                .with_max_times((max_retries + RATE_LIMIT_RETRY_CAP) as usize),
        )
        .when(move |err: &ApiClientError| {
            if err.is_rate_limited() {
                limited_attempts += 1;
                limited_attempts <= RATE_LIMIT_RETRY_CAP
            } else if err.is_transient() {
                transient_attempts += 1;
                transient_attempts <= max_retries
            } else {
                false
            }
        })
        .notify(|err: &ApiClientError, dur: Duration| {
            warn!("registry request failed: {err}; retrying in {dur:?}");
        })
        .await
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(url: &Url, body: &str) -> Result<T, ApiClientError> {
    serde_json::from_str(body).map_err(|err| {
        ApiClientError::Failure(RequestFailure::new(
            url.clone(),
            StatusCode::OK,
            format!("failed to parse registry response: {err}"),
        ))
    })
}
