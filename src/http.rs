//! HTTP client with rate limiting and timeouts for the Web API.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request rate limiting so our own requests stay well below API quotas
//! * Request and read timeouts, so a stalled request cannot stall a cycle
//! * A consistent `User-Agent`
//!
//! The [`Transport`] trait is the seam between the history fetcher and the
//! network. [`Client`] implements it over HTTPS.

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use http::{
    header::{HeaderValue, ACCEPT, AUTHORIZATION},
    StatusCode,
};
use reqwest::{self, Method, Url};

use crate::{config::Config, credential::Credential, error::Result};

/// Status and body of a completed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub body: String,
}

/// Issues authenticated GET requests.
pub trait Transport {
    /// Fetches `url` with `credential` as bearer token.
    ///
    /// Returns `Ok` for every response that arrived, whatever its status.
    /// `Err` means no response arrived at all.
    fn get(
        &self,
        url: Url,
        credential: &Credential,
    ) -> impl Future<Output = Result<Response>> + Send;
}

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Unlimited request client for special cases.
    pub unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window in which at most [`Self::RATE_LIMIT_CALLS_PER_INTERVAL`]
    /// calls are made.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(30);

    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Total time allowed for a single request, including the body.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Time allowed between two reads of the response.
    const READ_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialized.
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .timeout(Self::REQUEST_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if the request could not be sent or timed out.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}

impl Transport for Client {
    async fn get(&self, url: Url, credential: &Credential) -> Result<Response> {
        let mut authorization = HeaderValue::from_str(&credential.bearer())?;
        authorization.set_sensitive(true);

        let mut request = reqwest::Request::new(Method::GET, url);
        request
            .headers_mut()
            .try_insert(AUTHORIZATION, authorization)?;

        let response = self.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(Response { status, body })
    }
}
