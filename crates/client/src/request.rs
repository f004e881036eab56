use std::sync::Arc;
use std::time::{Duration, Instant};

use prok_core::{ApiError, ErrorBody, NetworkFailure, RetryAttempt, RetryBudgets};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{ClientConfig, ConfigError};
use crate::session::Session;
use crate::transport::{ApiRequest, HttpTransport, RawResponse, Transport};

/// Resilient request client: per-attempt timeout, linear-backoff retries of
/// network failures and 5xx, bearer injection, and session expiry handling.
#[derive(Clone)]
pub struct RequestClient {
    transport: Arc<dyn Transport>,
    session: Session,
    timeout: Duration,
    budgets: RetryBudgets,
}

/// Outcome of one attempt.
enum Attempt {
    Done(Result<Value, ApiError>),
    Retryable(NetworkFailure),
}

impl RequestClient {
    pub fn new(transport: Arc<dyn Transport>, session: Session, config: &ClientConfig) -> Self {
        Self {
            transport,
            session,
            timeout: config.timeout(),
            budgets: config.retry.clone(),
        }
    }

    /// Client over [`HttpTransport`].
    pub fn from_config(config: &ClientConfig, session: Session) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), session, config))
    }

    /// Overrides the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn budgets(&self) -> &RetryBudgets {
        &self.budgets
    }

    /// Executes `request` with the retry budget of its kind.
    pub async fn send(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        self.execute(request, self.budgets.for_kind(request.kind)).await
    }

    /// Like [`Self::send`], decoding the body into `T`.
    pub async fn send_as<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let value = self.send(request).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Executes `request`, retrying network failures and 5xx responses up to
    /// `max_retries` times with linear backoff.
    ///
    /// 4xx responses are returned at once. A 401 reporting an expired token
    /// clears the session and yields [`ApiError::SessionExpired`].
    pub async fn execute(&self, request: &ApiRequest, max_retries: u32) -> Result<Value, ApiError> {
        let span = info_span!(
            "api_request",
            request_id = %Uuid::new_v4(),
            method = ?request.method,
            path = %request.path,
        );
        self.execute_inner(request, max_retries).instrument(span).await
    }

    async fn execute_inner(&self, request: &ApiRequest, max_retries: u32) -> Result<Value, ApiError> {
        let started = Instant::now();
        let mut attempt = RetryAttempt::first(max_retries);
        loop {
            debug!(
                attempt = attempt.attempt_number,
                max_attempts = attempt.max_attempts,
                "sending"
            );
            let token = self.session.token();
            let outcome = match self
                .transport
                .send(request, token.as_deref(), self.timeout)
                .await
            {
                Ok(resp) => self.classify(resp, token.as_deref()),
                Err(e) => match e.into_failure() {
                    Ok(failure) => Attempt::Retryable(failure),
                    Err(error) => Attempt::Done(Err(error)),
                },
            };

            let failure = match outcome {
                Attempt::Done(result) => {
                    debug!(elapsed_ms = started.elapsed().as_millis() as u64, ok = result.is_ok(), "done");
                    return result;
                }
                Attempt::Retryable(failure) => failure,
            };

            if attempt.is_last() {
                warn!(
                    attempts = attempt.attempt_number,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "giving up: {failure}"
                );
                return Err(ApiError::Network(failure));
            }
            let delay = attempt.backoff();
            warn!(
                attempt = attempt.attempt_number,
                delay_ms = delay.as_millis() as u64,
                "retrying after {failure}"
            );
            tokio::time::sleep(delay).await;
            attempt = attempt.next();
        }
    }

    fn classify(&self, resp: RawResponse, sent: Option<&str>) -> Attempt {
        let status = resp.status;
        if (200..300).contains(&status) {
            return Attempt::Done(decode_body(&resp.body));
        }
        if status >= 500 {
            return Attempt::Retryable(NetworkFailure::ServerError(status));
        }

        let body = ErrorBody::parse(&resp.body);
        if status == 401 && body.indicates_expired_token() {
            self.session.expire_for(sent);
            return Attempt::Done(Err(ApiError::SessionExpired));
        }
        let message = body.message(status);
        debug!(status, %message, "request rejected");
        Attempt::Done(Err(ApiError::Client { status, message }))
    }
}

fn decode_body(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
}
