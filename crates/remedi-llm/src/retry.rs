use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;

const BASE_BACKOFF_SECS: u64 = 1;

/// Parse the `Retry-After` header value as seconds, falling back to exponential backoff.
pub(crate) fn retry_delay(response: &reqwest::Response, attempt: u32) -> Duration {
    if let Some(val) = response.headers().get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.parse::<u64>()
    {
        return Duration::from_secs(secs);
    }
    Duration::from_secs(BASE_BACKOFF_SECS << attempt)
}

/// Classify a transport-level failure: timeouts and refused connections mean
/// the upstream is unavailable, everything else stays an HTTP error.
pub(crate) fn classify_transport(err: reqwest::Error) -> LlmError {
    if err.is_timeout() || err.is_connect() {
        LlmError::Unavailable
    } else {
        LlmError::Http(err)
    }
}

/// Send an HTTP request, retrying up to `max_retries` times on 429 responses.
///
/// `f` must return a `reqwest::Response`. On each rate-limited attempt, logs a
/// warning and waits before retrying. Returns the successful `Response` for
/// further processing by the caller, or an error.
///
/// # Errors
///
/// Returns `LlmError::RateLimited` if all attempts are exhausted,
/// `LlmError::Unavailable` for timeouts and refused connections, or the
/// underlying `reqwest::Error` wrapped as `LlmError::Http`.
pub(crate) async fn send_with_retry<F, Fut>(
    provider_name: &str,
    max_retries: u32,
    mut f: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    for attempt in 0..=max_retries {
        let response = f().await.map_err(classify_transport)?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if attempt == max_retries {
                return Err(LlmError::RateLimited);
            }
            let delay = retry_delay(&response, attempt);
            tracing::warn!(
                "{provider_name} rate limited, retrying in {}s ({}/{})",
                delay.as_secs(),
                attempt + 1,
                max_retries
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        return Ok(response);
    }

    Err(LlmError::RateLimited)
}

/// Map a non-success status to the error taxonomy: 4xx means the upstream
/// rejected the request, 5xx means it is unavailable.
pub(crate) fn reject_status(provider_name: &str, status: reqwest::StatusCode, body: &str) -> LlmError {
    tracing::error!("{provider_name} API error {status}: {body}");
    if status.is_client_error() {
        LlmError::Rejected {
            status: status.as_u16(),
        }
    } else {
        LlmError::Unavailable
    }
}
