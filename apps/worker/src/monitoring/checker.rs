use std::time::{Duration, Instant};

use reqwest::redirect::Policy;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use super::types::{Check, CheckOutcome};

pub const DEFAULT_USER_AGENT: &str = concat!("uptime-worker/", env!("CARGO_PKG_VERSION"));

/// Probe executor for a single check
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Issue one request for the check and classify what happened.
    ///
    /// Exactly one outcome is produced per call; no retries.
    async fn probe(&self, check: &Check) -> CheckOutcome;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(user_agent: &str) -> reqwest::Result<Self> {
        // Redirects are reported as-is so a 301 can be a success code
        let client = reqwest::Client::builder().user_agent(user_agent).redirect(Policy::none()).build()?;

        Ok(Self { client })
    }
}

/// Build the request URL from the check's protocol and protocol-relative url.
///
/// Host, path and query are split by the URL parser, so
/// `example.com/a?b=c` targets host `example.com` with path `/a?b=c`.
pub fn request_url(check: &Check) -> Result<Url, url::ParseError> {
    let url = Url::parse(&check.target())?;
    if url.host_str().is_none() {
        return Err(url::ParseError::EmptyHost);
    }
    Ok(url)
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn probe(&self, check: &Check) -> CheckOutcome {
        let url = match request_url(check) {
            Ok(url) => url,
            Err(e) => return CheckOutcome::transport(format!("invalid url {}: {}", check.target(), e)),
        };

        let budget = Duration::from_millis(check.timeout_seconds * 1000);
        let request = self.client.request(check.method.to_http(), url).timeout(budget).send();

        let start = Instant::now();

        // Whichever of response, error or timer resolves first is the only
        // outcome; the losing future is dropped along with its request.
        let outcome = match timeout(budget, request).await {
            Ok(Ok(response)) => CheckOutcome::response(response.status().as_u16()),
            Ok(Err(e)) if e.is_timeout() => CheckOutcome::timeout(),
            Ok(Err(e)) => CheckOutcome::transport(error_chain(&e)),
            Err(_) => CheckOutcome::timeout(),
        };

        debug!(
            check_id = %check.id,
            target = %check.target(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            ?outcome,
            "Probe finished"
        );

        outcome
    }
}

/// Render an error with its sources, e.g. "error sending request: connection refused"
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
