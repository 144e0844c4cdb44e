//! The reusable HTTP handle shared by ticket exchanges and resource calls.
//!
//! A single pooled `reqwest::Client` is kept per lifecycle and replaced once it
//! is older than the configured refresh period, so a long-running poller never
//! holds on to connections that have silently gone bad.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ApiError, Result};

/// Status and body of a completed request.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

pub struct HttpSession {
    client: Option<Client>,
    opened_at: Instant,
    refresh_period: Option<Duration>,
    timeout: Duration,
    cancel: CancellationToken,
    generation: u64,
}

impl HttpSession {
    /// `refresh_period_secs <= 0` disables recycling by age.
    pub fn new(refresh_period_secs: i64, timeout: Duration) -> Self {
        let refresh_period = u64::try_from(refresh_period_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            client: None,
            opened_at: Instant::now(),
            refresh_period,
            timeout,
            cancel: CancellationToken::new(),
            generation: 0,
        }
    }

    pub fn set_cancellation(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    /// Number of clients opened so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    pub fn is_stale(&self) -> bool {
        match self.refresh_period {
            Some(period) => self.opened_at.elapsed() >= period,
            None => false,
        }
    }

    /// Return the live client, opening a new one if there is none or the
    /// current one has outlived the refresh period.
    pub fn client(&mut self) -> Result<Client> {
        if let Some(client) = self.client.as_ref().filter(|_| !self.is_stale()) {
            return Ok(client.clone());
        }

        if self.client.is_some() {
            debug!(age_secs = self.opened_at.elapsed().as_secs(), "Recycling stale HTTP session");
            self.close();
        }

        let client = Client::builder().timeout(self.timeout).build()?;
        self.client = Some(client.clone());
        self.opened_at = Instant::now();
        self.generation += 1;
        debug!(generation = self.generation, "Opened HTTP session");
        Ok(client)
    }

    /// Drop the client and its connection pool. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.client.take().is_some() {
            debug!(generation = self.generation, "Closed HTTP session");
        }
    }

    /// Send a request and read the whole body, giving up early on cancellation.
    pub async fn execute(&self, request: RequestBuilder) -> Result<RawResponse> {
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, ApiError>(RawResponse { status, body })
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(ApiError::Cancelled),
            result = exchange => result,
        }
    }

    /// Sleep for `delay` unless cancelled first.
    pub async fn pause(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ApiError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_opens_lazily_and_reuses() {
        let mut session = HttpSession::new(180, TIMEOUT);
        assert!(!session.is_open());

        session.client().expect("client");
        session.client().expect("client");
        assert!(session.is_open());
        assert_eq!(session.generation(), 1);
    }

    #[test]
    fn test_recycles_after_refresh_period() {
        let mut session = HttpSession::new(180, TIMEOUT);
        session.client().expect("client");

        session.refresh_period = Some(Duration::ZERO);
        assert!(session.is_stale());
        session.client().expect("client");
        assert_eq!(session.generation(), 2);

        session.refresh_period = Some(Duration::from_secs(180));
        assert!(!session.is_stale());
        session.client().expect("client");
        assert_eq!(session.generation(), 2);
    }

    #[test]
    fn test_non_positive_period_never_recycles() {
        for period in [0, -1] {
            let mut session = HttpSession::new(period, TIMEOUT);
            assert!(session.refresh_period.is_none());
            session.client().expect("client");
            assert!(!session.is_stale());
            session.client().expect("client");
            assert_eq!(session.generation(), 1);
        }
    }

    #[test]
    fn test_close_is_idempotent_and_reopens() {
        let mut session = HttpSession::new(180, TIMEOUT);
        session.client().expect("client");
        session.close();
        session.close();
        assert!(!session.is_open());

        session.client().expect("client");
        assert_eq!(session.generation(), 2);
    }

    #[tokio::test]
    async fn test_pause_cancelled() {
        let mut session = HttpSession::new(180, TIMEOUT);
        let cancel = CancellationToken::new();
        session.set_cancellation(cancel.clone());
        cancel.cancel();

        let result = session.pause(Duration::from_secs(60)).await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
    }
}
