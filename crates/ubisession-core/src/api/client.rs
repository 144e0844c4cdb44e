//! Authenticated request executor for the Ubisoft services API.
//!
//! `ApiClient` attaches the ticket headers for the requested tier, unwraps the
//! `httpCode` error envelope the services embed in otherwise ordinary
//! responses, and recovers from a rejected ticket by reacquiring and retrying
//! a bounded number of times before engaging the login cooldown.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::graphql::item_details_request;
use super::{ApiError, Result};
use crate::auth::{Tier, TokenLifecycle};
use crate::config::Config;
use crate::models::MarketSnapshot;
use crate::utils::json_text;

// ============================================================================
// Constants
// ============================================================================

/// Delay before each market query to stay under the upstream rate limit.
const SCAN_THROTTLE: Duration = Duration::from_millis(80);

/// Tier the marketplace GraphQL endpoint is called with.
const GRAPH_TIER: Tier = Tier::Primary;

const UBI_APP_ID: &str = "ubi-appid";
const UBI_LOCALE_CODE: &str = "ubi-localecode";
const UBI_SESSION_ID: &str = "ubi-sessionid";
const EXPIRATION: &str = "expiration";

/// Result of a market query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphOutcome {
    Snapshot(MarketSnapshot),
    /// The endpoint answered with an `errors` list instead of data.
    RateLimited,
}

/// Method, header overrides and JSON body for one request.
///
/// Headers given here replace the defaults of the same name.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post_json(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// API client for Ubisoft services.
pub struct ApiClient {
    tickets: TokenLifecycle,
    app_id: String,
    locale: String,
    user_agent: String,
    graphql_url: String,
    max_connect_retries: u32,
}

impl ApiClient {
    /// Create a client for the configured account, loading its stored tickets.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            tickets: TokenLifecycle::new(config)?,
            app_id: config.app_id.clone(),
            locale: config.locale.clone(),
            user_agent: config.user_agent.clone(),
            graphql_url: config.graphql_url.clone(),
            max_connect_retries: config.max_connect_retries,
        })
    }

    /// Abort in-flight requests with [`ApiError::Cancelled`] once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.tickets.session_mut().set_cancellation(cancel);
        self
    }

    pub fn tickets(&self) -> &TokenLifecycle {
        &self.tickets
    }

    /// Request `url` authorized with `tier` and return the decoded JSON body.
    ///
    /// A 401 envelope clears the tier's ticket and retries with a fresh one,
    /// at most `max_connect_retries` times. When the budget is spent the login
    /// cooldown is engaged and the 401 is returned.
    pub async fn fetch(&mut self, url: &str, tier: Tier, options: &RequestOptions) -> Result<Value> {
        let mut retries = 0;

        loop {
            self.ensure_ticket(tier).await?;
            let body = self.send(url, tier, options).await?;

            match classify(&body, url) {
                Err(err) if err.is_unauthorized() => {
                    self.tickets.invalidate(tier);
                    if retries >= self.max_connect_retries {
                        warn!(url = %url, %tier, retries, "Ticket still rejected, giving up");
                        self.tickets.engage_cooldown();
                        return Err(err);
                    }
                    retries += 1;
                    info!(url = %url, %tier, retry = retries, "Ticket rejected, reacquiring");
                }
                result => return result,
            }
        }
    }

    /// Request `url` and return the body as text without inspecting it.
    pub async fn fetch_text(
        &mut self,
        url: &str,
        tier: Tier,
        options: &RequestOptions,
    ) -> Result<String> {
        self.ensure_ticket(tier).await?;
        self.send(url, tier, options).await
    }

    /// Query the marketplace for one item.
    pub async fn fetch_graph(&mut self, item_id: &str) -> Result<GraphOutcome> {
        self.tickets.session().pause(SCAN_THROTTLE).await?;

        let options = RequestOptions::post_json(item_details_request(item_id));
        let url = self.graphql_url.clone();
        let body = self.fetch(&url, GRAPH_TIER, &options).await?;

        if body.get("errors").is_some() {
            warn!(item_id, "Rate limited");
            return Ok(GraphOutcome::RateLimited);
        }

        let snapshot = MarketSnapshot::from_response(&body);
        let missing = snapshot.missing_fields();
        if !missing.is_empty() {
            debug!(item_id, ?missing, "Market snapshot incomplete");
        }
        Ok(GraphOutcome::Snapshot(snapshot))
    }

    /// Persist credentials and drop the HTTP handle. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        self.tickets.close()
    }

    /// Make sure `tier` has a usable ticket, retrying failed acquisitions up
    /// to `max_connect_retries` times. On final failure the client is closed.
    async fn ensure_ticket(&mut self, tier: Tier) -> Result<()> {
        let attempts = self.max_connect_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.tickets.ensure_valid(tier).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_terminal() || attempt >= attempts => {
                    warn!(%tier, attempt, error = %err, "Could not obtain ticket");
                    if let Err(close_err) = self.close() {
                        warn!(error = %close_err, "Failed to persist credentials");
                    }
                    return Err(err);
                }
                Err(err) => {
                    debug!(%tier, attempt, error = %err, "Ticket acquisition failed, retrying");
                    attempt += 1;
                }
            }
        }
    }

    async fn send(&mut self, url: &str, tier: Tier, options: &RequestOptions) -> Result<String> {
        let headers = self.headers(tier, &options.headers)?;
        let client = self.tickets.session_mut().client()?;

        let mut request = client.request(options.method.clone(), url).headers(headers);
        if let Some(ref body) = options.body {
            request = request.json(body);
        }

        let response = self.tickets.session().execute(request).await?;
        debug!(url = %url, status = %response.status, "Response received");
        Ok(response.body)
    }

    fn headers(&self, tier: Tier, overrides: &HeaderMap) -> Result<HeaderMap> {
        let creds = self.tickets.credentials();
        let authorization = format!("Ubi_v1 t={}", creds.ticket(tier));

        let defaults = [
            (header::AUTHORIZATION, authorization.as_str()),
            (HeaderName::from_static(UBI_APP_ID), self.app_id.as_str()),
            (HeaderName::from_static(UBI_LOCALE_CODE), self.locale.as_str()),
            (HeaderName::from_static(UBI_SESSION_ID), creds.session_id.as_str()),
            (header::USER_AGENT, self.user_agent.as_str()),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static(EXPIRATION), creds.primary_expiry.as_str()),
        ];

        let mut headers = HeaderMap::new();
        for (name, value) in defaults {
            let value = HeaderValue::from_str(value)
                .map_err(|_| ApiError::InvalidHeader(name.as_str().to_string()))?;
            headers.insert(name, value);
        }

        for (name, value) in overrides {
            headers.insert(name.clone(), value.clone());
        }
        Ok(headers)
    }
}

/// Decode a response body and unwrap the `httpCode` error envelope.
///
/// The envelope is honoured regardless of the transport status. A 404 is
/// reported as a missing resource, named by the envelope or else by `url`.
fn classify(body: &str, url: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(body).map_err(|_| ApiError::unexpected_text(body))?;

    let Some(code) = value.get("httpCode") else {
        return Ok(value);
    };
    let code = envelope_code(code);

    let message = if code == 404 {
        let resource = value
            .get("resource")
            .map(json_text)
            .unwrap_or_else(|| url.to_string());
        format!("Missing resource {resource}")
    } else {
        value.get("message").map(json_text).unwrap_or_default()
    };
    Err(ApiError::RequestRejected { code, message })
}

/// The envelope's code as a number; 0 when it is not one.
fn envelope_code(code: &Value) -> u16 {
    let parsed = match code {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.unwrap_or(0)
}
