//! Two-tier ticket lifecycle.
//!
//! A primary ticket is obtained by exchanging the account's basic token at the
//! sessions endpoint; a secondary ticket is obtained by presenting the primary
//! one to the same endpoint. Both are persisted after every successful
//! exchange and re-read from disk before any new exchange, so several
//! processes sharing a credentials file pick up each other's refreshes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CredentialStore, Credentials};
use crate::api::session::HttpSession;
use crate::api::{ApiError, Result};
use crate::config::Config;
use crate::utils::json_text;

/// How long ticket acquisition is refused after repeated 401s.
pub const LOGIN_COOLDOWN_SECS: i64 = 30;

/// Body of every session exchange.
const SESSION_REQUEST_BODY: &str = r#"{"rememberMe":true}"#;

/// Which ticket a request is authorized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Primary,
    Secondary,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Primary => write!(f, "primary"),
            Tier::Secondary => write!(f, "secondary"),
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" => Ok(Tier::Primary),
            "secondary" => Ok(Tier::Secondary),
            other => Err(format!("unknown tier '{other}' (expected primary or secondary)")),
        }
    }
}

/// Where the stored tickets stand relative to the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NoPrimary,
    PrimaryValid,
    PrimaryExpired,
    SecondaryValid,
    SecondaryExpired,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::NoPrimary => "no primary ticket",
            LifecycleState::PrimaryValid => "primary ticket valid",
            LifecycleState::PrimaryExpired => "primary ticket expired",
            LifecycleState::SecondaryValid => "secondary ticket valid",
            LifecycleState::SecondaryExpired => "secondary ticket expired",
        };
        f.write_str(label)
    }
}

/// Parse an upstream expiry timestamp as UTC.
///
/// The fractional part arrives with anywhere from zero to seven digits and is
/// cut or padded to microseconds first. Zone suffixes are ignored; the service
/// only issues UTC. Returns `None` when the string still does not parse.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let base = raw.get(..19)?;
    let fraction: String = raw[19..]
        .strip_prefix('.')
        .map(|digits| {
            digits
                .chars()
                .take_while(char::is_ascii_digit)
                .take(6)
                .collect()
        })
        .unwrap_or_default();

    NaiveDateTime::parse_from_str(&format!("{base}.{fraction:0<6}"), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Default, Deserialize)]
struct SessionResponse {
    ticket: Option<String>,
    expiration: Option<String>,
    #[serde(rename = "profileId")]
    profile_id: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    #[serde(rename = "spaceId")]
    space_id: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
    #[serde(rename = "httpCode")]
    http_code: Option<Value>,
    message: Option<Value>,
}

impl SessionResponse {
    /// Describe why an exchange produced no ticket.
    fn rejection_message(&self) -> String {
        match (&self.http_code, &self.message) {
            (Some(code), Some(message)) => {
                format!("HTTP {}: {}", json_text(code), json_text(message))
            }
            (None, Some(message)) => json_text(message),
            (Some(code), None) => json_text(code),
            (None, None) => "Unknown Error".to_string(),
        }
    }
}

/// Owns one account's tickets, its credentials file and its HTTP handle.
pub struct TokenLifecycle {
    store: CredentialStore,
    credentials: Credentials,
    session: HttpSession,
    basic_token: String,
    app_id: String,
    user_agent: String,
    session_url: String,
    cooldown_until: Option<DateTime<Utc>>,
    /// Tickets the service refused; ignored when re-reading the file.
    rejected: Vec<String>,
}

impl TokenLifecycle {
    pub fn new(config: &Config) -> Result<Self> {
        let account = config.account.as_ref().ok_or(ApiError::MissingAccount)?;
        let store = CredentialStore::new(config.creds_path(account));
        let credentials = store.load()?;

        let lifecycle = Self {
            store,
            credentials,
            session: HttpSession::new(config.refresh_session_secs, config.request_timeout()),
            basic_token: account.basic_token(),
            app_id: config.app_id.clone(),
            user_agent: config.user_agent.clone(),
            session_url: config.session_url.clone(),
            cooldown_until: None,
            rejected: Vec::new(),
        };
        debug!(
            path = %lifecycle.store.path().display(),
            state = %lifecycle.state(),
            "Credentials loaded"
        );
        Ok(lifecycle)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn session(&self) -> &HttpSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut HttpSession {
        &mut self.session
    }

    /// The tier's ticket, empty if it has not been acquired.
    pub fn ticket(&self, tier: Tier) -> &str {
        self.credentials.ticket(tier)
    }

    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until
    }

    pub fn state(&self) -> LifecycleState {
        self.state_at(Utc::now())
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> LifecycleState {
        if self.credentials.primary_ticket.is_empty() {
            return LifecycleState::NoPrimary;
        }
        if !self.credentials.secondary_ticket.is_empty() {
            return if self.is_valid_at(Tier::Secondary, now) {
                LifecycleState::SecondaryValid
            } else {
                LifecycleState::SecondaryExpired
            };
        }
        if self.is_valid_at(Tier::Primary, now) {
            LifecycleState::PrimaryValid
        } else {
            LifecycleState::PrimaryExpired
        }
    }

    /// True if the tier holds a ticket whose expiry is still in the future.
    /// An unparseable expiry counts as expired.
    pub fn is_valid_at(&self, tier: Tier, now: DateTime<Utc>) -> bool {
        !self.credentials.ticket(tier).is_empty()
            && parse_expiry(self.credentials.expiry(tier)).is_some_and(|expiry| expiry > now)
    }

    fn is_valid(&self, tier: Tier) -> bool {
        self.is_valid_at(tier, Utc::now())
    }

    /// Refuse logins for the cooldown window. Never moves an existing
    /// cooldown earlier.
    pub fn engage_cooldown(&mut self) {
        let until = Utc::now() + Duration::seconds(LOGIN_COOLDOWN_SECS);
        let until = self.cooldown_until.map_or(until, |current| current.max(until));
        warn!(%until, "Login cooldown engaged");
        self.cooldown_until = Some(until);
    }

    /// Forget a ticket the service rejected so the next request reacquires it.
    pub fn invalidate(&mut self, tier: Tier) {
        let ticket = self.credentials.ticket(tier);
        if !ticket.is_empty() {
            self.rejected.push(ticket.to_string());
        }
        self.credentials.clear_ticket(tier);
        debug!(%tier, "Ticket invalidated");
    }

    /// Make sure `tier` holds an unexpired ticket, exchanging for new tickets
    /// only when it does not. A still-valid primary also tops up the secondary.
    /// The credentials file is re-read before any exchange.
    pub async fn ensure_valid(&mut self, tier: Tier) -> Result<()> {
        match tier {
            Tier::Secondary => {
                if self.is_valid(Tier::Secondary) {
                    return Ok(());
                }
                self.reload()?;
                if self.is_valid(Tier::Secondary) {
                    return Ok(());
                }
                if !self.credentials.secondary_ticket.is_empty() && self.is_valid(Tier::Primary) {
                    self.acquire_secondary().await
                } else {
                    self.acquire_primary().await
                }
            }
            Tier::Primary => {
                if !self.is_valid(Tier::Primary) || !self.is_valid(Tier::Secondary) {
                    self.reload()?;
                }
                if !self.is_valid(Tier::Primary) {
                    return self.acquire_primary().await;
                }
                if !self.is_valid(Tier::Secondary) {
                    self.acquire_secondary().await?;
                }
                Ok(())
            }
        }
    }

    /// Exchange the basic token for a primary ticket, then chain into the
    /// secondary exchange.
    async fn acquire_primary(&mut self) -> Result<()> {
        self.check_cooldown()?;
        info!("Acquiring primary ticket");

        let authorization = format!("Basic {}", self.basic_token);
        let response = self.exchange(&authorization).await?;
        self.accept(Tier::Primary, response)?;

        self.acquire_secondary().await
    }

    /// Exchange the primary ticket for a secondary ticket.
    async fn acquire_secondary(&mut self) -> Result<()> {
        self.check_cooldown()?;
        if self.credentials.primary_ticket.is_empty() {
            return Err(ApiError::AuthRejected(
                "No primary ticket to exchange".to_string(),
            ));
        }
        info!("Acquiring secondary ticket");

        let authorization = format!("Ubi_v1 t={}", self.credentials.primary_ticket);
        let response = self.exchange(&authorization).await?;
        self.accept(Tier::Secondary, response)
    }

    /// Write the current record to the credentials file.
    pub fn persist(&self) -> Result<()> {
        self.store.save(&self.credentials)
    }

    /// Persist credentials and drop the HTTP handle. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        let saved = self.persist();
        self.session.close();
        saved
    }

    fn check_cooldown(&self) -> Result<()> {
        match self.cooldown_until {
            Some(until) if Utc::now() < until => Err(ApiError::LoginOnCooldown { until }),
            _ => Ok(()),
        }
    }

    /// Adopt whatever another process may have written, minus tickets that
    /// were already rejected in this process.
    fn reload(&mut self) -> Result<()> {
        let Some(mut stored) = self.store.read()? else {
            return Ok(());
        };
        for tier in [Tier::Primary, Tier::Secondary] {
            if self.rejected.iter().any(|t| t == stored.ticket(tier)) {
                stored.clear_ticket(tier);
            }
        }
        if stored != self.credentials {
            debug!("Credentials changed on disk");
        }
        self.credentials = stored;
        Ok(())
    }

    async fn exchange(&mut self, authorization: &str) -> Result<SessionResponse> {
        let client = self.session.client()?;
        let request = client
            .post(&self.session_url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::CONTENT_TYPE, "application/json; charset=UTF-8")
            .header("Ubi-AppId", &self.app_id)
            .header(header::AUTHORIZATION, authorization)
            .body(SESSION_REQUEST_BODY);

        let response = self.session.execute(request).await?;
        debug!(status = %response.status, "Session exchange response received");

        let value: Value = serde_json::from_str(&response.body)
            .map_err(|_| ApiError::unexpected_text(&response.body))?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Malformed session response: {e}")))
    }

    fn accept(&mut self, tier: Tier, response: SessionResponse) -> Result<()> {
        let ticket = match response.ticket.as_deref() {
            Some(ticket) if !ticket.is_empty() => ticket.to_string(),
            _ => {
                let message = response.rejection_message();
                warn!(%tier, %message, "Session exchange rejected");
                return Err(ApiError::AuthRejected(message));
            }
        };

        let creds = &mut self.credentials;
        creds.set_ticket(tier, ticket, response.expiration.unwrap_or_default());
        if let Some(session_id) = response.session_id {
            creds.session_id = session_id;
        }
        if let Some(profile_id) = response.profile_id {
            creds.profile_id = profile_id;
        }
        if let Some(space_id) = response.space_id {
            creds.space_id = space_id;
        }
        if let Some(user_id) = response.user_id {
            creds.user_id = user_id;
        }
        self.rejected.clear();

        info!(%tier, expires = %self.credentials.expiry(tier), "Ticket acquired");
        self.persist()
    }
}
