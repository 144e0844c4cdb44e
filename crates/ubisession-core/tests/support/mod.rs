// Not every test binary uses every helper
#![allow(dead_code)]

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use ubisession_core::{Account, Config, CredentialStore, Credentials};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const BASIC_TOKEN: &str = "dGVzdDp0ZXN0";
pub const PRIMARY: &str = "primary-ticket";
pub const SECONDARY: &str = "secondary-ticket";
pub const SESSION_ID: &str = "session-1";
pub const SESSIONS_PATH: &str = "/v3/profiles/sessions";
pub const GRAPHQL_PATH: &str = "/v1/profiles/me/uplay/graphql";

/// Expiry string `offset` from now, with the seven fractional digits the
/// service uses.
pub fn expiry_in(offset: Duration) -> String {
    format!("{}1Z", (Utc::now() + offset).format("%Y-%m-%dT%H:%M:%S%.6f"))
}

pub fn config(server: &MockServer, dir: &TempDir, max_connect_retries: u32) -> Config {
    Config {
        creds_dir: Some(dir.path().to_path_buf()),
        max_connect_retries,
        request_timeout_secs: 5,
        session_url: format!("{}{}", server.uri(), SESSIONS_PATH),
        graphql_url: format!("{}{}", server.uri(), GRAPHQL_PATH),
        ..Config::default()
    }
    .with_account(Account::BasicToken(BASIC_TOKEN.to_string()))
}

pub fn store(config: &Config) -> CredentialStore {
    let account = config.account.as_ref().expect("test config has an account");
    CredentialStore::new(config.creds_path(account))
}

/// Write a credentials file as a previous run would have left it.
pub fn seed(config: &Config, primary: Duration, secondary: Duration) -> Credentials {
    let creds = Credentials {
        session_id: SESSION_ID.to_string(),
        primary_ticket: PRIMARY.to_string(),
        primary_expiry: expiry_in(primary),
        secondary_ticket: SECONDARY.to_string(),
        secondary_expiry: expiry_in(secondary),
        profile_id: "profile-1".to_string(),
        ..Credentials::default()
    };
    store(config).save(&creds).expect("seed credentials");
    creds
}

pub fn session_body(ticket: &str) -> Value {
    json!({
        "ticket": ticket,
        "expiration": expiry_in(Duration::hours(3)),
        "profileId": "profile-1",
        "sessionId": SESSION_ID,
        "spaceId": "space-1",
        "userId": "user-1",
    })
}

/// Basic-auth exchange answering with the primary ticket.
pub async fn mount_primary_exchange(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path(SESSIONS_PATH))
        .and(header("Authorization", format!("Basic {BASIC_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(PRIMARY)))
        .expect(expected)
        .mount(server)
        .await;
}

/// Primary-ticket exchange answering with the secondary ticket.
pub async fn mount_secondary_exchange(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path(SESSIONS_PATH))
        .and(header("Authorization", format!("Ubi_v1 t={PRIMARY}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(SECONDARY)))
        .expect(expected)
        .mount(server)
        .await;
}

/// Any session exchange at all.
pub async fn forbid_exchanges(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(SESSIONS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}
