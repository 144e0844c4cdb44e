//! Core library for ubisession.
//!
//! Provides an authenticated client for the Ubisoft services API that keeps a
//! two-tier ticket pair alive across restarts:
//! - `auth`: credential persistence and the ticket lifecycle
//! - `api`: the HTTP session handle, request executor and error taxonomy
//! - `models`: decoded marketplace data
//! - `config`: client settings loaded from disk and the environment

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, GraphOutcome, RequestOptions};
pub use auth::{Credentials, CredentialStore, LifecycleState, Tier, TokenLifecycle};
pub use config::{Account, Config};
pub use models::MarketSnapshot;
