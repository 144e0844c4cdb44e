//! Authentication module for managing tickets and their persistence.
//!
//! This module provides:
//! - `CredentialStore`: JSON file holding one account's tickets
//! - `TokenLifecycle`: primary/secondary ticket acquisition, expiry tracking
//!   and the login cooldown

pub mod credentials;
pub mod tickets;

pub use credentials::{CredentialStore, Credentials};
pub use tickets::{parse_expiry, LifecycleState, Tier, TokenLifecycle, LOGIN_COOLDOWN_SECS};
