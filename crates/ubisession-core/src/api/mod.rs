//! REST and GraphQL client module for Ubisoft services.
//!
//! This module provides the `ApiClient` for authenticated requests, the
//! `HttpSession` handle it sends them through, and the `ApiError` taxonomy.
//!
//! Requests are authorized with `Ubi_v1` tickets obtained through the
//! profiles sessions endpoint (see `crate::auth`).

pub mod client;
pub mod error;
pub mod graphql;
pub mod session;

pub use client::{ApiClient, GraphOutcome, RequestOptions};
pub use error::{ApiError, Result};
pub use session::{HttpSession, RawResponse};
