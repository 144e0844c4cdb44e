//! Utility functions for response text handling.

pub mod format;

pub use format::{extract_html_message, json_text, truncate};
