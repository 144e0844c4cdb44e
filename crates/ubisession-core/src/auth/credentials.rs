use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::Tier;
use crate::api::{ApiError, Result};

/// The persisted ticket record for one account.
///
/// An empty ticket means the tier was never acquired into this file; its
/// expiry is meaningless until the ticket is set. Keys match the on-disk
/// format written by earlier releases, and `null` loads as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "sessionid", default, deserialize_with = "null_as_empty")]
    pub session_id: String,
    #[serde(rename = "key", default, deserialize_with = "null_as_empty")]
    pub primary_ticket: String,
    #[serde(rename = "new_key", default, deserialize_with = "null_as_empty")]
    pub secondary_ticket: String,
    #[serde(rename = "spaceid", default, deserialize_with = "null_as_empty")]
    pub space_id: String,
    #[serde(rename = "profileid", default, deserialize_with = "null_as_empty")]
    pub profile_id: String,
    #[serde(rename = "userid", default, deserialize_with = "null_as_empty")]
    pub user_id: String,
    #[serde(rename = "expiration", default, deserialize_with = "null_as_empty")]
    pub primary_expiry: String,
    #[serde(rename = "new_expiration", default, deserialize_with = "null_as_empty")]
    pub secondary_expiry: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Credentials {
    pub fn ticket(&self, tier: Tier) -> &str {
        match tier {
            Tier::Primary => &self.primary_ticket,
            Tier::Secondary => &self.secondary_ticket,
        }
    }

    pub fn expiry(&self, tier: Tier) -> &str {
        match tier {
            Tier::Primary => &self.primary_expiry,
            Tier::Secondary => &self.secondary_expiry,
        }
    }

    pub fn set_ticket(&mut self, tier: Tier, ticket: String, expiry: String) {
        match tier {
            Tier::Primary => {
                self.primary_ticket = ticket;
                self.primary_expiry = expiry;
            }
            Tier::Secondary => {
                self.secondary_ticket = ticket;
                self.secondary_expiry = expiry;
            }
        }
    }

    /// Forget a tier's ticket so the next request reacquires it.
    pub fn clear_ticket(&mut self, tier: Tier) {
        match tier {
            Tier::Primary => self.primary_ticket.clear(),
            Tier::Secondary => self.secondary_ticket.clear(),
        }
    }
}

/// JSON file holding one account's [`Credentials`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, or an empty one if the file does not exist.
    pub fn load(&self) -> Result<Credentials> {
        Ok(self.read()?.unwrap_or_default())
    }

    /// Load the record, distinguishing a missing file from an empty record.
    pub fn read(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| ApiError::storage(&self.path, e))?;
        let credentials =
            serde_json::from_str(&contents).map_err(|e| ApiError::storage(&self.path, e))?;
        Ok(Some(credentials))
    }

    /// Overwrite the file with a full snapshot of `credentials`.
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ApiError::storage(parent, e))?;
        }
        let contents = serde_json::to_string_pretty(credentials)
            .map_err(|e| ApiError::storage(&self.path, e))?;
        std::fs::write(&self.path, contents).map_err(|e| ApiError::storage(&self.path, e))?;
        debug!(path = %self.path.display(), "Credentials saved");
        Ok(())
    }

    /// Delete the file. A missing file is not an error.
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::storage(&self.path, e)),
        }
    }
}
