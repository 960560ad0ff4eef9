//! Credential Store Module
//!
//! Durable mapping from normalized email to account record, persisted in
//! local keyed storage.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::Storage;

/// Storage key holding the JSON array of accounts.
pub const ACCOUNTS_KEY: &str = "ecostream.accounts";

/// A persisted credential record. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    /// Normalized email; the unique key across all stored accounts.
    pub email: String,
    pub name: String,
    pub salt_hex: String,
    /// Digest of `saltHex + ":" + password`, never the raw password.
    pub password_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Trim and lowercase an email so case/whitespace variants map to one key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Fallback display name: the local part of the email, or "User".
pub fn default_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    if local.is_empty() {
        "User".to_string()
    } else {
        local.to_string()
    }
}

/// Generate a fresh unique account id.
pub fn new_account_id() -> String {
    format!("usr_{}", uuid::Uuid::new_v4().simple())
}

/// Account collection persisted at [`ACCOUNTS_KEY`].
#[derive(Clone)]
pub struct CredentialStore {
    storage: Storage,
}

impl CredentialStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Load all accounts. Missing, unreadable, or malformed storage yields
    /// an empty list, never an error.
    pub fn load(&self) -> Vec<Account> {
        match self.storage.load::<Vec<Account>>(ACCOUNTS_KEY) {
            Ok(Some(accounts)) => accounts,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Unreadable account store, starting empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Overwrite the full collection. Best-effort: a write failure is
    /// logged and swallowed (accepted lossy-write policy for this
    /// demo-grade store).
    pub fn save(&self, accounts: &[Account]) {
        if let Err(e) = self.storage.save(ACCOUNTS_KEY, &accounts) {
            warn!("Failed to persist accounts: {}", e);
        }
    }

    /// Look up an account by normalized email.
    pub fn find(&self, normalized_email: &str) -> Option<Account> {
        self.load().into_iter().find(|a| a.email == normalized_email)
    }
}
