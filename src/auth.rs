//! Authentication Module
//!
//! Register / sign-in operations over the local credential store, and
//! session state persisted separately from credentials.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::accounts::{
    default_name_from_email, new_account_id, normalize_email, Account, CredentialStore,
};
use crate::hashing::{hash_secret, random_salt_hex, DEFAULT_SALT_LEN};
use crate::storage::Storage;

/// Storage key holding the current session, or nothing when signed out.
pub const SESSION_KEY: &str = "ecostream.user";

/// Authentication failures, all caller-correctable business conditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Please enter a valid email.")]
    InvalidEmail,

    #[error("{0}")]
    InvalidPassword(&'static str),

    #[error("An account with that email already exists.")]
    Exists,

    #[error("No account found. Please create an account first.")]
    NotFound,

    #[error("Incorrect email or password.")]
    BadCredentials,
}

impl AuthError {
    /// Stable machine-readable code for UI dispatch.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "invalid_email",
            Self::InvalidPassword(_) => "invalid_password",
            Self::Exists => "exists",
            Self::NotFound => "not_found",
            Self::BadCredentials => "bad_credentials",
        }
    }
}

/// Public view of an account: never carries the hash or salt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// A successful sign-in, tagged with whether the account was auto-created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOutcome {
    pub account: AccountSummary,
    pub provisioned: bool,
}

/// Register / sign-in over the credential store.
#[derive(Clone)]
pub struct AuthService {
    store: CredentialStore,
}

impl AuthService {
    pub fn new(storage: Storage) -> Self {
        Self {
            store: CredentialStore::new(storage),
        }
    }

    /// Create a new account.
    ///
    /// Fails with `invalid_email` when the normalized email has no `@`,
    /// `invalid_password` when shorter than 4 characters, and `exists`
    /// when the normalized email is already registered.
    pub fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
    ) -> Result<AccountSummary, AuthError> {
        let normalized = normalize_email(email);
        if !normalized.contains('@') {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < 4 {
            return Err(AuthError::InvalidPassword(
                "Password must be at least 4 characters.",
            ));
        }

        let mut accounts = self.store.load();
        if accounts.iter().any(|a| a.email == normalized) {
            return Err(AuthError::Exists);
        }

        let salt_hex = random_salt_hex(DEFAULT_SALT_LEN);
        let password_hash = hash_secret(&salt_hex, password);

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_name_from_email(&normalized));

        let account = Account {
            id: new_account_id(),
            email: normalized,
            name,
            salt_hex,
            password_hash,
            created_at: chrono::Utc::now(),
        };

        let summary = AccountSummary {
            id: account.id.clone(),
            email: account.email.clone(),
            name: account.name.clone(),
        };

        accounts.push(account);
        self.store.save(&accounts);
        info!("Registered account for {}", summary.email);

        Ok(summary)
    }

    /// Verify credentials against the stored salt and hash.
    ///
    /// With `provision_if_missing`, an unknown email transparently
    /// registers instead: this is local-only demo auth with no real
    /// identity backing, so first-time sign-in doubles as signup.
    pub fn sign_in(
        &self,
        email: &str,
        password: &str,
        provision_if_missing: bool,
    ) -> Result<SignInOutcome, AuthError> {
        let normalized = normalize_email(email);
        if !normalized.contains('@') {
            return Err(AuthError::InvalidEmail);
        }
        if password.is_empty() {
            return Err(AuthError::InvalidPassword("Please enter your password."));
        }

        let Some(account) = self.store.find(&normalized) else {
            if !provision_if_missing {
                return Err(AuthError::NotFound);
            }
            let account = self.register(&normalized, password, None)?;
            info!("Provisioned account for {}", account.email);
            return Ok(SignInOutcome {
                account,
                provisioned: true,
            });
        };

        if hash_secret(&account.salt_hex, password) != account.password_hash {
            return Err(AuthError::BadCredentials);
        }

        Ok(SignInOutcome {
            account: AccountSummary {
                id: account.id,
                email: account.email,
                name: account.name,
            },
            provisioned: false,
        })
    }
}

/// The "currently signed in as" record. Holds no password material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub email: String,
    pub name: String,
    pub remember: bool,
    pub signed_in_at: chrono::DateTime<chrono::Utc>,
}

/// Persists the session at [`SESSION_KEY`], separate from credentials.
#[derive(Clone)]
pub struct SessionManager {
    storage: Storage,
}

impl SessionManager {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// The stored session, if any is readable.
    pub fn current(&self) -> Option<Session> {
        match self.storage.load::<Session>(SESSION_KEY) {
            Ok(session) => session,
            Err(e) => {
                warn!("Unreadable stored session: {}", e);
                None
            }
        }
    }

    /// Turn a successful sign-in into the persisted session, replacing any
    /// prior one.
    pub fn establish(&self, account: &AccountSummary, remember: bool) -> Session {
        let session = Session {
            email: account.email.clone(),
            name: account.name.clone(),
            remember,
            signed_in_at: chrono::Utc::now(),
        };
        if let Err(e) = self.storage.save(SESSION_KEY, &session) {
            warn!("Failed to persist session: {}", e);
        }
        info!("Session established for {}", session.email);
        session
    }

    /// Sign out: destroy the stored session.
    pub fn clear(&self) {
        if let Err(e) = self.storage.delete(SESSION_KEY) {
            warn!("Failed to clear session: {}", e);
        }
        info!("Session cleared");
    }
}
