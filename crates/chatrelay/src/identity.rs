//! Credential provider seam and user identifiers
//!
//! The relay core only needs an opaque, stable user identifier to key the
//! document store. User IDs must be alphanumeric with underscores and
//! hyphens, max 128 chars, which also keeps them safe as path components
//! for file-backed stores.

use std::sync::RwLock;

use thiserror::Error;

/// Maximum length for user IDs
const MAX_USER_ID_LEN: usize = 128;

/// Errors that can occur during user ID validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UserIdError {
    /// User ID is empty
    #[error("User ID cannot be empty")]
    Empty,

    /// User ID contains invalid characters
    #[error("User ID contains invalid characters: allowed are a-z, A-Z, 0-9, _, -")]
    InvalidChars,

    /// User ID exceeds maximum length
    #[error("User ID exceeds maximum length of {MAX_USER_ID_LEN} characters")]
    TooLong,
}

/// A validated user ID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), UserIdError> {
        if s.is_empty() {
            return Err(UserIdError::Empty);
        }

        if s.len() > MAX_USER_ID_LEN {
            return Err(UserIdError::TooLong);
        }

        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(UserIdError::InvalidChars);
        }

        Ok(())
    }
}

impl TryFrom<&str> for UserId {
    type Error = UserIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::validate(value)?;
        Ok(UserId(value.to_string()))
    }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)?;
        Ok(UserId(value))
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of the currently authenticated identity
pub trait CredentialProvider: Send + Sync {
    /// The signed-in user, or `None` when nobody is authenticated
    fn current_user(&self) -> Option<UserId>;

    /// Forget the current identity
    fn sign_out(&self);
}

/// Credential provider holding a fixed, pre-authenticated user
#[derive(Debug, Default)]
pub struct StaticCredentials {
    user: RwLock<Option<UserId>>,
}

impl StaticCredentials {
    pub fn new(user: UserId) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    /// A provider with nobody signed in
    pub fn signed_out() -> Self {
        Self::default()
    }
}

impl CredentialProvider for StaticCredentials {
    fn current_user(&self) -> Option<UserId> {
        self.user.read().ok().and_then(|user| user.clone())
    }

    fn sign_out(&self) {
        if let Ok(mut user) = self.user.write() {
            if let Some(previous) = user.take() {
                tracing::info!(user = %previous, "Signed out");
            }
        }
    }
}
