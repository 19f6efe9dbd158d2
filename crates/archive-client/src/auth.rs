//! Authenticated session model.
//!
//! Authentication itself happens in an external collaborator; the core only
//! holds the opaque session token it hands back, plus the user profile and
//! optional object-store credentials needed by ordering and cloud access.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::errors::ClientError;

/// Opaque authenticated session handle.
///
/// Created once by the [`Authenticator`] collaborator and passed by
/// reference into every operation that needs it. The core never mutates it.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    email: Option<String>,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Account email, when the authenticator supplied a profile.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

/// User profile returned by the authentication collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub email_address: String,
}

/// Temporary object-store credentials for cloud-hosted granule access.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudCredentials {
    #[serde(rename = "accessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "secretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "sessionToken")]
    pub session_token: String,
    #[serde(default, rename = "expiration")]
    pub expiration: Option<String>,
}

/// External authentication collaborator.
pub trait Authenticator {
    /// Create an authenticated session. Option keys are passed through to
    /// the underlying credential strategy.
    fn login(&self, options: &BTreeMap<String, String>) -> Result<Session, ClientError>;

    /// Profile of the logged-in user.
    fn user_profile(&self) -> Result<UserProfile, ClientError>;

    /// Temporary credentials for cloud-hosted holdings.
    fn cloud_credentials(&self) -> Result<CloudCredentials, ClientError> {
        Err(ClientError::AuthFailed(
            "this authenticator does not issue cloud credentials".to_string(),
        ))
    }
}
