//! Seam to the hosted identity provider (password and OAuth sign-in).

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AuthProvider, AuthUser};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl From<OAuthProvider> for AuthProvider {
    fn from(value: OAuthProvider) -> Self {
        match value {
            OAuthProvider::Google => AuthProvider::Google,
            OAuthProvider::Github => AuthProvider::Github,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Invalid email or password.")]
    InvalidCredential,
    #[error("An account already exists with this email.")]
    EmailInUse,
    #[error("Sign-in popup was closed before completing.")]
    PopupClosed,
    #[error("This domain is not authorized for sign-in.")]
    UnauthorizedDomain,
    #[error("Not signed in.")]
    NoCurrentUser,
    #[error("{0}")]
    Other(String),
}

impl IdentityError {
    /// Map the provider's `auth/...` error codes onto the variants we surface.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        match code {
            "auth/invalid-credential" | "auth/wrong-password" | "auth/user-not-found"
            | "auth/invalid-email" => IdentityError::InvalidCredential,
            "auth/email-already-in-use" => IdentityError::EmailInUse,
            "auth/popup-closed-by-user" | "auth/cancelled-popup-request" => {
                IdentityError::PopupClosed
            }
            "auth/unauthorized-domain" => IdentityError::UnauthorizedDomain,
            _ => IdentityError::Other(message.into()),
        }
    }
}

/// Source of the bearer token attached to every backend request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// `Ok(None)` when nobody is signed in.
    async fn id_token(&self) -> Result<Option<String>, IdentityError>;
}

#[async_trait]
pub trait IdentityProvider: TokenSource {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, IdentityError>;

    async fn sign_in_with_oauth(&self, provider: OAuthProvider) -> Result<AuthUser, IdentityError>;

    async fn create_user(&self, email: &str, password: &str) -> Result<AuthUser, IdentityError>;

    async fn update_profile(
        &self,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> Result<(), IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;
}

/// No identity at all; requests go out without an authorization header.
#[derive(Clone, Copy, Debug, Default)]
pub struct Anonymous;

#[async_trait]
impl TokenSource for Anonymous {
    async fn id_token(&self) -> Result<Option<String>, IdentityError> {
        Ok(None)
    }
}

/// A token handed over out of band, e.g. from the environment.
#[derive(Clone, Debug)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn id_token(&self) -> Result<Option<String>, IdentityError> {
        Ok(Some(self.0.clone()))
    }
}

