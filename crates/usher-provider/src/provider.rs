use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::steps::{ResetPasswordResult, SignInResult, SignUpResult};
use crate::types::{
    AttributeKey, AuthSession, DeliveryDetails, SessionOptions, SignOutResult, User,
    UserAttribute,
};

/// Out-of-band notification pushed by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    /// The session was terminated outside this flow (another device, an
    /// administrative revocation, ...).
    SignedOut,
    /// The provider could no longer refresh the session's credentials.
    SessionExpired,
}

/// The identity-provider operations the flow orchestrator consumes.
///
/// Implementations wrap a concrete backend or a test double. Every call
/// may fail with a [`ProviderError`](crate::error::ProviderError); the
/// orchestrator classifies failures into user-facing messages and never
/// treats them as fatal to the flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start a sign-in ceremony. Both fields are optional to leave room
    /// for custom passwordless flows.
    async fn sign_in(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<SignInResult>;

    /// Answer the current sign-in challenge (code, new password, MFA
    /// selection token, custom challenge response).
    async fn confirm_sign_in(&self, challenge_response: &str) -> Result<SignInResult>;

    async fn sign_up(
        &self,
        username: &str,
        password: Option<&str>,
        attributes: &[UserAttribute],
    ) -> Result<SignUpResult>;

    async fn confirm_sign_up(&self, username: &str, code: &str) -> Result<SignUpResult>;

    async fn resend_sign_up_code(&self, username: &str) -> Result<DeliveryDetails>;

    async fn reset_password(&self, username: &str) -> Result<ResetPasswordResult>;

    async fn confirm_reset_password(
        &self,
        username: &str,
        new_password: &str,
        code: &str,
    ) -> Result<()>;

    /// Attributes of the currently signed-in user.
    async fn fetch_user_attributes(&self) -> Result<Vec<UserAttribute>>;

    /// Send (or re-send) a verification code for one attribute.
    async fn resend_confirmation_code(&self, attribute: &AttributeKey)
    -> Result<DeliveryDetails>;

    async fn confirm_user_attribute(&self, attribute: &AttributeKey, code: &str) -> Result<()>;

    async fn current_user(&self) -> Result<User>;

    async fn fetch_session(&self, options: SessionOptions) -> Result<AuthSession>;

    async fn sign_out(&self) -> Result<SignOutResult>;

    /// Reports whether the provider is usable at all. Checked once when a
    /// flow is constructed; an error here puts the flow in its terminal
    /// error step before anything runs.
    fn ready(&self) -> Result<()> {
        Ok(())
    }

    /// Push-style notification channel, when the provider has one.
    fn events(&self) -> Option<broadcast::Receiver<AuthEvent>> {
        None
    }
}
