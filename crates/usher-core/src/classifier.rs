use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use usher_provider::ProviderError;

use crate::step::StepKind;

/// User-facing text produced by classification. The content is exactly
/// what a message banner renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayMessage {
    content: Cow<'static, str>,
}

impl DisplayMessage {
    pub fn new(content: impl Into<Cow<'static, str>>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.content
    }
}

impl fmt::Display for DisplayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// Default message text. Hosts localize by replacing entries through the
/// catalog's override hook.
pub mod messages {
    pub const INCORRECT_CREDENTIALS: &str = "Incorrect username or password.";
    pub const PASSWORD_ATTEMPTS_EXCEEDED: &str =
        "Password attempts exceeded. Try again in a while.";
    pub const NO_MFA_SELECTION: &str = "Select how you want to receive your code.";
    pub const CONNECTIVITY: &str =
        "Unable to reach the authentication service. Check your connection and try again.";
    pub const USER_NOT_FOUND: &str = "No account matches that username.";
    pub const USER_NOT_CONFIRMED: &str = "This account still needs to be confirmed.";
    pub const USERNAME_EXISTS: &str = "An account with that username already exists.";
    pub const ALIAS_EXISTS: &str = "That email or phone number is already in use.";
    pub const CODE_MISMATCH: &str = "The confirmation code does not match.";
    pub const CODE_EXPIRED: &str = "The confirmation code has expired. Request a new one.";
    pub const CODE_DELIVERY_FAILURE: &str = "The confirmation code could not be delivered.";
    pub const INVALID_PASSWORD: &str = "That password does not meet the requirements.";
    pub const INVALID_PARAMETER: &str = "One of the submitted values was rejected.";
    pub const LIMIT_EXCEEDED: &str = "Attempt limit exceeded. Try again later.";
    pub const TOO_MANY_REQUESTS: &str = "Too many requests. Wait a moment and try again.";
    pub const PASSWORD_RESET_REQUIRED: &str = "Your password must be reset before signing in.";
    pub const EXPIRED_SESSION: &str = "Your session has expired. Sign in again.";
    pub const MFA_METHOD_NOT_FOUND: &str = "The selected MFA method is not available.";
    pub const MISCONFIGURED: &str = "The authentication service is not configured correctly.";
    pub const UNKNOWN: &str = "Something went wrong. Try again.";
}

/// The description providers attach to a lockout rejection.
const PASSWORD_ATTEMPTS_DESCRIPTION: &str = "Password attempts exceeded";

/// Field name reported when a sign-in challenge answer fails validation.
const CHALLENGE_RESPONSE_FIELD: &str = "challenge_response";

/// Highest-precedence hook: the first error it maps wins over every
/// built-in rule.
pub type MessageOverride = Arc<dyn Fn(&ProviderError) -> Option<DisplayMessage> + Send + Sync>;

/// Maps provider errors to user-facing messages.
///
/// Classification is pure apart from one `tracing::error!` per call, so
/// classifying the same error twice yields identical content.
#[derive(Clone, Default)]
pub struct MessageCatalog {
    override_hook: Option<MessageOverride>,
}

impl MessageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(hook: MessageOverride) -> Self {
        Self {
            override_hook: Some(hook),
        }
    }

    /// Classify `error` into the message shown on the step it happened on.
    /// `at` is the step kind the flow was on when the error surfaced.
    pub fn classify(&self, error: &ProviderError, at: StepKind) -> DisplayMessage {
        let message = self.resolve(error, at);
        tracing::error!(step = %at, error = %error, message = %message, "classified provider error");
        message
    }

    fn resolve(&self, error: &ProviderError, at: StepKind) -> DisplayMessage {
        if let Some(hook) = &self.override_hook {
            if let Some(message) = hook(error) {
                return message;
            }
        }

        if let ProviderError::NotAuthorized { description } = error {
            return if description == PASSWORD_ATTEMPTS_DESCRIPTION {
                DisplayMessage::new(messages::PASSWORD_ATTEMPTS_EXCEEDED)
            } else {
                DisplayMessage::new(messages::INCORRECT_CREDENTIALS)
            };
        }

        if let ProviderError::Validation { field, .. } = error {
            if field == CHALLENGE_RESPONSE_FIELD && at == StepKind::ContinueSignInWithMfaSelection
            {
                return DisplayMessage::new(messages::NO_MFA_SELECTION);
            }
            // Other validation failures fall through to the generic rules.
        }

        // Connectivity wins over the per-code table: a timeout wrapped in a
        // provider error is still a connectivity problem to the user.
        if error.is_connectivity() {
            return DisplayMessage::new(messages::CONNECTIVITY);
        }

        if let Some(registered) = registered_message(error) {
            return DisplayMessage::new(registered);
        }

        DisplayMessage::new(messages::UNKNOWN)
    }
}

impl fmt::Debug for MessageCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCatalog")
            .field("override_hook", &self.override_hook.is_some())
            .finish()
    }
}

fn registered_message(error: &ProviderError) -> Option<&'static str> {
    match error {
        ProviderError::UserNotFound => Some(messages::USER_NOT_FOUND),
        ProviderError::UserNotConfirmed => Some(messages::USER_NOT_CONFIRMED),
        ProviderError::UsernameExists => Some(messages::USERNAME_EXISTS),
        ProviderError::AliasExists => Some(messages::ALIAS_EXISTS),
        ProviderError::CodeMismatch => Some(messages::CODE_MISMATCH),
        ProviderError::CodeExpired => Some(messages::CODE_EXPIRED),
        ProviderError::CodeDeliveryFailure => Some(messages::CODE_DELIVERY_FAILURE),
        ProviderError::InvalidPassword { .. } => Some(messages::INVALID_PASSWORD),
        ProviderError::InvalidParameter { .. } => Some(messages::INVALID_PARAMETER),
        ProviderError::LimitExceeded => Some(messages::LIMIT_EXCEEDED),
        ProviderError::TooManyRequests => Some(messages::TOO_MANY_REQUESTS),
        ProviderError::PasswordResetRequired => Some(messages::PASSWORD_RESET_REQUIRED),
        ProviderError::ExpiredSession => Some(messages::EXPIRED_SESSION),
        ProviderError::MfaMethodNotFound => Some(messages::MFA_METHOD_NOT_FOUND),
        ProviderError::Configuration(_) => Some(messages::MISCONFIGURED),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_authorized(description: &str) -> ProviderError {
        ProviderError::NotAuthorized {
            description: description.to_string(),
        }
    }

    async fn connectivity_error() -> ProviderError {
        // Nothing listens on port 1; the connect is refused locally.
        let err = reqwest::get("http://127.0.0.1:1/").await.unwrap_err();
        assert!(err.is_connect());
        ProviderError::Network(err)
    }

    #[test]
    fn lockout_description_gets_the_dedicated_message() {
        let catalog = MessageCatalog::new();
        let message = catalog.classify(
            &not_authorized("Password attempts exceeded"),
            StepKind::SignIn,
        );
        assert_eq!(message.text(), messages::PASSWORD_ATTEMPTS_EXCEEDED);
    }

    #[test]
    fn other_not_authorized_descriptions_read_as_incorrect_credentials() {
        let catalog = MessageCatalog::new();
        let message = catalog.classify(&not_authorized("bad password"), StepKind::SignIn);
        assert_eq!(message.text(), messages::INCORRECT_CREDENTIALS);
    }

    #[test]
    fn challenge_validation_on_mfa_selection_means_no_selection() {
        let catalog = MessageCatalog::new();
        let error = ProviderError::Validation {
            field: "challenge_response".to_string(),
            message: "must not be empty".to_string(),
        };
        let message = catalog.classify(&error, StepKind::ContinueSignInWithMfaSelection);
        assert_eq!(message.text(), messages::NO_MFA_SELECTION);

        // The same error anywhere else falls through to the generic branch.
        let elsewhere = catalog.classify(&error, StepKind::SignIn);
        assert_eq!(elsewhere.text(), messages::UNKNOWN);
    }

    #[tokio::test]
    async fn connectivity_beats_the_code_table() {
        let catalog = MessageCatalog::new();
        let message = catalog.classify(&connectivity_error().await, StepKind::SignIn);
        assert_eq!(message.text(), messages::CONNECTIVITY);
    }

    #[test]
    fn registered_codes_map_to_their_strings() {
        let catalog = MessageCatalog::new();
        let cases = [
            (ProviderError::UserNotFound, messages::USER_NOT_FOUND),
            (ProviderError::CodeMismatch, messages::CODE_MISMATCH),
            (ProviderError::LimitExceeded, messages::LIMIT_EXCEEDED),
            (
                ProviderError::Configuration("missing pool id".to_string()),
                messages::MISCONFIGURED,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(catalog.classify(&error, StepKind::SignIn).text(), expected);
        }
    }

    #[test]
    fn unrecognized_errors_fall_back_to_unknown() {
        let catalog = MessageCatalog::new();
        let error = ProviderError::InvalidState("surprise".to_string());
        assert_eq!(
            catalog.classify(&error, StepKind::SignIn).text(),
            messages::UNKNOWN
        );
    }

    #[test]
    fn override_hook_wins_over_everything() {
        let catalog = MessageCatalog::with_override(Arc::new(|error| {
            if matches!(error, ProviderError::NotAuthorized { .. }) {
                Some(DisplayMessage::new("custom text"))
            } else {
                None
            }
        }));
        let overridden = catalog.classify(
            &not_authorized("Password attempts exceeded"),
            StepKind::SignIn,
        );
        assert_eq!(overridden.text(), "custom text");

        // Errors the hook declines still take the normal path.
        let fallback = catalog.classify(&ProviderError::UserNotFound, StepKind::SignIn);
        assert_eq!(fallback.text(), messages::USER_NOT_FOUND);
    }

    #[test]
    fn classification_is_idempotent() {
        let catalog = MessageCatalog::new();
        let error = not_authorized("bad password");
        let first = catalog.classify(&error, StepKind::SignIn);
        let second = catalog.classify(&error, StepKind::SignIn);
        assert_eq!(first, second);
        assert_eq!(first.text(), second.text());
    }
}
