use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors surfaced by an identity-provider implementation.
///
/// Non-exhaustive so providers can grow new failure kinds without breaking
/// consumers; unrecognized kinds fall through to the generic branch of the
/// message classifier.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("not authorized: {description}")]
    NotAuthorized { description: String },

    #[error("user not found")]
    UserNotFound,

    #[error("user is not confirmed")]
    UserNotConfirmed,

    #[error("username already exists")]
    UsernameExists,

    #[error("alias already registered to another account")]
    AliasExists,

    #[error("confirmation code mismatch")]
    CodeMismatch,

    #[error("confirmation code expired")]
    CodeExpired,

    #[error("confirmation code could not be delivered")]
    CodeDeliveryFailure,

    #[error("invalid password: {message}")]
    InvalidPassword { message: String },

    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("attempt limit exceeded")]
    LimitExceeded,

    #[error("too many requests")]
    TooManyRequests,

    #[error("password reset required")]
    PasswordResetRequired,

    #[error("session expired")]
    ExpiredSession,

    #[error("requested MFA method is not configured")]
    MfaMethodNotFound,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider configuration error: {0}")]
    Configuration(String),

    #[error("invalid provider state: {0}")]
    InvalidState(String),
}

impl ProviderError {
    /// True when the failure happened getting to the provider rather than
    /// as a verdict from it.
    pub fn is_connectivity(&self) -> bool {
        match self {
            ProviderError::Network(err) => {
                err.is_connect() || err.is_timeout() || err.is_request()
            }
            _ => false,
        }
    }
}
