pub mod error;
pub mod provider;
pub mod steps;
pub mod types;

pub use error::{ProviderError, Result};
pub use provider::{AuthEvent, IdentityProvider};
pub use steps::{
    ResetPasswordNextStep, ResetPasswordResult, SignInNextStep, SignInResult, SignUpNextStep,
    SignUpResult,
};
pub use types::{
    AttributeKey, AuthSession, DeliveryDetails, DeliveryMedium, MfaKind, SessionOptions,
    SignOutResult, TotpSetupDetails, User, UserAttribute,
};
