use std::collections::BTreeSet;

use usher_provider::{
    AttributeKey, IdentityProvider, ProviderError, ResetPasswordNextStep, SignInNextStep,
    SignUpNextStep, UserAttribute,
};

use crate::classifier::MessageCatalog;
use crate::credentials::Credentials;
use crate::step::{Step, StepKind};

/// Decide the next [`Step`] from a sign-in result. Most arms are direct
/// mappings; `ResetPassword` and `Done` need further provider round-trips
/// before the step is known.
pub(crate) async fn resolve_sign_in(
    provider: &dyn IdentityProvider,
    credentials: &Credentials,
    next: SignInNextStep,
) -> Result<Step, ProviderError> {
    match next {
        SignInNextStep::ConfirmSignInWithSmsMfaCode { delivery }
        | SignInNextStep::ConfirmSignInWithEmailMfaCode { delivery } => {
            Ok(Step::ConfirmSignInWithMfaCode { delivery })
        }
        SignInNextStep::ConfirmSignInWithCustomChallenge => {
            Ok(Step::ConfirmSignInWithCustomChallenge)
        }
        SignInNextStep::ConfirmSignInWithNewPassword => Ok(Step::ConfirmSignInWithNewPassword),
        SignInNextStep::ConfirmSignInWithTotpCode => Ok(Step::ConfirmSignInWithTotpCode),
        SignInNextStep::ContinueSignInWithMfaSelection { allowed } => {
            Ok(Step::ContinueSignInWithMfaSelection { allowed })
        }
        SignInNextStep::ContinueSignInWithMfaSetupSelection { allowed } => {
            Ok(Step::ContinueSignInWithMfaSetupSelection { allowed })
        }
        SignInNextStep::ContinueSignInWithEmailMfaSetup => {
            Ok(Step::ContinueSignInWithEmailMfaSetup)
        }
        SignInNextStep::ContinueSignInWithTotpSetup { details } => {
            Ok(Step::ContinueSignInWithTotpSetup { details })
        }
        SignInNextStep::ResetPassword => {
            reset_password_during_sign_in(provider, credentials).await
        }
        SignInNextStep::ConfirmSignUp { delivery } => Ok(Step::ConfirmSignUp { delivery }),
        SignInNextStep::Done => resolve_signed_in(provider).await,
        other => Err(ProviderError::InvalidState(format!(
            "unhandled sign-in next step: {other:?}"
        ))),
    }
}

/// Decide the next [`Step`] from a sign-up result. `Done` chains straight
/// into a sign-in with the captured credentials so a confirmed user never
/// lands on an empty form.
pub(crate) async fn resolve_sign_up(
    provider: &dyn IdentityProvider,
    credentials: &Credentials,
    catalog: &MessageCatalog,
    next: SignUpNextStep,
) -> Result<Step, ProviderError> {
    match next {
        SignUpNextStep::ConfirmUser { delivery } => Ok(Step::ConfirmSignUp { delivery }),
        SignUpNextStep::Done => {
            let username = credentials.username();
            let password = credentials.password();
            match provider
                .sign_in(username.as_deref(), password.as_deref())
                .await
            {
                Ok(result) => resolve_sign_in(provider, credentials, result.next_step).await,
                Err(error) => {
                    // Auto sign-in failing is not a dead end: park the
                    // message and hand the user the pre-filled form.
                    let message = catalog.classify(&error, StepKind::SignUp);
                    credentials.set_message(message);
                    Ok(Step::SignIn)
                }
            }
        }
        other => Err(ProviderError::InvalidState(format!(
            "unhandled sign-up next step: {other:?}"
        ))),
    }
}

/// Shared mapping for reset-password results.
pub(crate) fn resolve_reset_password(next: ResetPasswordNextStep) -> Result<Step, ProviderError> {
    match next {
        ResetPasswordNextStep::ConfirmResetPasswordWithCode { delivery } => {
            Ok(Step::ConfirmResetPassword { delivery })
        }
        ResetPasswordNextStep::Done => {
            tracing::warn!("reset password reported done without a confirmation step");
            Ok(Step::SignIn)
        }
        other => Err(ProviderError::InvalidState(format!(
            "unhandled reset-password next step: {other:?}"
        ))),
    }
}

/// The provider demanded a password reset mid-sign-in. Kick it off right
/// away so the user lands on the confirm step with a code already sent;
/// if that fails they re-initiate manually from the reset step.
async fn reset_password_during_sign_in(
    provider: &dyn IdentityProvider,
    credentials: &Credentials,
) -> Result<Step, ProviderError> {
    let username = credentials.username().unwrap_or_default();
    let resolved = provider
        .reset_password(&username)
        .await
        .and_then(|result| resolve_reset_password(result.next_step));
    match resolved {
        Ok(step) => Ok(step),
        Err(error) => {
            tracing::warn!(error = %error, "reset password during sign-in failed");
            Ok(Step::ResetPassword)
        }
    }
}

/// `Done` from the provider is not yet signed-in for the flow: a user
/// whose verifiable attributes are all unverified goes to attribute
/// verification first. A user with no verifiable attributes at all must
/// not be stuck waiting to verify something that will never exist.
async fn resolve_signed_in(provider: &dyn IdentityProvider) -> Result<Step, ProviderError> {
    let attributes = provider.fetch_user_attributes().await?;
    let (verified, unverified) = partition_verifiable(&attributes);
    if !verified.is_empty() || unverified.is_empty() {
        let user = provider.current_user().await?;
        Ok(Step::SignedIn { user })
    } else {
        Ok(Step::VerifyUser { unverified })
    }
}

/// Split the verifiable attribute kinds by their verification flags:
/// flag "true" counts as verified, any other present value as unverified,
/// and an absent flag as neither.
fn partition_verifiable(
    attributes: &[UserAttribute],
) -> (BTreeSet<AttributeKey>, BTreeSet<AttributeKey>) {
    let mut verified = BTreeSet::new();
    let mut unverified = BTreeSet::new();
    for kind in [AttributeKey::Email, AttributeKey::PhoneNumber] {
        if let Some(flag) = kind.verification_flag() {
            match attributes.iter().find(|attribute| attribute.key == flag) {
                Some(attribute) if attribute.value == "true" => {
                    verified.insert(kind);
                }
                Some(_) => {
                    unverified.insert(kind);
                }
                None => {}
            }
        }
    }
    (verified, unverified)
}
