use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use usher_provider::{AttributeKey, DeliveryDetails, MfaKind, TotpSetupDetails, User};

use crate::classifier::DisplayMessage;

/// Where the user currently is in the authentication ceremony. The single
/// source of truth the presentation layer renders against.
///
/// Each variant carries exactly what its step needs to render and act on,
/// nothing more. Equality is structural throughout; `SignedIn` compares by
/// user identity (username + id), and the set-valued payloads compare as
/// sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Transient initial state while bootstrap resolves the session.
    Loading,
    /// Terminal. Once here, no further step changes are honored.
    Error { message: DisplayMessage },
    SignIn,
    ConfirmSignInWithCustomChallenge,
    ConfirmSignInWithTotpCode,
    ContinueSignInWithMfaSelection {
        allowed: BTreeSet<MfaKind>,
    },
    ContinueSignInWithMfaSetupSelection {
        allowed: BTreeSet<MfaKind>,
    },
    ContinueSignInWithEmailMfaSetup,
    ContinueSignInWithTotpSetup {
        details: TotpSetupDetails,
    },
    ConfirmSignInWithMfaCode {
        delivery: Option<DeliveryDetails>,
    },
    ConfirmSignInWithNewPassword,
    SignUp,
    ConfirmSignUp {
        delivery: Option<DeliveryDetails>,
    },
    ResetPassword,
    ConfirmResetPassword {
        delivery: Option<DeliveryDetails>,
    },
    VerifyUser {
        unverified: BTreeSet<AttributeKey>,
    },
    ConfirmVerifyUser {
        attribute: AttributeKey,
        delivery: Option<DeliveryDetails>,
    },
    SignedIn {
        user: User,
    },
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Loading => StepKind::Loading,
            Step::Error { .. } => StepKind::Error,
            Step::SignIn => StepKind::SignIn,
            Step::ConfirmSignInWithCustomChallenge => StepKind::ConfirmSignInWithCustomChallenge,
            Step::ConfirmSignInWithTotpCode => StepKind::ConfirmSignInWithTotpCode,
            Step::ContinueSignInWithMfaSelection { .. } => StepKind::ContinueSignInWithMfaSelection,
            Step::ContinueSignInWithMfaSetupSelection { .. } => {
                StepKind::ContinueSignInWithMfaSetupSelection
            }
            Step::ContinueSignInWithEmailMfaSetup => StepKind::ContinueSignInWithEmailMfaSetup,
            Step::ContinueSignInWithTotpSetup { .. } => StepKind::ContinueSignInWithTotpSetup,
            Step::ConfirmSignInWithMfaCode { .. } => StepKind::ConfirmSignInWithMfaCode,
            Step::ConfirmSignInWithNewPassword => StepKind::ConfirmSignInWithNewPassword,
            Step::SignUp => StepKind::SignUp,
            Step::ConfirmSignUp { .. } => StepKind::ConfirmSignUp,
            Step::ResetPassword => StepKind::ResetPassword,
            Step::ConfirmResetPassword { .. } => StepKind::ConfirmResetPassword,
            Step::VerifyUser { .. } => StepKind::VerifyUser,
            Step::ConfirmVerifyUser { .. } => StepKind::ConfirmVerifyUser,
            Step::SignedIn { .. } => StepKind::SignedIn,
        }
    }

    /// No transitions are honored out of a terminal step.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Error { .. })
    }

    /// The signed-in user, when the ceremony is complete.
    pub fn user(&self) -> Option<&User> {
        match self {
            Step::SignedIn { user } => Some(user),
            _ => None,
        }
    }
}

/// Fieldless projection of [`Step`]. Selects the active per-step state,
/// keys classifier context, and shows up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Loading,
    Error,
    SignIn,
    ConfirmSignInWithCustomChallenge,
    ConfirmSignInWithTotpCode,
    ContinueSignInWithMfaSelection,
    ContinueSignInWithMfaSetupSelection,
    ContinueSignInWithEmailMfaSetup,
    ContinueSignInWithTotpSetup,
    ConfirmSignInWithMfaCode,
    ConfirmSignInWithNewPassword,
    SignUp,
    ConfirmSignUp,
    ResetPassword,
    ConfirmResetPassword,
    VerifyUser,
    ConfirmVerifyUser,
    SignedIn,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Loading => "loading",
            StepKind::Error => "error",
            StepKind::SignIn => "sign_in",
            StepKind::ConfirmSignInWithCustomChallenge => "confirm_sign_in_with_custom_challenge",
            StepKind::ConfirmSignInWithTotpCode => "confirm_sign_in_with_totp_code",
            StepKind::ContinueSignInWithMfaSelection => "continue_sign_in_with_mfa_selection",
            StepKind::ContinueSignInWithMfaSetupSelection => {
                "continue_sign_in_with_mfa_setup_selection"
            }
            StepKind::ContinueSignInWithEmailMfaSetup => "continue_sign_in_with_email_mfa_setup",
            StepKind::ContinueSignInWithTotpSetup => "continue_sign_in_with_totp_setup",
            StepKind::ConfirmSignInWithMfaCode => "confirm_sign_in_with_mfa_code",
            StepKind::ConfirmSignInWithNewPassword => "confirm_sign_in_with_new_password",
            StepKind::SignUp => "sign_up",
            StepKind::ConfirmSignUp => "confirm_sign_up",
            StepKind::ResetPassword => "reset_password",
            StepKind::ConfirmResetPassword => "confirm_reset_password",
            StepKind::VerifyUser => "verify_user",
            StepKind::ConfirmVerifyUser => "confirm_verify_user",
            StepKind::SignedIn => "signed_in",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The entry steps a user can navigate between directly while signed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialStep {
    #[default]
    SignIn,
    SignUp,
    ResetPassword,
}

impl InitialStep {
    pub fn as_step(&self) -> Step {
        match self {
            InitialStep::SignIn => Step::SignIn,
            InitialStep::SignUp => Step::SignUp,
            InitialStep::ResetPassword => Step::ResetPassword,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usher_provider::DeliveryMedium;

    fn delivery(destination: &str) -> DeliveryDetails {
        DeliveryDetails {
            destination: Some(destination.to_string()),
            medium: DeliveryMedium::Email,
            attribute: None,
        }
    }

    #[test]
    fn equality_is_reflexive_and_payload_sensitive() {
        let a = Step::ConfirmSignUp {
            delivery: Some(delivery("a***@example.com")),
        };
        let b = Step::ConfirmSignUp {
            delivery: Some(delivery("b***@example.com")),
        };
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(
            a,
            Step::ConfirmResetPassword {
                delivery: Some(delivery("a***@example.com")),
            }
        );
    }

    #[test]
    fn signed_in_compares_by_user_identity() {
        let user = |id: &str| User {
            username: "pat".to_string(),
            user_id: id.to_string(),
        };
        assert_eq!(
            Step::SignedIn { user: user("1") },
            Step::SignedIn { user: user("1") }
        );
        assert_ne!(
            Step::SignedIn { user: user("1") },
            Step::SignedIn { user: user("2") }
        );
    }

    #[test]
    fn mfa_selection_payload_compares_as_a_set() {
        let a = Step::ContinueSignInWithMfaSelection {
            allowed: [MfaKind::Sms, MfaKind::Totp].into_iter().collect(),
        };
        let b = Step::ContinueSignInWithMfaSelection {
            allowed: [MfaKind::Totp, MfaKind::Sms].into_iter().collect(),
        };
        assert_eq!(a, b);
    }

    #[test]
    fn only_error_is_terminal() {
        assert!(
            Step::Error {
                message: DisplayMessage::new("broken")
            }
            .is_terminal()
        );
        assert!(!Step::Loading.is_terminal());
        assert!(!Step::SignIn.is_terminal());
    }

    #[test]
    fn kind_display_matches_serde_tag() {
        let step = Step::ConfirmSignInWithMfaCode { delivery: None };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], step.kind().as_str());
    }

    #[test]
    fn initial_steps_map_to_their_steps() {
        assert_eq!(InitialStep::SignIn.as_step(), Step::SignIn);
        assert_eq!(InitialStep::SignUp.as_step(), Step::SignUp);
        assert_eq!(InitialStep::ResetPassword.as_step(), Step::ResetPassword);
    }
}
