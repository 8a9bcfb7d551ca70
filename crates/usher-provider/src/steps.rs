use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{DeliveryDetails, MfaKind, TotpSetupDetails};

/// Outcome of `sign_in` / `confirm_sign_in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInResult {
    pub next_step: SignInNextStep,
}

/// What the provider needs next to finish a sign-in ceremony.
///
/// Marked non-exhaustive: providers grow challenge types over time, and
/// the orchestrator must treat anything it does not recognize as a
/// classified error rather than a crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SignInNextStep {
    ConfirmSignInWithSmsMfaCode { delivery: Option<DeliveryDetails> },
    ConfirmSignInWithEmailMfaCode { delivery: Option<DeliveryDetails> },
    ConfirmSignInWithCustomChallenge,
    ConfirmSignInWithNewPassword,
    ConfirmSignInWithTotpCode,
    ContinueSignInWithMfaSelection { allowed: BTreeSet<MfaKind> },
    ContinueSignInWithMfaSetupSelection { allowed: BTreeSet<MfaKind> },
    ContinueSignInWithEmailMfaSetup,
    ContinueSignInWithTotpSetup { details: TotpSetupDetails },
    ResetPassword,
    ConfirmSignUp { delivery: Option<DeliveryDetails> },
    Done,
}

/// Outcome of `sign_up` / `confirm_sign_up`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpResult {
    pub next_step: SignUpNextStep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SignUpNextStep {
    ConfirmUser { delivery: Option<DeliveryDetails> },
    Done,
}

/// Outcome of `reset_password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetPasswordResult {
    pub next_step: ResetPasswordNextStep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ResetPasswordNextStep {
    ConfirmResetPasswordWithCode { delivery: Option<DeliveryDetails> },
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeliveryMedium;

    #[test]
    fn next_steps_serialize_tagged() {
        let step = SignInNextStep::ConfirmSignInWithSmsMfaCode {
            delivery: Some(DeliveryDetails {
                destination: Some("+1***55".to_string()),
                medium: DeliveryMedium::Sms,
                attribute: None,
            }),
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "confirm_sign_in_with_sms_mfa_code");
        assert_eq!(json["delivery"]["destination"], "+1***55");

        let done: SignInNextStep = serde_json::from_str("{\"type\":\"done\"}").unwrap();
        assert_eq!(done, SignInNextStep::Done);
    }
}
