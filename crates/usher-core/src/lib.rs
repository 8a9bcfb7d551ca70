// Client-side authentication flow orchestration over a pluggable identity provider.

pub mod classifier;
pub mod config;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod states;
pub mod step;
pub mod test_utils;

mod context;
mod resolver;
mod subscription;

pub use classifier::{DisplayMessage, MessageCatalog, MessageOverride, messages};
pub use config::FlowConfig;
pub use credentials::Credentials;
pub use error::{FlowError, Result};
pub use flow::{AuthFlow, AuthFlowBuilder};
pub use states::{
    ConfirmResetPasswordState, ConfirmSignInWithCustomChallengeState,
    ConfirmSignInWithMfaCodeState, ConfirmSignInWithNewPasswordState,
    ConfirmSignInWithTotpCodeState, ConfirmSignUpState, ConfirmVerifyUserState,
    ContinueSignInWithEmailMfaSetupState, ContinueSignInWithMfaSelectionState,
    ContinueSignInWithMfaSetupSelectionState, ContinueSignInWithTotpSetupState,
    ResetPasswordState, SignInState, SignUpState, SignedInState, StepState, StepStates,
    VerifyUserState,
};
pub use step::{InitialStep, Step, StepKind};

pub use usher_provider as provider;
