use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::watch;
use usher_provider::{
    AttributeKey, DeliveryDetails, MfaKind, ProviderError, SignOutResult, TotpSetupDetails, User,
    UserAttribute,
};

use crate::classifier::DisplayMessage;
use crate::context::FlowContext;
use crate::error::{FlowError, Result};
use crate::resolver;
use crate::step::{InitialStep, Step, StepKind};

/// Busy flag and display message shared by every step handle. One action
/// at a time flow-wide: providers do not tolerate overlapping ceremony
/// calls, and a single busy bit is what screens actually render.
#[derive(Debug)]
pub(crate) struct ActionSignals {
    busy: watch::Sender<bool>,
    message: watch::Sender<Option<DisplayMessage>>,
}

impl ActionSignals {
    pub(crate) fn new() -> Self {
        let (busy, _) = watch::channel(false);
        let (message, _) = watch::channel(None);
        Self { busy, message }
    }

    /// Claim the busy flag. Starting an action clears whatever message the
    /// previous one left behind. Fails when another action holds the flag.
    pub(crate) fn begin(&self) -> Result<BusyGuard<'_>> {
        let acquired = self.busy.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        if !acquired {
            return Err(FlowError::ActionInFlight);
        }
        self.message.send_replace(None);
        Ok(BusyGuard { signals: self })
    }

    pub(crate) fn post(&self, message: DisplayMessage) {
        self.message.send_replace(Some(message));
    }

    pub(crate) fn dismiss(&self) {
        self.message.send_replace(None);
    }

    pub(crate) fn busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    pub(crate) fn message(&self) -> watch::Receiver<Option<DisplayMessage>> {
        self.message.subscribe()
    }

    pub(crate) fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    pub(crate) fn current_message(&self) -> Option<DisplayMessage> {
        self.message.borrow().clone()
    }
}

/// Releases the busy flag when the action returns, on every path.
#[derive(Debug)]
pub(crate) struct BusyGuard<'a> {
    signals: &'a ActionSignals,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.signals.busy.send_replace(false);
    }
}

/// Route an action's outcome: a resolved step is committed against the
/// epoch observed when the action began, an error becomes a display
/// message on the signals and bubbles to the caller. A message parked in
/// the credentials buffer by the resolver surfaces once the step lands.
fn finish(
    ctx: &FlowContext,
    signals: &ActionSignals,
    at: StepKind,
    observed_epoch: u64,
    outcome: std::result::Result<Step, ProviderError>,
) -> Result<()> {
    match outcome {
        Ok(step) => {
            if ctx.commit(observed_epoch, step) {
                if let Some(parked) = ctx.credentials.take_message() {
                    signals.post(parked);
                }
            }
            Ok(())
        }
        Err(error) => {
            let message = ctx.classify(&error, at);
            signals.post(message);
            Err(FlowError::Provider(error))
        }
    }
}

/// Handle for driving the flow while it sits on one particular step. The
/// marker type pins which operations exist; the data inside is shared, so
/// handles are cheap to clone and live as long as the flow does.
pub struct StepState<M> {
    ctx: Arc<FlowContext>,
    signals: Arc<ActionSignals>,
    _marker: PhantomData<M>,
}

impl<M> Clone for StepState<M> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            signals: Arc::clone(&self.signals),
            _marker: PhantomData,
        }
    }
}

impl<M> StepState<M> {
    pub(crate) fn new(ctx: Arc<FlowContext>, signals: Arc<ActionSignals>) -> Self {
        Self {
            ctx,
            signals,
            _marker: PhantomData,
        }
    }

    /// Watch the flow-wide busy flag.
    pub fn busy(&self) -> watch::Receiver<bool> {
        self.signals.busy()
    }

    pub fn is_busy(&self) -> bool {
        self.signals.is_busy()
    }

    /// Watch the display message slot. The slot is cleared when the next
    /// action begins and on [`dismiss_message`](Self::dismiss_message).
    pub fn message(&self) -> watch::Receiver<Option<DisplayMessage>> {
        self.signals.message()
    }

    pub fn current_message(&self) -> Option<DisplayMessage> {
        self.signals.current_message()
    }

    pub fn dismiss_message(&self) {
        self.signals.dismiss();
    }

    /// Jump to another entry ceremony. Returns false when the move was
    /// rejected (already signed in, already on that step, or the flow is
    /// in its terminal error state).
    pub fn move_to(&self, target: InitialStep) -> bool {
        self.ctx.store.navigate(target.as_step())
    }
}

/// Marker types naming the step each [`StepState`] serves.
pub mod markers {
    macro_rules! markers {
        ($($name:ident),* $(,)?) => {
            $(
                #[derive(Debug, Clone, Copy)]
                pub struct $name;
            )*
        };
    }

    markers!(
        SignIn,
        SignUp,
        ConfirmSignUp,
        ConfirmSignInWithMfaCode,
        ConfirmSignInWithCustomChallenge,
        ConfirmSignInWithNewPassword,
        ConfirmSignInWithTotpCode,
        ContinueSignInWithMfaSelection,
        ContinueSignInWithMfaSetupSelection,
        ContinueSignInWithEmailMfaSetup,
        ContinueSignInWithTotpSetup,
        ResetPassword,
        ConfirmResetPassword,
        VerifyUser,
        ConfirmVerifyUser,
        SignedIn,
    );
}

pub type SignInState = StepState<markers::SignIn>;
pub type SignUpState = StepState<markers::SignUp>;
pub type ConfirmSignUpState = StepState<markers::ConfirmSignUp>;
pub type ConfirmSignInWithMfaCodeState = StepState<markers::ConfirmSignInWithMfaCode>;
pub type ConfirmSignInWithCustomChallengeState =
    StepState<markers::ConfirmSignInWithCustomChallenge>;
pub type ConfirmSignInWithNewPasswordState = StepState<markers::ConfirmSignInWithNewPassword>;
pub type ConfirmSignInWithTotpCodeState = StepState<markers::ConfirmSignInWithTotpCode>;
pub type ContinueSignInWithMfaSelectionState = StepState<markers::ContinueSignInWithMfaSelection>;
pub type ContinueSignInWithMfaSetupSelectionState =
    StepState<markers::ContinueSignInWithMfaSetupSelection>;
pub type ContinueSignInWithEmailMfaSetupState =
    StepState<markers::ContinueSignInWithEmailMfaSetup>;
pub type ContinueSignInWithTotpSetupState = StepState<markers::ContinueSignInWithTotpSetup>;
pub type ResetPasswordState = StepState<markers::ResetPassword>;
pub type ConfirmResetPasswordState = StepState<markers::ConfirmResetPassword>;
pub type VerifyUserState = StepState<markers::VerifyUser>;
pub type ConfirmVerifyUserState = StepState<markers::ConfirmVerifyUser>;
pub type SignedInState = StepState<markers::SignedIn>;

impl SignInState {
    /// Start a sign-in. The credentials are buffered first so follow-up
    /// ceremonies (forced reset, post-sign-up auto sign-in) can reuse them.
    pub async fn sign_in(&self, username: Option<&str>, password: Option<&str>) -> Result<()> {
        let _guard = self.signals.begin()?;
        let epoch = self.ctx.observed_epoch();
        self.ctx.credentials.store_login(username, password);
        let outcome = match self.ctx.provider.sign_in(username, password).await {
            Ok(result) => {
                resolver::resolve_sign_in(
                    self.ctx.provider.as_ref(),
                    &self.ctx.credentials,
                    result.next_step,
                )
                .await
            }
            Err(error) => Err(error),
        };
        finish(&self.ctx, &self.signals, StepKind::SignIn, epoch, outcome)
    }
}

impl SignUpState {
    pub async fn sign_up(
        &self,
        username: &str,
        password: Option<&str>,
        attributes: &[UserAttribute],
    ) -> Result<()> {
        let _guard = self.signals.begin()?;
        let epoch = self.ctx.observed_epoch();
        self.ctx.credentials.store_login(Some(username), password);
        let outcome = match self.ctx.provider.sign_up(username, password, attributes).await {
            Ok(result) => {
                resolver::resolve_sign_up(
                    self.ctx.provider.as_ref(),
                    &self.ctx.credentials,
                    &self.ctx.catalog,
                    result.next_step,
                )
                .await
            }
            Err(error) => Err(error),
        };
        finish(&self.ctx, &self.signals, StepKind::SignUp, epoch, outcome)
    }
}

impl ConfirmSignUpState {
    /// Confirm the sign-up with the delivered code. Uses the username
    /// buffered when the sign-up (or sign-in that was redirected here)
    /// started.
    pub async fn confirm(&self, code: &str) -> Result<()> {
        let _guard = self.signals.begin()?;
        let epoch = self.ctx.observed_epoch();
        let username = self.ctx.credentials.username().unwrap_or_default();
        let outcome = match self.ctx.provider.confirm_sign_up(&username, code).await {
            Ok(result) => {
                resolver::resolve_sign_up(
                    self.ctx.provider.as_ref(),
                    &self.ctx.credentials,
                    &self.ctx.catalog,
                    result.next_step,
                )
                .await
            }
            Err(error) => Err(error),
        };
        finish(
            &self.ctx,
            &self.signals,
            StepKind::ConfirmSignUp,
            epoch,
            outcome,
        )
    }

    /// Ask for a fresh code. On success the step is re-committed with the
    /// new delivery details so the screen can show where the code went.
    pub async fn resend_code(&self) -> Result<()> {
        let _guard = self.signals.begin()?;
        let epoch = self.ctx.observed_epoch();
        let username = self.ctx.credentials.username().unwrap_or_default();
        let outcome = self
            .ctx
            .provider
            .resend_sign_up_code(&username)
            .await
            .map(|delivery| Step::ConfirmSignUp {
                delivery: Some(delivery),
            });
        finish(
            &self.ctx,
            &self.signals,
            StepKind::ConfirmSignUp,
            epoch,
            outcome,
        )
    }

    pub fn delivery(&self) -> Option<DeliveryDetails> {
        match self.ctx.current_step() {
            Step::ConfirmSignUp { delivery } => delivery,
            _ => None,
        }
    }
}

impl ConfirmSignInWithMfaCodeState {
    pub async fn confirm(&self, code: &str) -> Result<()> {
        confirm_sign_in(&self.ctx, &self.signals, StepKind::ConfirmSignInWithMfaCode, code).await
    }

    pub fn delivery(&self) -> Option<DeliveryDetails> {
        match self.ctx.current_step() {
            Step::ConfirmSignInWithMfaCode { delivery } => delivery,
            _ => None,
        }
    }
}

impl ConfirmSignInWithCustomChallengeState {
    pub async fn confirm(&self, response: &str) -> Result<()> {
        confirm_sign_in(
            &self.ctx,
            &self.signals,
            StepKind::ConfirmSignInWithCustomChallenge,
            response,
        )
        .await
    }
}

impl ConfirmSignInWithNewPasswordState {
    pub async fn confirm(&self, new_password: &str) -> Result<()> {
        confirm_sign_in(
            &self.ctx,
            &self.signals,
            StepKind::ConfirmSignInWithNewPassword,
            new_password,
        )
        .await
    }
}

impl ConfirmSignInWithTotpCodeState {
    pub async fn confirm(&self, code: &str) -> Result<()> {
        confirm_sign_in(
            &self.ctx,
            &self.signals,
            StepKind::ConfirmSignInWithTotpCode,
            code,
        )
        .await
    }
}

impl ContinueSignInWithMfaSelectionState {
    /// Pick one of the factors offered by the provider.
    pub async fn select(&self, kind: MfaKind) -> Result<()> {
        confirm_sign_in(
            &self.ctx,
            &self.signals,
            StepKind::ContinueSignInWithMfaSelection,
            kind.challenge_response(),
        )
        .await
    }

    /// Factors offered by the current step; empty when the flow has moved
    /// elsewhere.
    pub fn allowed(&self) -> BTreeSet<MfaKind> {
        match self.ctx.current_step() {
            Step::ContinueSignInWithMfaSelection { allowed } => allowed,
            _ => BTreeSet::new(),
        }
    }
}

impl ContinueSignInWithMfaSetupSelectionState {
    pub async fn select(&self, kind: MfaKind) -> Result<()> {
        confirm_sign_in(
            &self.ctx,
            &self.signals,
            StepKind::ContinueSignInWithMfaSetupSelection,
            kind.challenge_response(),
        )
        .await
    }

    pub fn allowed(&self) -> BTreeSet<MfaKind> {
        match self.ctx.current_step() {
            Step::ContinueSignInWithMfaSetupSelection { allowed } => allowed,
            _ => BTreeSet::new(),
        }
    }
}

impl ContinueSignInWithEmailMfaSetupState {
    /// Submit the address email codes should go to.
    pub async fn confirm(&self, email: &str) -> Result<()> {
        confirm_sign_in(
            &self.ctx,
            &self.signals,
            StepKind::ContinueSignInWithEmailMfaSetup,
            email,
        )
        .await
    }
}

impl ContinueSignInWithTotpSetupState {
    /// Confirm enrollment with a code from the freshly provisioned
    /// authenticator.
    pub async fn confirm(&self, code: &str) -> Result<()> {
        confirm_sign_in(
            &self.ctx,
            &self.signals,
            StepKind::ContinueSignInWithTotpSetup,
            code,
        )
        .await
    }

    pub fn details(&self) -> Option<TotpSetupDetails> {
        match self.ctx.current_step() {
            Step::ContinueSignInWithTotpSetup { details } => Some(details),
            _ => None,
        }
    }
}

impl ResetPasswordState {
    pub async fn reset(&self, username: &str) -> Result<()> {
        let _guard = self.signals.begin()?;
        let epoch = self.ctx.observed_epoch();
        self.ctx.credentials.store_username(username);
        let outcome = match self.ctx.provider.reset_password(username).await {
            Ok(result) => resolver::resolve_reset_password(result.next_step),
            Err(error) => Err(error),
        };
        finish(
            &self.ctx,
            &self.signals,
            StepKind::ResetPassword,
            epoch,
            outcome,
        )
    }
}

impl ConfirmResetPasswordState {
    /// Complete the reset with the delivered code. On success the flow
    /// returns to sign-in with the username still buffered; the new
    /// password is never auto-submitted.
    pub async fn confirm(&self, new_password: &str, code: &str) -> Result<()> {
        let _guard = self.signals.begin()?;
        let epoch = self.ctx.observed_epoch();
        let username = self.ctx.credentials.username().unwrap_or_default();
        let outcome = self
            .ctx
            .provider
            .confirm_reset_password(&username, new_password, code)
            .await
            .map(|()| Step::SignIn);
        finish(
            &self.ctx,
            &self.signals,
            StepKind::ConfirmResetPassword,
            epoch,
            outcome,
        )
    }

    pub fn delivery(&self) -> Option<DeliveryDetails> {
        match self.ctx.current_step() {
            Step::ConfirmResetPassword { delivery } => delivery,
            _ => None,
        }
    }
}

impl VerifyUserState {
    /// Send a verification code to the chosen attribute and advance to
    /// the confirmation step.
    pub async fn verify(&self, attribute: AttributeKey) -> Result<()> {
        let _guard = self.signals.begin()?;
        let epoch = self.ctx.observed_epoch();
        let outcome = self
            .ctx
            .provider
            .resend_confirmation_code(&attribute)
            .await
            .map(|delivery| Step::ConfirmVerifyUser {
                attribute,
                delivery: Some(delivery),
            });
        finish(
            &self.ctx,
            &self.signals,
            StepKind::VerifyUser,
            epoch,
            outcome,
        )
    }

    /// Proceed without verifying anything.
    pub async fn skip(&self) -> Result<()> {
        skip_verification(&self.ctx, &self.signals, StepKind::VerifyUser).await
    }

    pub fn unverified(&self) -> BTreeSet<AttributeKey> {
        match self.ctx.current_step() {
            Step::VerifyUser { unverified } => unverified,
            _ => BTreeSet::new(),
        }
    }
}

impl ConfirmVerifyUserState {
    /// Confirm the attribute that is awaiting verification with the
    /// delivered code.
    pub async fn confirm(&self, code: &str) -> Result<()> {
        let _guard = self.signals.begin()?;
        let epoch = self.ctx.observed_epoch();
        let outcome = match self.attribute() {
            Some(attribute) => {
                match self
                    .ctx
                    .provider
                    .confirm_user_attribute(&attribute, code)
                    .await
                {
                    Ok(()) => self
                        .ctx
                        .provider
                        .current_user()
                        .await
                        .map(|user| Step::SignedIn { user }),
                    Err(error) => Err(error),
                }
            }
            None => Err(ProviderError::InvalidState(
                "no attribute is awaiting verification".to_string(),
            )),
        };
        finish(
            &self.ctx,
            &self.signals,
            StepKind::ConfirmVerifyUser,
            epoch,
            outcome,
        )
    }

    pub async fn skip(&self) -> Result<()> {
        skip_verification(&self.ctx, &self.signals, StepKind::ConfirmVerifyUser).await
    }

    pub fn attribute(&self) -> Option<AttributeKey> {
        match self.ctx.current_step() {
            Step::ConfirmVerifyUser { attribute, .. } => Some(attribute),
            _ => None,
        }
    }

    pub fn delivery(&self) -> Option<DeliveryDetails> {
        match self.ctx.current_step() {
            Step::ConfirmVerifyUser { delivery, .. } => delivery,
            _ => None,
        }
    }
}

impl SignedInState {
    /// Sign out and return to the configured initial step. A partial
    /// sign-out (local credentials discarded, remote revocation failed)
    /// still moves the flow; a failed one stays signed in with a message.
    pub async fn sign_out(&self) -> Result<()> {
        let _guard = self.signals.begin()?;
        let epoch = self.ctx.observed_epoch();
        let outcome = match self.ctx.provider.sign_out().await {
            Ok(result) => {
                if matches!(result, SignOutResult::Partial) {
                    tracing::warn!("sign-out completed locally but not globally");
                }
                Ok(self.ctx.initial_step.as_step())
            }
            Err(error) => Err(error),
        };
        finish(&self.ctx, &self.signals, StepKind::SignedIn, epoch, outcome)
    }

    pub fn user(&self) -> Option<User> {
        match self.ctx.current_step() {
            Step::SignedIn { user } => Some(user),
            _ => None,
        }
    }
}

/// Shared body for every step whose single operation is passing a
/// challenge response back through `confirm_sign_in`.
async fn confirm_sign_in(
    ctx: &Arc<FlowContext>,
    signals: &ActionSignals,
    at: StepKind,
    challenge_response: &str,
) -> Result<()> {
    let _guard = signals.begin()?;
    let epoch = ctx.observed_epoch();
    let outcome = match ctx.provider.confirm_sign_in(challenge_response).await {
        Ok(result) => {
            resolver::resolve_sign_in(ctx.provider.as_ref(), &ctx.credentials, result.next_step)
                .await
        }
        Err(error) => Err(error),
    };
    finish(ctx, signals, at, epoch, outcome)
}

async fn skip_verification(
    ctx: &Arc<FlowContext>,
    signals: &ActionSignals,
    at: StepKind,
) -> Result<()> {
    let _guard = signals.begin()?;
    let epoch = ctx.observed_epoch();
    let outcome = ctx
        .provider
        .current_user()
        .await
        .map(|user| Step::SignedIn { user });
    finish(ctx, signals, at, epoch, outcome)
}

/// One handle per actionable step, all sharing the same context and
/// signals. `Loading` and `Error` have no operations, so no handle.
#[derive(Clone)]
pub struct StepStates {
    pub sign_in: SignInState,
    pub sign_up: SignUpState,
    pub confirm_sign_up: ConfirmSignUpState,
    pub confirm_sign_in_with_mfa_code: ConfirmSignInWithMfaCodeState,
    pub confirm_sign_in_with_custom_challenge: ConfirmSignInWithCustomChallengeState,
    pub confirm_sign_in_with_new_password: ConfirmSignInWithNewPasswordState,
    pub confirm_sign_in_with_totp_code: ConfirmSignInWithTotpCodeState,
    pub continue_sign_in_with_mfa_selection: ContinueSignInWithMfaSelectionState,
    pub continue_sign_in_with_mfa_setup_selection: ContinueSignInWithMfaSetupSelectionState,
    pub continue_sign_in_with_email_mfa_setup: ContinueSignInWithEmailMfaSetupState,
    pub continue_sign_in_with_totp_setup: ContinueSignInWithTotpSetupState,
    pub reset_password: ResetPasswordState,
    pub confirm_reset_password: ConfirmResetPasswordState,
    pub verify_user: VerifyUserState,
    pub confirm_verify_user: ConfirmVerifyUserState,
    pub signed_in: SignedInState,
}

impl StepStates {
    pub(crate) fn new(ctx: &Arc<FlowContext>, signals: &Arc<ActionSignals>) -> Self {
        fn state<M>(ctx: &Arc<FlowContext>, signals: &Arc<ActionSignals>) -> StepState<M> {
            StepState::new(Arc::clone(ctx), Arc::clone(signals))
        }
        Self {
            sign_in: state(ctx, signals),
            sign_up: state(ctx, signals),
            confirm_sign_up: state(ctx, signals),
            confirm_sign_in_with_mfa_code: state(ctx, signals),
            confirm_sign_in_with_custom_challenge: state(ctx, signals),
            confirm_sign_in_with_new_password: state(ctx, signals),
            confirm_sign_in_with_totp_code: state(ctx, signals),
            continue_sign_in_with_mfa_selection: state(ctx, signals),
            continue_sign_in_with_mfa_setup_selection: state(ctx, signals),
            continue_sign_in_with_email_mfa_setup: state(ctx, signals),
            continue_sign_in_with_totp_setup: state(ctx, signals),
            reset_password: state(ctx, signals),
            confirm_reset_password: state(ctx, signals),
            verify_user: state(ctx, signals),
            confirm_verify_user: state(ctx, signals),
            signed_in: state(ctx, signals),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usher_provider::{DeliveryMedium, SessionOptions, SignInNextStep, SignInResult};

    use crate::classifier::{MessageCatalog, messages};
    use crate::context::StepStore;
    use crate::credentials::Credentials;
    use crate::test_utils::MockProvider;

    fn harness(provider: MockProvider, initial: Step) -> (Arc<FlowContext>, StepStates) {
        let store = Arc::new(StepStore::new(initial));
        let ctx = Arc::new(FlowContext::new(
            Arc::new(provider),
            store,
            Credentials::new(),
            MessageCatalog::new(),
            InitialStep::SignIn,
            SessionOptions::default(),
        ));
        let signals = Arc::new(ActionSignals::new());
        let states = StepStates::new(&ctx, &signals);
        (ctx, states)
    }

    #[test]
    fn begin_rejects_a_second_action() {
        let signals = ActionSignals::new();
        let guard = signals.begin().unwrap();
        assert!(signals.is_busy());
        assert!(matches!(
            signals.begin().unwrap_err(),
            FlowError::ActionInFlight
        ));
        drop(guard);
        assert!(!signals.is_busy());
        assert!(signals.begin().is_ok());
    }

    #[test]
    fn begin_clears_the_previous_message() {
        let signals = ActionSignals::new();
        signals.post(DisplayMessage::new("stale"));
        let _guard = signals.begin().unwrap();
        assert_eq!(signals.current_message(), None);
    }

    #[tokio::test]
    async fn failed_sign_in_posts_a_message_and_stays_put() {
        let provider = MockProvider::new().script_sign_in(Err(ProviderError::NotAuthorized {
            description: "bad password".to_string(),
        }));
        let (ctx, states) = harness(provider, Step::SignIn);
        let result = states.sign_in.sign_in(Some("pat"), Some("nope")).await;
        assert!(matches!(result, Err(FlowError::Provider(_))));
        assert_eq!(ctx.current_step(), Step::SignIn);
        assert_eq!(
            states.sign_in.current_message().unwrap().text(),
            messages::INCORRECT_CREDENTIALS
        );
        assert!(!states.sign_in.is_busy());
    }

    #[tokio::test]
    async fn successful_sign_in_commits_and_keeps_credentials_buffered() {
        let provider = MockProvider::new()
            .script_sign_in(Ok(SignInResult {
                next_step: SignInNextStep::Done,
            }))
            .script_fetch_user_attributes(Ok(vec![]))
            .script_current_user(Ok(MockProvider::user("pat")));
        let (ctx, states) = harness(provider, Step::SignIn);
        states.sign_in.sign_in(Some("pat"), Some("hunter2")).await.unwrap();
        assert_eq!(
            ctx.current_step(),
            Step::SignedIn {
                user: MockProvider::user("pat")
            }
        );
        // The buffer lives as long as the flow, not the ceremony.
        assert_eq!(ctx.credentials.username(), Some("pat".to_string()));
    }

    #[tokio::test]
    async fn resend_recommits_the_step_with_fresh_delivery() {
        let delivery = DeliveryDetails {
            destination: Some("p***@example.com".to_string()),
            medium: DeliveryMedium::Email,
            attribute: None,
        };
        let provider =
            MockProvider::new().script_resend_sign_up_code(Ok(delivery.clone()));
        let (ctx, states) = harness(provider, Step::ConfirmSignUp { delivery: None });
        ctx.credentials.store_username("pat");
        states.confirm_sign_up.resend_code().await.unwrap();
        assert_eq!(states.confirm_sign_up.delivery(), Some(delivery));
    }

    #[tokio::test]
    async fn verify_moves_to_the_attribute_confirmation_step() {
        let delivery = DeliveryDetails {
            destination: Some("+1***55".to_string()),
            medium: DeliveryMedium::Sms,
            attribute: Some(AttributeKey::PhoneNumber),
        };
        let provider =
            MockProvider::new().script_resend_confirmation_code(Ok(delivery.clone()));
        let (ctx, states) = harness(
            provider,
            Step::VerifyUser {
                unverified: [AttributeKey::PhoneNumber].into_iter().collect(),
            },
        );
        states
            .verify_user
            .verify(AttributeKey::PhoneNumber)
            .await
            .unwrap();
        assert_eq!(
            ctx.current_step(),
            Step::ConfirmVerifyUser {
                attribute: AttributeKey::PhoneNumber,
                delivery: Some(delivery),
            }
        );
        assert_eq!(
            states.confirm_verify_user.attribute(),
            Some(AttributeKey::PhoneNumber)
        );
    }

    #[tokio::test]
    async fn confirm_verify_user_without_a_pending_attribute_reports_state_error() {
        let provider = MockProvider::new();
        let (ctx, states) = harness(provider, Step::SignIn);
        let result = states.confirm_verify_user.confirm("123456").await;
        assert!(matches!(
            result,
            Err(FlowError::Provider(ProviderError::InvalidState(_)))
        ));
        assert_eq!(ctx.current_step(), Step::SignIn);
    }

    #[tokio::test]
    async fn sign_out_returns_to_the_initial_step() {
        let provider = MockProvider::new().script_sign_out(Ok(SignOutResult::Complete));
        let (ctx, states) = harness(
            provider,
            Step::SignedIn {
                user: MockProvider::user("pat"),
            },
        );
        ctx.credentials.store_username("pat");
        states.signed_in.sign_out().await.unwrap();
        assert_eq!(ctx.current_step(), Step::SignIn);
        assert_eq!(ctx.credentials.username(), Some("pat".to_string()));
    }

    #[tokio::test]
    async fn payload_accessors_return_empty_when_the_flow_is_elsewhere() {
        let provider = MockProvider::new();
        let (_ctx, states) = harness(provider, Step::SignIn);
        assert_eq!(states.confirm_sign_up.delivery(), None);
        assert!(states.continue_sign_in_with_mfa_selection.allowed().is_empty());
        assert_eq!(states.continue_sign_in_with_totp_setup.details(), None);
        assert_eq!(states.signed_in.user(), None);
        assert!(states.verify_user.unverified().is_empty());
    }

    #[tokio::test]
    async fn stale_actions_do_not_commit_after_navigation() {
        let (provider, gate) = MockProvider::new()
            .script_sign_in(Ok(SignInResult {
                next_step: SignInNextStep::ConfirmSignInWithTotpCode,
            }))
            .gated();
        let (ctx, states) = harness(provider, Step::SignIn);
        let sign_in = states.sign_in.clone();
        let action = tokio::spawn(async move { sign_in.sign_in(Some("pat"), Some("pw")).await });
        gate.acquired().await;
        // The user gives up and switches ceremonies while the call hangs.
        assert!(states.sign_up.move_to(InitialStep::SignUp));
        gate.release();
        action.await.unwrap().unwrap();
        assert_eq!(ctx.current_step(), Step::SignUp);
    }
}
