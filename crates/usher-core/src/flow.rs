use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;
use usher_provider::{
    AttributeKey, AuthSession, DeliveryDetails, IdentityProvider, ProviderError,
    ResetPasswordResult, SessionOptions, SignInResult, SignOutResult, SignUpResult, User,
    UserAttribute,
};

use crate::classifier::{DisplayMessage, MessageCatalog, MessageOverride};
use crate::config::FlowConfig;
use crate::context::{FlowContext, StepStore};
use crate::credentials::Credentials;
use crate::states::{ActionSignals, StepStates};
use crate::step::{InitialStep, Step, StepKind};

/// The authentication flow: one current [`Step`], a handle per actionable
/// step, and a busy flag plus display message shared by all of them.
///
/// Build one with [`AuthFlow::builder`], call [`start`](AuthFlow::start)
/// once to bootstrap from any existing session, then watch
/// [`steps`](AuthFlow::steps) and drive the handle matching the current
/// step.
pub struct AuthFlow {
    ctx: Arc<FlowContext>,
    signals: Arc<ActionSignals>,
    states: StepStates,
    started: AtomicBool,
}

impl AuthFlow {
    pub fn builder() -> AuthFlowBuilder {
        AuthFlowBuilder::default()
    }

    /// Bootstrap the flow: attach the provider's event stream and resolve
    /// the starting step from any session the provider still holds. Every
    /// failure along the way degrades to the configured initial step;
    /// calling this more than once is a logged no-op.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("flow already started");
            return;
        }
        if self.ctx.current_step().is_terminal() {
            return;
        }
        self.ctx.attach_events();
        let epoch = self.ctx.observed_epoch();
        let step = self.resolve_session().await;
        self.ctx.commit(epoch, step);
    }

    async fn resolve_session(&self) -> Step {
        let initial = self.ctx.initial_step.as_step();
        let session = match self.ctx.provider.fetch_session(self.ctx.session_options).await {
            Ok(session) => session,
            Err(error) => {
                tracing::warn!(error = %error, "session bootstrap failed, continuing signed out");
                return initial;
            }
        };
        if !session.is_signed_in {
            return initial;
        }
        if session.credentials_usable {
            match self.ctx.provider.current_user().await {
                Ok(user) => return Step::SignedIn { user },
                Err(error) => {
                    tracing::warn!(error = %error, "signed-in session without a current user, continuing signed out");
                    return initial;
                }
            }
        }
        tracing::info!("session present but credentials unusable, signing out");
        if let Err(error) = self.ctx.provider.sign_out().await {
            tracing::warn!(error = %error, "sign-out of expired session failed");
        }
        initial
    }

    /// Watch the current step.
    pub fn steps(&self) -> watch::Receiver<Step> {
        self.ctx.store.subscribe()
    }

    pub fn current_step(&self) -> Step {
        self.ctx.current_step()
    }

    pub fn previous_step(&self) -> Option<Step> {
        self.ctx.store.previous()
    }

    /// Jump to another entry ceremony. Returns false when the move was
    /// rejected.
    pub fn move_to(&self, target: InitialStep) -> bool {
        self.ctx.store.navigate(target.as_step())
    }

    /// Handles for driving each step.
    pub fn states(&self) -> &StepStates {
        &self.states
    }

    pub fn busy(&self) -> watch::Receiver<bool> {
        self.signals.busy()
    }

    pub fn is_busy(&self) -> bool {
        self.signals.is_busy()
    }

    pub fn message(&self) -> watch::Receiver<Option<DisplayMessage>> {
        self.signals.message()
    }

    pub fn current_message(&self) -> Option<DisplayMessage> {
        self.signals.current_message()
    }

    pub fn dismiss_message(&self) {
        self.signals.dismiss();
    }

    /// Username captured by the last sign-in, sign-up or reset, for
    /// prefilling forms.
    pub fn username(&self) -> Option<String> {
        self.ctx.credentials.username()
    }

    /// Tear the flow down: stop forwarding provider events and wipe the
    /// buffered credentials. Dropping the flow has the same effect.
    pub fn shutdown(&self) {
        self.ctx.detach_events();
        self.ctx.credentials.clear();
    }
}

impl Drop for AuthFlow {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Default)]
pub struct AuthFlowBuilder {
    provider: Option<Arc<dyn IdentityProvider>>,
    config: FlowConfig,
}

impl AuthFlowBuilder {
    pub fn provider(mut self, provider: impl IdentityProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn shared_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn initial_step(mut self, initial: InitialStep) -> Self {
        self.config.initial_step = initial;
        self
    }

    pub fn session_options(mut self, options: SessionOptions) -> Self {
        self.config.session_options = options;
        self
    }

    pub fn message_override(mut self, hook: MessageOverride) -> Self {
        self.config.message_override = Some(hook);
        self
    }

    /// Assemble the flow. A missing provider or a provider that reports
    /// itself unready produces a flow born in the terminal error step
    /// rather than a panic at first use.
    pub fn build(self) -> AuthFlow {
        let provider: Arc<dyn IdentityProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(UnconfiguredProvider),
        };
        let catalog = match self.config.message_override {
            Some(hook) => MessageCatalog::with_override(hook),
            None => MessageCatalog::new(),
        };
        let first = match provider.ready() {
            Ok(()) => Step::Loading,
            Err(error) => Step::Error {
                message: catalog.classify(&error, StepKind::Loading),
            },
        };
        let store = Arc::new(StepStore::new(first));
        let ctx = Arc::new(FlowContext::new(
            provider,
            store,
            Credentials::new(),
            catalog,
            self.config.initial_step,
            self.config.session_options,
        ));
        let signals = Arc::new(ActionSignals::new());
        let states = StepStates::new(&ctx, &signals);
        AuthFlow {
            ctx,
            signals,
            states,
            started: AtomicBool::new(false),
        }
    }
}

/// Stand-in used when the builder is never given a provider. Every
/// operation reports the same configuration error.
struct UnconfiguredProvider;

impl UnconfiguredProvider {
    fn error() -> ProviderError {
        ProviderError::Configuration("no identity provider configured".to_string())
    }
}

#[async_trait]
impl IdentityProvider for UnconfiguredProvider {
    async fn sign_in(
        &self,
        _username: Option<&str>,
        _password: Option<&str>,
    ) -> usher_provider::Result<SignInResult> {
        Err(Self::error())
    }

    async fn confirm_sign_in(
        &self,
        _challenge_response: &str,
    ) -> usher_provider::Result<SignInResult> {
        Err(Self::error())
    }

    async fn sign_up(
        &self,
        _username: &str,
        _password: Option<&str>,
        _attributes: &[UserAttribute],
    ) -> usher_provider::Result<SignUpResult> {
        Err(Self::error())
    }

    async fn confirm_sign_up(
        &self,
        _username: &str,
        _code: &str,
    ) -> usher_provider::Result<SignUpResult> {
        Err(Self::error())
    }

    async fn resend_sign_up_code(
        &self,
        _username: &str,
    ) -> usher_provider::Result<DeliveryDetails> {
        Err(Self::error())
    }

    async fn reset_password(
        &self,
        _username: &str,
    ) -> usher_provider::Result<ResetPasswordResult> {
        Err(Self::error())
    }

    async fn confirm_reset_password(
        &self,
        _username: &str,
        _new_password: &str,
        _code: &str,
    ) -> usher_provider::Result<()> {
        Err(Self::error())
    }

    async fn fetch_user_attributes(&self) -> usher_provider::Result<Vec<UserAttribute>> {
        Err(Self::error())
    }

    async fn resend_confirmation_code(
        &self,
        _attribute: &AttributeKey,
    ) -> usher_provider::Result<DeliveryDetails> {
        Err(Self::error())
    }

    async fn confirm_user_attribute(
        &self,
        _attribute: &AttributeKey,
        _code: &str,
    ) -> usher_provider::Result<()> {
        Err(Self::error())
    }

    async fn current_user(&self) -> usher_provider::Result<User> {
        Err(Self::error())
    }

    async fn fetch_session(
        &self,
        _options: SessionOptions,
    ) -> usher_provider::Result<AuthSession> {
        Err(Self::error())
    }

    async fn sign_out(&self) -> usher_provider::Result<SignOutResult> {
        Err(Self::error())
    }

    fn ready(&self) -> usher_provider::Result<()> {
        Err(Self::error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::messages;
    use crate::test_utils::MockProvider;

    #[tokio::test]
    async fn building_without_a_provider_yields_a_terminal_error() {
        let flow = AuthFlow::builder().build();
        assert!(matches!(flow.current_step(), Step::Error { .. }));
        flow.start().await;
        assert!(matches!(flow.current_step(), Step::Error { .. }));
    }

    #[tokio::test]
    async fn unready_provider_yields_a_terminal_error() {
        let provider = MockProvider::new()
            .with_ready_error(ProviderError::Configuration("missing pool id".to_string()));
        let flow = AuthFlow::builder().provider(provider).build();
        match flow.current_step() {
            Step::Error { message } => assert_eq!(message.text(), messages::MISCONFIGURED),
            other => panic!("expected error step, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bootstrap_failure_lands_on_the_initial_step() {
        let provider = MockProvider::new()
            .script_fetch_session(Err(ProviderError::Configuration("offline".to_string())));
        let flow = AuthFlow::builder().provider(provider).build();
        assert_eq!(flow.current_step(), Step::Loading);
        flow.start().await;
        assert_eq!(flow.current_step(), Step::SignIn);
    }

    #[tokio::test]
    async fn bootstrap_without_a_session_lands_on_the_configured_initial_step() {
        let provider =
            MockProvider::new().script_fetch_session(Ok(MockProvider::session(false, false)));
        let flow = AuthFlow::builder()
            .provider(provider)
            .initial_step(InitialStep::SignUp)
            .build();
        flow.start().await;
        assert_eq!(flow.current_step(), Step::SignUp);
    }

    #[tokio::test]
    async fn bootstrap_with_a_usable_session_restores_signed_in() {
        let provider = MockProvider::new()
            .script_fetch_session(Ok(MockProvider::session(true, true)))
            .script_current_user(Ok(MockProvider::user("pat")));
        let flow = AuthFlow::builder().provider(provider).build();
        flow.start().await;
        assert_eq!(
            flow.current_step(),
            Step::SignedIn {
                user: MockProvider::user("pat")
            }
        );
    }

    #[tokio::test]
    async fn bootstrap_with_unusable_credentials_signs_out_first() {
        let provider = MockProvider::new()
            .script_fetch_session(Ok(MockProvider::session(true, false)))
            .script_sign_out(Ok(SignOutResult::Complete));
        let flow = AuthFlow::builder().provider(provider).build();
        flow.start().await;
        assert_eq!(flow.current_step(), Step::SignIn);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let provider = Arc::new(
            MockProvider::new().script_fetch_session(Ok(MockProvider::session(false, false))),
        );
        let flow = AuthFlow::builder().shared_provider(provider.clone()).build();
        flow.start().await;
        flow.start().await;
        assert_eq!(flow.current_step(), Step::SignIn);
        let bootstraps = provider
            .calls()
            .iter()
            .filter(|call| call.starts_with("fetch_session"))
            .count();
        assert_eq!(bootstraps, 1);
    }
}
