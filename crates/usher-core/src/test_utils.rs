//! Test utilities for usher-core
//!
//! A fully scripted [`IdentityProvider`] plus small payload helpers, usable
//! from unit tests here and from integration tests across the crate
//! boundary.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use usher_provider::{
    AttributeKey, AuthEvent, AuthSession, DeliveryDetails, DeliveryMedium, IdentityProvider,
    ProviderError, ResetPasswordResult, SessionOptions, SignInResult, SignOutResult, SignUpResult,
    User, UserAttribute,
};

type Script<T> = Mutex<VecDeque<usher_provider::Result<T>>>;

fn push<T>(script: &Script<T>, result: usher_provider::Result<T>) {
    script
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push_back(result);
}

fn pop<T>(script: &Script<T>, op: &str) -> usher_provider::Result<T> {
    script
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
        .unwrap_or_else(|| {
            Err(ProviderError::InvalidState(format!(
                "no scripted response for {op}"
            )))
        })
}

/// Provider whose every operation pops a pre-scripted response. Responses
/// are consumed in order; an unscripted call fails loudly instead of
/// hanging the test.
pub struct MockProvider {
    sign_in: Script<SignInResult>,
    confirm_sign_in: Script<SignInResult>,
    sign_up: Script<SignUpResult>,
    confirm_sign_up: Script<SignUpResult>,
    resend_sign_up_code: Script<DeliveryDetails>,
    reset_password: Script<ResetPasswordResult>,
    confirm_reset_password: Script<()>,
    fetch_user_attributes: Script<Vec<UserAttribute>>,
    resend_confirmation_code: Script<DeliveryDetails>,
    confirm_user_attribute: Script<()>,
    current_user: Script<User>,
    fetch_session: Script<AuthSession>,
    sign_out: Script<SignOutResult>,
    ready_error: Mutex<Option<ProviderError>>,
    events: broadcast::Sender<AuthEvent>,
    calls: Mutex<Vec<String>>,
    gate: Option<Gate>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            sign_in: Script::default(),
            confirm_sign_in: Script::default(),
            sign_up: Script::default(),
            confirm_sign_up: Script::default(),
            resend_sign_up_code: Script::default(),
            reset_password: Script::default(),
            confirm_reset_password: Script::default(),
            fetch_user_attributes: Script::default(),
            resend_confirmation_code: Script::default(),
            confirm_user_attribute: Script::default(),
            current_user: Script::default(),
            fetch_session: Script::default(),
            sign_out: Script::default(),
            ready_error: Mutex::new(None),
            events,
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn script_sign_in(self, result: usher_provider::Result<SignInResult>) -> Self {
        push(&self.sign_in, result);
        self
    }

    pub fn script_confirm_sign_in(self, result: usher_provider::Result<SignInResult>) -> Self {
        push(&self.confirm_sign_in, result);
        self
    }

    pub fn script_sign_up(self, result: usher_provider::Result<SignUpResult>) -> Self {
        push(&self.sign_up, result);
        self
    }

    pub fn script_confirm_sign_up(self, result: usher_provider::Result<SignUpResult>) -> Self {
        push(&self.confirm_sign_up, result);
        self
    }

    pub fn script_resend_sign_up_code(
        self,
        result: usher_provider::Result<DeliveryDetails>,
    ) -> Self {
        push(&self.resend_sign_up_code, result);
        self
    }

    pub fn script_reset_password(
        self,
        result: usher_provider::Result<ResetPasswordResult>,
    ) -> Self {
        push(&self.reset_password, result);
        self
    }

    pub fn script_confirm_reset_password(self, result: usher_provider::Result<()>) -> Self {
        push(&self.confirm_reset_password, result);
        self
    }

    pub fn script_fetch_user_attributes(
        self,
        result: usher_provider::Result<Vec<UserAttribute>>,
    ) -> Self {
        push(&self.fetch_user_attributes, result);
        self
    }

    pub fn script_resend_confirmation_code(
        self,
        result: usher_provider::Result<DeliveryDetails>,
    ) -> Self {
        push(&self.resend_confirmation_code, result);
        self
    }

    pub fn script_confirm_user_attribute(self, result: usher_provider::Result<()>) -> Self {
        push(&self.confirm_user_attribute, result);
        self
    }

    pub fn script_current_user(self, result: usher_provider::Result<User>) -> Self {
        push(&self.current_user, result);
        self
    }

    pub fn script_fetch_session(self, result: usher_provider::Result<AuthSession>) -> Self {
        push(&self.fetch_session, result);
        self
    }

    pub fn script_sign_out(self, result: usher_provider::Result<SignOutResult>) -> Self {
        push(&self.sign_out, result);
        self
    }

    /// Make `ready()` fail once with the given error.
    pub fn with_ready_error(self, error: ProviderError) -> Self {
        *self.ready_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }

    /// Park every subsequent operation on a gate until the test releases
    /// it. Used to hold a call in flight while the flow moves on.
    pub fn gated(mut self) -> (Self, Gate) {
        let gate = Gate::new();
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Handle for emitting provider events after the provider has been
    /// moved into a flow.
    pub fn event_sender(&self) -> broadcast::Sender<AuthEvent> {
        self.events.clone()
    }

    /// Every call made so far, with debug-formatted arguments.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn user(username: &str) -> User {
        User {
            username: username.to_string(),
            user_id: format!("{username}-id"),
        }
    }

    pub fn email_delivery(destination: &str) -> DeliveryDetails {
        DeliveryDetails {
            destination: Some(destination.to_string()),
            medium: DeliveryMedium::Email,
            attribute: None,
        }
    }

    pub fn session(is_signed_in: bool, credentials_usable: bool) -> AuthSession {
        AuthSession {
            is_signed_in,
            credentials_usable,
        }
    }

    async fn enter(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn sign_in(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> usher_provider::Result<SignInResult> {
        self.enter(format!("sign_in({username:?}, {password:?})")).await;
        pop(&self.sign_in, "sign_in")
    }

    async fn confirm_sign_in(
        &self,
        challenge_response: &str,
    ) -> usher_provider::Result<SignInResult> {
        self.enter(format!("confirm_sign_in({challenge_response:?})")).await;
        pop(&self.confirm_sign_in, "confirm_sign_in")
    }

    async fn sign_up(
        &self,
        username: &str,
        password: Option<&str>,
        attributes: &[UserAttribute],
    ) -> usher_provider::Result<SignUpResult> {
        self.enter(format!("sign_up({username:?}, {password:?}, {attributes:?})"))
            .await;
        pop(&self.sign_up, "sign_up")
    }

    async fn confirm_sign_up(
        &self,
        username: &str,
        code: &str,
    ) -> usher_provider::Result<SignUpResult> {
        self.enter(format!("confirm_sign_up({username:?}, {code:?})")).await;
        pop(&self.confirm_sign_up, "confirm_sign_up")
    }

    async fn resend_sign_up_code(
        &self,
        username: &str,
    ) -> usher_provider::Result<DeliveryDetails> {
        self.enter(format!("resend_sign_up_code({username:?})")).await;
        pop(&self.resend_sign_up_code, "resend_sign_up_code")
    }

    async fn reset_password(
        &self,
        username: &str,
    ) -> usher_provider::Result<ResetPasswordResult> {
        self.enter(format!("reset_password({username:?})")).await;
        pop(&self.reset_password, "reset_password")
    }

    async fn confirm_reset_password(
        &self,
        username: &str,
        new_password: &str,
        code: &str,
    ) -> usher_provider::Result<()> {
        let _ = new_password;
        self.enter(format!("confirm_reset_password({username:?}, _, {code:?})"))
            .await;
        pop(&self.confirm_reset_password, "confirm_reset_password")
    }

    async fn fetch_user_attributes(&self) -> usher_provider::Result<Vec<UserAttribute>> {
        self.enter("fetch_user_attributes()".to_string()).await;
        pop(&self.fetch_user_attributes, "fetch_user_attributes")
    }

    async fn resend_confirmation_code(
        &self,
        attribute: &AttributeKey,
    ) -> usher_provider::Result<DeliveryDetails> {
        self.enter(format!("resend_confirmation_code({attribute})")).await;
        pop(&self.resend_confirmation_code, "resend_confirmation_code")
    }

    async fn confirm_user_attribute(
        &self,
        attribute: &AttributeKey,
        code: &str,
    ) -> usher_provider::Result<()> {
        self.enter(format!("confirm_user_attribute({attribute}, {code:?})"))
            .await;
        pop(&self.confirm_user_attribute, "confirm_user_attribute")
    }

    async fn current_user(&self) -> usher_provider::Result<User> {
        self.enter("current_user()".to_string()).await;
        pop(&self.current_user, "current_user")
    }

    async fn fetch_session(
        &self,
        options: SessionOptions,
    ) -> usher_provider::Result<AuthSession> {
        self.enter(format!("fetch_session({options:?})")).await;
        pop(&self.fetch_session, "fetch_session")
    }

    async fn sign_out(&self) -> usher_provider::Result<SignOutResult> {
        self.enter("sign_out()".to_string()).await;
        pop(&self.sign_out, "sign_out")
    }

    fn ready(&self) -> usher_provider::Result<()> {
        let error = self
            .ready_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn events(&self) -> Option<broadcast::Receiver<AuthEvent>> {
        Some(self.events.subscribe())
    }
}

/// Two-sided latch: provider calls park on [`pass`](Gate::pass) until the
/// test calls [`release`](Gate::release); the test awaits
/// [`acquired`](Gate::acquired) to know a call is parked.
#[derive(Clone)]
pub struct Gate {
    inner: Arc<GateInner>,
}

struct GateInner {
    entered: watch::Sender<u32>,
    open: watch::Sender<bool>,
}

impl Gate {
    fn new() -> Self {
        let (entered, _) = watch::channel(0);
        let (open, _) = watch::channel(false);
        Self {
            inner: Arc::new(GateInner { entered, open }),
        }
    }

    async fn pass(&self) {
        self.inner.entered.send_modify(|n| *n += 1);
        let mut open = self.inner.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
    }

    /// Wait until at least one provider call is parked on the gate.
    pub async fn acquired(&self) {
        let mut entered = self.inner.entered.subscribe();
        let _ = entered.wait_for(|n| *n > 0).await;
    }

    pub fn release(&self) {
        self.inner.open.send_replace(true);
    }
}
