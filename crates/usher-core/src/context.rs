use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use usher_provider::{IdentityProvider, ProviderError, SessionOptions};

use crate::classifier::{DisplayMessage, MessageCatalog};
use crate::credentials::Credentials;
use crate::step::{InitialStep, Step, StepKind};
use crate::subscription::EventSubscription;

/// The single place the current step lives. All writers funnel through
/// the inner mutex, so readers observing the watch channel see one
/// serialized history of steps with no interleaved half-updates.
#[derive(Debug)]
pub(crate) struct StepStore {
    current: watch::Sender<Step>,
    inner: Mutex<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    previous: Option<Step>,
    /// Bumped on every user-initiated move so commits carrying an older
    /// observation are recognized as stale and dropped.
    epoch: u64,
}

impl StepStore {
    pub(crate) fn new(initial: Step) -> Self {
        let (current, _) = watch::channel(initial);
        Self {
            current,
            inner: Mutex::new(StoreInner {
                previous: None,
                epoch: 0,
            }),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Step> {
        self.current.subscribe()
    }

    pub(crate) fn current(&self) -> Step {
        self.current.borrow().clone()
    }

    pub(crate) fn previous(&self) -> Option<Step> {
        self.lock().previous.clone()
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Publish the outcome of an action begun at `observed_epoch`. Returns
    /// false when the flow moved on in the meantime and the step was
    /// discarded.
    pub(crate) fn commit(&self, observed_epoch: u64, step: Step) -> bool {
        let mut inner = self.lock();
        if inner.epoch != observed_epoch {
            tracing::debug!(step = %step.kind(), "dropping stale step commit");
            return false;
        }
        self.apply(&mut inner, step)
    }

    /// Publish unconditionally, invalidating any action still in flight.
    /// This is how externally observed events (sign-out, session expiry)
    /// override whatever the user was doing.
    pub(crate) fn force(&self, step: Step) -> bool {
        let mut inner = self.lock();
        inner.epoch += 1;
        self.apply(&mut inner, step)
    }

    /// A user-requested jump between ceremonies. Rejected once signed in
    /// and when already on the requested step; otherwise it invalidates
    /// in-flight actions and moves.
    pub(crate) fn navigate(&self, step: Step) -> bool {
        let mut inner = self.lock();
        let current = self.current.borrow().clone();
        if matches!(current, Step::SignedIn { .. }) {
            tracing::warn!(requested = %step.kind(), "navigation rejected while signed in");
            return false;
        }
        if current == step {
            tracing::debug!(step = %step.kind(), "already on the requested step");
            return false;
        }
        inner.epoch += 1;
        self.apply(&mut inner, step)
    }

    fn apply(&self, inner: &mut StoreInner, step: Step) -> bool {
        if self.current.borrow().is_terminal() {
            tracing::warn!(requested = %step.kind(), "step change ignored in terminal error state");
            return false;
        }
        tracing::debug!(to = %step.kind(), "step changed");
        let replaced = self.current.send_replace(step);
        inner.previous = Some(replaced);
        true
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything the per-step handles share. Owned behind one `Arc` by the
/// flow and by each handle; the provider event listener deliberately
/// captures only the store so the context itself can drop.
pub(crate) struct FlowContext {
    pub(crate) provider: Arc<dyn IdentityProvider>,
    pub(crate) store: Arc<StepStore>,
    pub(crate) credentials: Credentials,
    pub(crate) catalog: MessageCatalog,
    pub(crate) initial_step: InitialStep,
    pub(crate) session_options: SessionOptions,
    events: Mutex<Option<EventSubscription>>,
}

impl FlowContext {
    pub(crate) fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<StepStore>,
        credentials: Credentials,
        catalog: MessageCatalog,
        initial_step: InitialStep,
        session_options: SessionOptions,
    ) -> Self {
        Self {
            provider,
            store,
            credentials,
            catalog,
            initial_step,
            session_options,
            events: Mutex::new(None),
        }
    }

    pub(crate) fn current_step(&self) -> Step {
        self.store.current()
    }

    pub(crate) fn observed_epoch(&self) -> u64 {
        self.store.epoch()
    }

    pub(crate) fn commit(&self, observed_epoch: u64, step: Step) -> bool {
        self.store.commit(observed_epoch, step)
    }

    pub(crate) fn classify(&self, error: &ProviderError, at: StepKind) -> DisplayMessage {
        self.catalog.classify(error, at)
    }

    /// Start listening for provider-side events, if the provider emits
    /// any. Replacing an existing subscription drops (and aborts) it.
    pub(crate) fn attach_events(&self) {
        if let Some(receiver) = self.provider.events() {
            let subscription =
                EventSubscription::spawn(receiver, Arc::clone(&self.store), self.initial_step);
            let mut slot = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = Some(subscription);
        }
    }

    pub(crate) fn detach_events(&self) {
        let mut slot = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usher_provider::User;

    fn signed_in() -> Step {
        Step::SignedIn {
            user: User {
                username: "pat".to_string(),
                user_id: "u-1".to_string(),
            },
        }
    }

    #[test]
    fn commit_applies_and_tracks_previous() {
        let store = StepStore::new(Step::SignIn);
        let epoch = store.epoch();
        assert!(store.commit(epoch, Step::ConfirmSignInWithTotpCode));
        assert_eq!(store.current(), Step::ConfirmSignInWithTotpCode);
        assert_eq!(store.previous(), Some(Step::SignIn));
    }

    #[test]
    fn stale_commit_is_dropped() {
        let store = StepStore::new(Step::SignIn);
        let observed = store.epoch();
        assert!(store.navigate(Step::SignUp));
        assert!(!store.commit(observed, Step::ConfirmSignInWithTotpCode));
        assert_eq!(store.current(), Step::SignUp);
    }

    #[test]
    fn force_invalidates_in_flight_commits() {
        let store = StepStore::new(Step::SignIn);
        let observed = store.epoch();
        assert!(store.force(signed_in()));
        assert!(!store.commit(observed, Step::ConfirmSignInWithTotpCode));
        assert_eq!(store.current(), signed_in());
    }

    #[test]
    fn navigation_is_rejected_while_signed_in() {
        let store = StepStore::new(Step::SignIn);
        store.force(signed_in());
        assert!(!store.navigate(Step::SignIn));
        assert_eq!(store.current(), signed_in());
    }

    #[test]
    fn navigation_to_the_current_step_is_a_no_op() {
        let store = StepStore::new(Step::SignIn);
        let epoch = store.epoch();
        assert!(!store.navigate(Step::SignIn));
        assert_eq!(store.epoch(), epoch);
        assert_eq!(store.previous(), None);
    }

    #[test]
    fn error_step_is_terminal() {
        let store = StepStore::new(Step::SignIn);
        store.force(Step::Error {
            message: DisplayMessage::new("provider misconfigured"),
        });
        assert!(!store.navigate(Step::SignUp));
        assert!(!store.force(Step::SignIn));
        let epoch = store.epoch();
        assert!(!store.commit(epoch, Step::SignIn));
        assert!(matches!(store.current(), Step::Error { .. }));
    }

    #[test]
    fn subscribers_observe_committed_steps() {
        let store = StepStore::new(Step::SignIn);
        let mut steps = store.subscribe();
        assert!(!steps.has_changed().unwrap());
        store.force(Step::ResetPassword);
        assert!(steps.has_changed().unwrap());
        assert_eq!(*steps.borrow_and_update(), Step::ResetPassword);
    }
}
