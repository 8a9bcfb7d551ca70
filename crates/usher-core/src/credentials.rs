use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::classifier::DisplayMessage;

/// Sign-in material shared across sequential steps of one ceremony, so a
/// value captured at sign-up is available to the follow-up sign-in and to
/// a pre-filled form. Cloning shares the same record. Lives for the whole
/// flow instance; cleared at teardown, never on ordinary step transitions.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    username: Option<String>,
    password: Option<String>,
    message: Option<DisplayMessage>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn username(&self) -> Option<String> {
        self.lock().username.clone()
    }

    pub(crate) fn password(&self) -> Option<String> {
        self.lock().password.clone()
    }

    /// Replace the stored pair with what the user just submitted.
    pub(crate) fn store_login(&self, username: Option<&str>, password: Option<&str>) {
        let mut inner = self.lock();
        inner.username = username.map(str::to_string);
        inner.password = password.map(str::to_string);
    }

    pub(crate) fn store_username(&self, username: &str) {
        self.lock().username = Some(username.to_string());
    }

    /// Last classified error parked here by an internal transition (the
    /// auto sign-in after sign-up failing). Reading does not clear it.
    pub fn message(&self) -> Option<DisplayMessage> {
        self.lock().message.clone()
    }

    /// Read and clear the parked message.
    pub fn take_message(&self) -> Option<DisplayMessage> {
        self.lock().message.take()
    }

    pub(crate) fn set_message(&self, message: DisplayMessage) {
        self.lock().message = Some(message);
    }

    pub(crate) fn clear(&self) {
        *self.lock() = Inner::default();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
