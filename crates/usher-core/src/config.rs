use usher_provider::SessionOptions;

use crate::classifier::MessageOverride;
use crate::step::InitialStep;

/// Tunables for a flow, applied at build time.
#[derive(Clone, Default)]
pub struct FlowConfig {
    /// Ceremony the flow starts on and returns to after sign-out.
    pub initial_step: InitialStep,
    /// Passed through to the provider when bootstrapping the session.
    pub session_options: SessionOptions,
    /// Gets first crack at turning a provider error into a display
    /// message, ahead of the built-in catalog.
    pub message_override: Option<MessageOverride>,
}

impl std::fmt::Debug for FlowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowConfig")
            .field("initial_step", &self.initial_step)
            .field("session_options", &self.session_options)
            .field("message_override", &self.message_override.is_some())
            .finish()
    }
}
