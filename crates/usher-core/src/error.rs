use thiserror::Error;
use usher_provider::ProviderError;

pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors returned by flow action methods. Provider failures have already
/// been classified into the step's message signal by the time the caller
/// sees them; the value here is for hosts that want to react beyond
/// showing the banner.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Another action on this state is still running.
    #[error("another action is already in flight")]
    ActionInFlight,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
