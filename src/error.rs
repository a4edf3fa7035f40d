#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("No active subscription")]
    NoActiveSubscription,
    #[error("Setting unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SubmitError {
    #[error("Presence service not available")]
    ServiceUnavailable,
    #[error("Publish rejected by transport: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Debounce window must be greater than zero")]
    ZeroDebounceWindow,
    #[error("Invalid provision error pattern: {0:?}")]
    InvalidPattern(String),
    #[error("JSON processing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Publisher actor is not running")]
    ActorUnavailable,
}
