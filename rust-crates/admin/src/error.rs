use thiserror::Error;

/// Everything an operator action can fail with.
///
/// None of these are fatal: the console reports them in its status area and waits
/// for the operator to try again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("no players selected")]
    NoSelection,
    #[error("amount must be a positive whole number (got {input:?})")]
    InvalidAmount { input: String },
    #[error("{endpoint} request failed: {reason}")]
    NetworkFailure {
        endpoint: &'static str,
        reason: String,
    },
    #[error("session missing or expired, log in again")]
    AuthRequired,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid value {value:?} for {field}")]
    InvalidCatalogValue { field: &'static str, value: String },
    #[error("session storage failed: {0}")]
    SessionStorage(String),
}

impl ConsoleError {
    pub fn network(endpoint: &'static str, reason: impl ToString) -> Self {
        Self::NetworkFailure {
            endpoint,
            reason: reason.to_string(),
        }
    }

    /// Whether the operator has to log in again before anything else can succeed.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::AuthRequired)
    }
}
