#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The identity service rejected an operation.
    #[error("Identity service error during {operation}: {detail}")]
    Auth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    /// An operation that needs a signed-in account was called without one.
    #[error("No account is signed in")]
    NotSignedIn,

    /// Navigation target is not in the route table.
    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    /// Not a recognized role label.
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[cfg(feature = "rest")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
