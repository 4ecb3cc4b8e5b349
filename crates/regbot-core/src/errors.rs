/// Core error type for the registration bot.
///
/// Adapter crates map their specific errors into this type so the command
/// router can handle failures consistently (user-facing apology vs fatal).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid settings/secrets. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// The remote client could not be built or failed to authenticate.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Any failure of a remote-table operation.
    #[error("registry error: {0}")]
    Registry(String),

    /// A client was requested while the connection manager is shutting down.
    #[error("connection manager is closing")]
    Closing,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Wrap a table-layer failure as a [`Error::Registry`], tagged with the operation.
    ///
    /// Configuration and initialization failures of the underlying client pass
    /// through unchanged so startup problems stay recognizable.
    pub fn registry(op: &'static str) -> impl FnOnce(Error) -> Error {
        move |e| match e {
            e @ (Error::Config(_) | Error::Initialization(_) | Error::Closing | Error::Registry(_)) => e,
            other => Error::Registry(format!("{op}: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
