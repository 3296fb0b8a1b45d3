use std::{path::PathBuf, time::Duration};

/// Errors raised while loading or validating browser settings.
///
/// A failed load never leaves the settings half-applied: the file is read,
/// parsed and validated before anything is written.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config path is a symbolic link. Checked before the file is read.
    #[error("config file {} is a symlink", .0.display())]
    Symlink(PathBuf),

    #[error("unable to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value was well-formed JSON but not an acceptable setting.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failures reported by a [`Transport`](crate::transport::Transport).
///
/// These are handed back to the caller untouched: they are never cached and
/// never retried.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("unable to build request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("client error: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("proxy negotiation failed: {0}")]
    Proxy(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("transport is shut down")]
    Closed,
}

/// Top level error returned by [`Browser`](crate::Browser) calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
