pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod negotiators;
pub mod proxy;
pub mod request;
pub mod transport;

pub use browser::{Browser, BrowserOptions};
pub use config::{Settings, SettingsPatch, UserAgentMode};
pub use error::{ConfigError, Error, Result, TransportError};
pub use request::{MergedParams, Method, Request, RequestParams};
pub use transport::{Response, Transport};

/// Initializes the logging system for the application.
///
/// # Arguments
///
/// * `log_level`: The desired verbosity level for logging.
///
/// # Returns
///
/// A result indicating the success or failure of the logging setup.
#[cfg(feature = "log")]
pub fn initialize_logging(log_level: log::LevelFilter) -> anyhow::Result<()> {
    stderrlog::new()
        .module(module_path!())
        .show_module_names(true)
        .verbosity(log_level)
        .init()?;
    Ok(())
}

/// Fetches `url` with the shared browser, building it with default options
/// if needed.
pub async fn get(url: &str) -> Result<Response> {
    Browser::instance(BrowserOptions::default())?
        .get(url)
        .await
}
