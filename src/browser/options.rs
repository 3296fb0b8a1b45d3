use std::{fmt, path::PathBuf, sync::Arc};

use crate::{config::SettingsPatch, transport::Transport};

/// Options used the first time the browser is built.
///
/// Layering is defaults, then the config file, then `settings`, then
/// `cache_dir`. Once the browser exists, options passed to
/// [`Browser::instance`](super::Browser::instance) are ignored.
#[derive(Clone, Default)]
pub struct BrowserOptions {
    /// Config file to read instead of the default one.
    pub config_file: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    /// Overrides applied on top of the config file.
    pub settings: SettingsPatch,
    /// Replaces the default hyper transport.
    pub transport: Option<Arc<dyn Transport>>,
}

impl BrowserOptions {
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    pub fn with_settings(mut self, settings: SettingsPatch) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

impl fmt::Debug for BrowserOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserOptions")
            .field("config_file", &self.config_file)
            .field("cache_dir", &self.cache_dir)
            .field("settings", &self.settings)
            .field("transport", &self.transport.as_ref().map(|_| "custom"))
            .finish()
    }
}
