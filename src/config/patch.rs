use std::path::PathBuf;

use serde::Deserialize;

use super::UserAgentMode;
use crate::{error::ConfigError, proxy::models::ProxyAddr};

/// A partial update of [`Settings`](super::Settings).
///
/// This is both the shape of the JSON config file and of runtime options.
/// `None` (an absent key or a JSON `null`) leaves the setting unchanged.
/// Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub user_agent: Option<String>,
    pub user_agent_mode: Option<UserAgentMode>,
    pub available_user_agents: Option<Vec<String>>,
    pub proxy: Option<String>,
    pub proxy_auth: Option<String>,
    pub basic_auth: Option<String>,
    pub max_threads: Option<usize>,
    pub cache_ttl: Option<u64>,
    pub request_timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub cache_dir: Option<PathBuf>,
}

impl SettingsPatch {
    /// Checks values serde cannot: proxy address shape and `user:pass`
    /// credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(proxy) = &self.proxy {
            proxy
                .parse::<ProxyAddr>()
                .map_err(|reason| ConfigError::Invalid {
                    field: "proxy",
                    reason,
                })?;
        }

        for (field, credentials) in [
            ("proxy_auth", &self.proxy_auth),
            ("basic_auth", &self.basic_auth),
        ] {
            if let Some(credentials) = credentials {
                check_credentials(credentials)
                    .map_err(|reason| ConfigError::Invalid { field, reason })?;
            }
        }
        Ok(())
    }

    /// Layers `other` on top of `self`: keys set in `other` win.
    pub fn merge(mut self, other: SettingsPatch) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            user_agent,
            user_agent_mode,
            available_user_agents,
            proxy,
            proxy_auth,
            basic_auth,
            max_threads,
            cache_ttl,
            request_timeout,
            connect_timeout,
            cache_dir
        );
        self
    }
}

fn check_credentials(credentials: &str) -> Result<(), String> {
    match credentials.split_once(':') {
        Some((user, _)) if !user.is_empty() => Ok(()),
        _ => Err(format!("expected user:pass, got {:?}", credentials)),
    }
}
