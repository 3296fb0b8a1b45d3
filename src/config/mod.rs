pub mod loader;
mod patch;

use std::{borrow::Cow, env::current_dir, path::PathBuf};

use fake::{faker::internet::en::UserAgent, Fake};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use patch::SettingsPatch;

/// File name looked up in the user config directory when no explicit
/// config file is given.
pub const CONFIG_FILE_NAME: &str = "browser.conf.json";

/// How the `User-Agent` header is chosen for each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserAgentMode {
    /// Always send `user_agent`.
    #[default]
    Static,
    /// Pick one agent from the pool when the mode is applied, then keep it.
    SemiStatic,
    /// Pick a fresh agent from the pool for every request.
    Random,
}

/// The browser's connection settings.
///
/// Every field has a default, so a partial config file only changes the keys
/// it names. Updates go through [`Settings::apply`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub user_agent: String,
    pub user_agent_mode: UserAgentMode,
    pub available_user_agents: Vec<String>,
    /// `host:port`, optionally prefixed with `http://` or `socks5://`.
    pub proxy: Option<String>,
    /// `user:pass` sent to the proxy.
    pub proxy_auth: Option<String>,
    /// `user:pass` sent to the target as a basic `Authorization` header.
    pub basic_auth: Option<String>,
    /// Upper bound on concurrent requests, never below 1.
    pub max_threads: usize,
    /// Seconds a response stays cached, 0 disables caching.
    pub cache_ttl: u64,
    /// Milliseconds for a whole request, 0 for no limit.
    pub request_timeout: u64,
    /// Milliseconds to establish a connection, 0 for no limit.
    pub connect_timeout: u64,
    pub cache_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into(),
            user_agent_mode: UserAgentMode::Static,
            available_user_agents: Vec::new(),
            proxy: None,
            proxy_auth: None,
            basic_auth: None,
            max_threads: 1,
            cache_ttl: 600,
            request_timeout: 60_000,
            connect_timeout: 10_000,
            cache_dir: default_cache_dir(),
        }
    }
}

impl Settings {
    /// Names accepted by [`Settings::field`], in declaration order.
    pub const FIELDS: [&'static str; 11] = [
        "user_agent",
        "user_agent_mode",
        "available_user_agents",
        "proxy",
        "proxy_auth",
        "basic_auth",
        "max_threads",
        "cache_ttl",
        "request_timeout",
        "connect_timeout",
        "cache_dir",
    ];

    /// Returns the JSON value of a setting by its config-file key.
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "user_agent" => json!(self.user_agent),
            "user_agent_mode" => json!(self.user_agent_mode),
            "available_user_agents" => json!(self.available_user_agents),
            "proxy" => json!(self.proxy),
            "proxy_auth" => json!(self.proxy_auth),
            "basic_auth" => json!(self.basic_auth),
            "max_threads" => json!(self.max_threads),
            "cache_ttl" => json!(self.cache_ttl),
            "request_timeout" => json!(self.request_timeout),
            "connect_timeout" => json!(self.connect_timeout),
            "cache_dir" => json!(self.cache_dir),
            _ => return None,
        };
        Some(value)
    }

    /// Iterates over every `(name, value)` pair listed in [`Settings::FIELDS`].
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, Value)> + '_ {
        Self::FIELDS
            .iter()
            .filter_map(move |name| self.field(name).map(|value| (*name, value)))
    }

    /// Overwrites the fields present in `patch` and leaves the rest alone.
    ///
    /// The patch is expected to be validated already; see
    /// [`SettingsPatch::validate`].
    pub fn apply(&mut self, patch: SettingsPatch) {
        let reroll_agent = patch.user_agent.is_none()
            && (patch.user_agent_mode.is_some() || patch.available_user_agents.is_some());

        if let Some(user_agent) = patch.user_agent {
            self.user_agent = user_agent;
        }
        if let Some(mode) = patch.user_agent_mode {
            self.user_agent_mode = mode;
        }
        if let Some(agents) = patch.available_user_agents {
            self.available_user_agents = agents;
        }
        if let Some(proxy) = patch.proxy {
            self.proxy = Some(proxy);
        }
        if let Some(proxy_auth) = patch.proxy_auth {
            self.proxy_auth = Some(proxy_auth);
        }
        if let Some(basic_auth) = patch.basic_auth {
            self.basic_auth = Some(basic_auth);
        }
        if let Some(max_threads) = patch.max_threads {
            self.max_threads = max_threads.max(1);
        }
        if let Some(cache_ttl) = patch.cache_ttl {
            self.cache_ttl = cache_ttl;
        }
        if let Some(request_timeout) = patch.request_timeout {
            self.request_timeout = request_timeout;
        }
        if let Some(connect_timeout) = patch.connect_timeout {
            self.connect_timeout = connect_timeout;
        }
        if let Some(cache_dir) = patch.cache_dir {
            self.cache_dir = cache_dir;
        }

        // An explicit agent, or one already drawn from the pool, is kept.
        if reroll_agent
            && self.user_agent_mode == UserAgentMode::SemiStatic
            && !self.available_user_agents.contains(&self.user_agent)
        {
            self.user_agent = pick_user_agent(&self.available_user_agents);
        }
    }

    /// The user agent to send with the next request, honouring the mode.
    pub fn effective_user_agent(&self) -> Cow<'_, str> {
        match self.user_agent_mode {
            UserAgentMode::Random => Cow::Owned(pick_user_agent(&self.available_user_agents)),
            UserAgentMode::Static | UserAgentMode::SemiStatic => Cow::Borrowed(&self.user_agent),
        }
    }

    /// Location of the cookie jar handed to the transport.
    pub fn cookie_jar(&self) -> PathBuf {
        self.cache_dir.join("browser").join("cookie-jar")
    }
}

/// Picks a random agent from `pool`, or generates a browser-like one when
/// the pool is empty.
fn pick_user_agent(pool: &[String]) -> String {
    if pool.is_empty() {
        return UserAgent().fake::<String>();
    }
    let index = (0..pool.len()).fake::<usize>();
    pool[index].clone()
}

/// Retrieves the cache directory used for cookie jars.
///
/// # Returns
///
/// `<user cache dir>/wayfare`, or the current directory if the platform has
/// no cache directory.
pub fn default_cache_dir() -> PathBuf {
    if let Some(base_dirs) = directories::BaseDirs::new() {
        base_dirs.cache_dir().join(env!("CARGO_PKG_NAME"))
    } else {
        #[cfg(feature = "log")]
        log::warn!("Failed to get local cache directory, using current directory instead");
        current_dir().unwrap_or_default()
    }
}

/// Path of the config file read when no `config_file` option is given.
pub fn default_config_file() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|base_dirs| {
        base_dirs
            .config_dir()
            .join(env!("CARGO_PKG_NAME"))
            .join(CONFIG_FILE_NAME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_patch_keeps_other_fields() {
        let mut settings = Settings::default();
        let before = settings.clone();

        settings.apply(SettingsPatch {
            cache_ttl: Some(5),
            proxy: Some("127.0.0.1:8080".into()),
            ..Default::default()
        });

        assert_eq!(settings.cache_ttl, 5);
        assert_eq!(settings.proxy.as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(settings.user_agent, before.user_agent);
        assert_eq!(settings.request_timeout, before.request_timeout);
        assert_eq!(settings.cache_dir, before.cache_dir);
    }

    #[test]
    fn test_max_threads_never_below_one() {
        let mut settings = Settings::default();
        settings.apply(SettingsPatch {
            max_threads: Some(0),
            ..Default::default()
        });
        assert_eq!(settings.max_threads, 1);

        settings.apply(SettingsPatch {
            max_threads: Some(8),
            ..Default::default()
        });
        assert_eq!(settings.max_threads, 8);
    }

    #[test]
    fn test_semi_static_picks_from_pool_once() {
        let pool = vec!["UA-1".to_string(), "UA-2".to_string()];
        let mut settings = Settings::default();
        settings.apply(SettingsPatch {
            user_agent_mode: Some(UserAgentMode::SemiStatic),
            available_user_agents: Some(pool.clone()),
            ..Default::default()
        });

        assert!(pool.contains(&settings.user_agent));
        let picked = settings.user_agent.clone();
        for _ in 0..10 {
            assert_eq!(settings.effective_user_agent(), picked);
        }
    }

    #[test]
    fn test_random_mode_stays_within_pool() {
        let pool = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let mut settings = Settings::default();
        settings.apply(SettingsPatch {
            user_agent_mode: Some(UserAgentMode::Random),
            available_user_agents: Some(pool.clone()),
            ..Default::default()
        });

        for _ in 0..20 {
            assert!(pool.contains(&settings.effective_user_agent().into_owned()));
        }
    }

    #[test]
    fn test_random_mode_with_empty_pool_generates_agent() {
        let mut settings = Settings::default();
        settings.apply(SettingsPatch {
            user_agent_mode: Some(UserAgentMode::Random),
            ..Default::default()
        });
        assert!(!settings.effective_user_agent().is_empty());
    }

    #[test]
    fn test_fields_cover_every_name() {
        let settings = Settings::default();
        let fields: Vec<_> = settings.fields().collect();

        assert_eq!(fields.len(), Settings::FIELDS.len());
        assert_eq!(settings.field("max_threads"), Some(json!(1)));
        assert_eq!(settings.field("user_agent_mode"), Some(json!("static")));
        assert_eq!(settings.field("proxy"), Some(Value::Null));
        assert_eq!(settings.field("nope"), None);
    }

    #[test]
    fn test_cookie_jar_lives_under_cache_dir() {
        let settings = Settings {
            cache_dir: PathBuf::from("/tmp/wayfare"),
            ..Default::default()
        };
        assert_eq!(
            settings.cookie_jar(),
            PathBuf::from("/tmp/wayfare/browser/cookie-jar")
        );
    }

    #[test]
    fn test_semi_static_keeps_explicit_agent() {
        let mut settings = Settings::default();
        settings.apply(SettingsPatch {
            user_agent: Some("Explicit".into()),
            user_agent_mode: Some(UserAgentMode::SemiStatic),
            available_user_agents: Some(vec!["PoolA".into()]),
            ..Default::default()
        });
        assert_eq!(settings.user_agent, "Explicit");

        // A later pool change that still holds the current agent keeps it.
        settings.apply(SettingsPatch {
            available_user_agents: Some(vec!["PoolA".into(), "Explicit".into()]),
            ..Default::default()
        });
        assert_eq!(settings.user_agent, "Explicit");

        // One that drops it draws a new agent from the pool.
        settings.apply(SettingsPatch {
            available_user_agents: Some(vec!["PoolB".into()]),
            ..Default::default()
        });
        assert_eq!(settings.user_agent, "PoolB");
    }
}
