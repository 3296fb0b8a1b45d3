mod options;

use std::{
    fs,
    path::Path,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use hyper::body::Bytes;
use serde_json::Value;

pub use options::BrowserOptions;

use crate::{
    cache::CacheGate,
    config::{default_config_file, loader::load_patch, Settings, SettingsPatch, UserAgentMode},
    error::{ConfigError, Result},
    request::{merge_request_params, MergedParams, Method, Request, RequestParams},
    transport::{HyperTransport, Response, Transport},
};

static INSTANCE: RwLock<Option<Arc<Browser>>> = RwLock::new(None);

/// The process-wide HTTP facade.
///
/// There is at most one browser per process. It is built lazily by
/// [`Browser::instance`] and dropped by [`Browser::reset`]; it cannot be
/// constructed directly:
///
/// ```compile_fail
/// let browser = wayfare::Browser {
///     settings: Default::default(),
///     gate: Default::default(),
///     transport: unimplemented!(),
/// };
/// ```
pub struct Browser {
    settings: RwLock<Settings>,
    gate: CacheGate,
    transport: Arc<dyn Transport>,
}

impl Browser {
    /// Returns the browser, building it on first use.
    ///
    /// # Arguments
    ///
    /// * `options`: Only used when the browser does not exist yet.
    ///
    /// # Returns
    ///
    /// The shared browser, or the error that prevented building it. A failed
    /// build leaves no browser behind.
    pub fn instance(options: BrowserOptions) -> Result<Arc<Browser>, ConfigError> {
        if let Some(browser) = read(&INSTANCE).as_ref() {
            #[cfg(feature = "log")]
            log::debug!("Browser already built, ignoring options");
            return Ok(browser.clone());
        }

        let mut slot = write(&INSTANCE);
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }
        let browser = Arc::new(Self::build(options)?);
        *slot = Some(browser.clone());
        Ok(browser)
    }

    /// Returns the browser if it has been built.
    pub fn current() -> Option<Arc<Browser>> {
        read(&INSTANCE).clone()
    }

    /// Drops the shared browser; the next [`Browser::instance`] call builds a
    /// fresh one. Handles obtained earlier keep working on the old state.
    pub fn reset() {
        if write(&INSTANCE).take().is_some() {
            #[cfg(feature = "log")]
            log::debug!("Browser reset");
        }
    }

    fn build(options: BrowserOptions) -> Result<Self, ConfigError> {
        let file_patch = match &options.config_file {
            Some(path) => load_patch(path)?,
            None => match default_config_file() {
                // symlink_metadata so a symlinked default file is still refused
                Some(path) if fs::symlink_metadata(&path).is_ok() => load_patch(&path)?,
                _ => SettingsPatch::default(),
            },
        };
        options.settings.validate()?;

        let mut patch = file_patch.merge(options.settings);
        if let Some(cache_dir) = options.cache_dir {
            patch.cache_dir = Some(cache_dir);
        }

        let mut settings = Settings::default();
        settings.apply(patch);

        let transport = options
            .transport
            .unwrap_or_else(|| Arc::new(HyperTransport::new(settings.max_threads)));

        #[cfg(feature = "log")]
        log::debug!(
            "Browser built: cache_ttl={}s max_threads={} proxy={:?}",
            settings.cache_ttl,
            settings.max_threads,
            settings.proxy
        );

        Ok(Self {
            settings: RwLock::new(settings),
            gate: CacheGate::default(),
            transport,
        })
    }

    /// A copy of the current settings.
    pub fn settings(&self) -> Settings {
        read(&self.settings).clone()
    }

    /// Value of one setting by its config-file key.
    pub fn setting(&self, name: &str) -> Option<Value> {
        read(&self.settings).field(name)
    }

    /// Merges a config file onto the current settings.
    ///
    /// Keys present in the file win, the others are left alone. Nothing is
    /// changed when the file is a symlink, unreadable, malformed or invalid.
    pub fn load_config(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let patch = load_patch(path.as_ref())?;
        write(&self.settings).apply(patch);
        Ok(())
    }

    /// Applies runtime overrides, validated first.
    pub fn configure(&self, patch: SettingsPatch) -> Result<(), ConfigError> {
        patch.validate()?;
        write(&self.settings).apply(patch);
        Ok(())
    }

    pub fn set_user_agent(&self, user_agent: impl Into<String>) {
        write(&self.settings).user_agent = user_agent.into();
    }

    pub fn set_user_agent_mode(&self, mode: UserAgentMode) {
        write(&self.settings).apply(SettingsPatch {
            user_agent_mode: Some(mode),
            ..Default::default()
        });
    }

    /// Sets or clears the proxy (`host:port`).
    pub fn set_proxy(&self, proxy: Option<String>) -> Result<(), ConfigError> {
        if proxy.is_some() {
            SettingsPatch {
                proxy: proxy.clone(),
                ..Default::default()
            }
            .validate()?;
        }
        write(&self.settings).proxy = proxy;
        Ok(())
    }

    /// Sets or clears the proxy credentials (`user:pass`).
    pub fn set_proxy_auth(&self, proxy_auth: Option<String>) -> Result<(), ConfigError> {
        if proxy_auth.is_some() {
            SettingsPatch {
                proxy_auth: proxy_auth.clone(),
                ..Default::default()
            }
            .validate()?;
        }
        write(&self.settings).proxy_auth = proxy_auth;
        Ok(())
    }

    /// Sets or clears the basic auth credentials (`user:pass`).
    pub fn set_basic_auth(&self, basic_auth: Option<String>) -> Result<(), ConfigError> {
        if basic_auth.is_some() {
            SettingsPatch {
                basic_auth: basic_auth.clone(),
                ..Default::default()
            }
            .validate()?;
        }
        write(&self.settings).basic_auth = basic_auth;
        Ok(())
    }

    pub fn set_cache_ttl(&self, cache_ttl: u64) {
        write(&self.settings).cache_ttl = cache_ttl;
    }

    /// Resolves call-site parameters against the current settings.
    pub fn merge_request_params(&self, params: RequestParams) -> MergedParams {
        merge_request_params(&read(&self.settings), params)
    }

    /// Builds the request descriptor for `url` without sending it.
    pub fn forge_request(&self, url: &str, params: RequestParams) -> Request {
        Request::forge(&read(&self.settings), url, params)
    }

    pub fn cache(&self) -> &CacheGate {
        &self.gate
    }

    /// Sends a request through the cache.
    ///
    /// # Arguments
    ///
    /// * `url`: The target, passed to the transport as is.
    /// * `params`: Call-site headers, cache TTL, method and body.
    pub async fn request(&self, url: &str, params: RequestParams) -> Result<Response> {
        let request = self.forge_request(url, params);
        Ok(self.gate.fetch(&request, self.transport.as_ref()).await?)
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request(url, RequestParams::default()).await
    }

    pub async fn get_and_follow_location(&self, url: &str) -> Result<Response> {
        self.request(
            url,
            RequestParams {
                follow_location: true,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn head(&self, url: &str) -> Result<Response> {
        self.request(
            url,
            RequestParams {
                method: Method::Head,
                ..Default::default()
            },
        )
        .await
    }

    pub async fn post(&self, url: &str, body: impl Into<Bytes>) -> Result<Response> {
        self.request(
            url,
            RequestParams {
                method: Method::Post,
                body: Some(body.into()),
                ..Default::default()
            },
        )
        .await
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::error::TransportError;

    #[derive(Default)]
    struct EchoTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn execute(&self, request: &Request) -> Result<Response, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response {
                url: request.url.clone(),
                status: 200,
                headers: Vec::new(),
                body: request.params.body.clone().unwrap_or_default(),
            })
        }
    }

    fn browser(transport: Arc<EchoTransport>) -> Browser {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("browser.conf.json");
        fs::write(&path, r#"{"user_agent": "UnitAgent", "cache_ttl": 30}"#).unwrap();

        Browser::build(
            BrowserOptions::default()
                .with_config_file(&path)
                .with_transport(transport),
        )
        .unwrap()
    }

    #[test]
    fn test_options_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("browser.conf.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(br#"{"cache_ttl": 30, "request_timeout": 1234, "cache_dir": "/from/file"}"#)
            .unwrap();

        let browser = Browser::build(
            BrowserOptions::default()
                .with_config_file(&path)
                .with_cache_dir("/from/options")
                .with_settings(SettingsPatch {
                    cache_ttl: Some(5),
                    ..Default::default()
                }),
        )
        .unwrap();

        let settings = browser.settings();
        assert_eq!(settings.cache_ttl, 5);
        assert_eq!(settings.request_timeout, 1234);
        assert_eq!(settings.cache_dir, Path::new("/from/options"));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let result = Browser::build(BrowserOptions::default().with_settings(SettingsPatch {
            basic_auth: Some("no-colon".into()),
            ..Default::default()
        }));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "basic_auth",
                ..
            })
        ));
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            Browser::build(BrowserOptions::default().with_config_file(dir.path().join("nope.json")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_failed_load_leaves_settings_untouched() {
        let browser = browser(Arc::default());
        let before = browser.settings();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"cache_ttl": 1, "proxy": "#).unwrap();
        assert!(matches!(
            browser.load_config(&path),
            Err(ConfigError::Parse { .. })
        ));

        fs::write(&path, r#"{"cache_ttl": 1, "proxy": "nowhere"}"#).unwrap();
        assert!(matches!(
            browser.load_config(&path),
            Err(ConfigError::Invalid { field: "proxy", .. })
        ));

        assert_eq!(browser.settings(), before);
    }

    #[test]
    fn test_setters() {
        let browser = browser(Arc::default());

        browser.set_proxy(Some("127.0.0.1:3128".into())).unwrap();
        browser.set_proxy_auth(Some("user:pass".into())).unwrap();
        assert!(browser.set_proxy(Some("127.0.0.1".into())).is_err());
        assert_eq!(browser.settings().proxy.as_deref(), Some("127.0.0.1:3128"));

        let merged = browser.merge_request_params(RequestParams::default());
        assert_eq!(merged.proxyauth.as_deref(), Some("user:pass"));

        browser.set_proxy(None).unwrap();
        let merged = browser.merge_request_params(RequestParams::default());
        assert_eq!(merged.proxy, None);
        assert_eq!(merged.proxyauth, None);

        browser.set_user_agent("Changed");
        browser.set_cache_ttl(0);
        assert_eq!(browser.setting("user_agent"), Some(Value::from("Changed")));
        assert_eq!(browser.setting("cache_ttl"), Some(Value::from(0)));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let browser = browser(Arc::default());
        assert_eq!(
            browser.merge_request_params(RequestParams::default()),
            browser.merge_request_params(RequestParams::default())
        );
    }

    #[tokio::test]
    async fn test_facade_calls() {
        let transport = Arc::new(EchoTransport::default());
        let browser = browser(transport.clone());

        let first = browser.get("http://example.localhost").await.unwrap();
        let second = browser.get("http://example.localhost").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        browser.head("http://example.localhost").await.unwrap();
        let posted = browser.post("http://example.localhost", "a=1").await.unwrap();
        assert_eq!(posted.body, Bytes::from_static(b"a=1"));
        browser
            .get_and_follow_location("http://example.localhost")
            .await
            .unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
        assert_eq!(browser.cache().len(), 4);
    }
}
