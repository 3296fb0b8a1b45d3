use std::{collections::BTreeMap, fmt::Display, path::PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hyper::body::Bytes;

use crate::config::Settings;

/// Header fields keyed by their exact (case-sensitive) name.
pub type Headers = BTreeMap<String, String>;

/// HTTP methods the browser issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Head => "HEAD",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters supplied at the call site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    pub headers: Option<Headers>,
    /// Overrides the configured cache TTL (seconds) for this request.
    pub cache_ttl: Option<u64>,
    pub method: Method,
    pub body: Option<Bytes>,
    pub follow_location: bool,
}

impl RequestParams {
    /// Adds a header field unless one with the same name is already set.
    ///
    /// The first value written for a field always wins, so caller supplied
    /// headers survive every default appended after them.
    pub fn append_header(&mut self, field: &str, value: &str) -> &mut Self {
        self.headers
            .get_or_insert_with(Headers::new)
            .entry(field.to_string())
            .or_insert_with(|| value.to_string());
        self
    }
}

/// Fully resolved parameters for a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedParams {
    pub headers: Headers,
    pub cache_ttl: u64,
    pub ssl_verifypeer: bool,
    /// 0 skips the host name check, 2 enforces it.
    pub ssl_verifyhost: u8,
    pub cookiejar: PathBuf,
    pub cookiefile: PathBuf,
    /// Milliseconds, 0 for no limit.
    pub timeout: u64,
    /// Milliseconds, 0 for no limit.
    pub connecttimeout: u64,
    pub proxy: Option<String>,
    pub proxyauth: Option<String>,
    pub method: Method,
    pub body: Option<Bytes>,
    pub follow_location: bool,
}

/// Resolves call-site parameters against the current settings.
///
/// Caller headers and `cache_ttl` take precedence. TLS flags, cookie jar
/// paths and timeouts always come from `settings`.
pub fn merge_request_params(settings: &Settings, mut params: RequestParams) -> MergedParams {
    params.append_header("User-Agent", &settings.effective_user_agent());

    if let Some(basic_auth) = &settings.basic_auth {
        let credentials = format!("Basic {}", STANDARD.encode(basic_auth));
        params.append_header("Authorization", &credentials);
    }

    let proxy = settings.proxy.clone();
    let proxyauth = proxy.as_ref().and(settings.proxy_auth.clone());
    let cookie_jar = settings.cookie_jar();

    MergedParams {
        headers: params.headers.unwrap_or_default(),
        cache_ttl: params.cache_ttl.unwrap_or(settings.cache_ttl),
        ssl_verifypeer: false,
        ssl_verifyhost: 0,
        cookiejar: cookie_jar.clone(),
        cookiefile: cookie_jar,
        timeout: settings.request_timeout,
        connecttimeout: settings.connect_timeout,
        proxy,
        proxyauth,
        method: params.method,
        body: params.body,
        follow_location: params.follow_location,
    }
}
