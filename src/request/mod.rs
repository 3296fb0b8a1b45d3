pub mod params;

use std::fmt::Display;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::Settings;
pub use params::{merge_request_params, Headers, MergedParams, Method, RequestParams};

/// A request descriptor, ready to be handed to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// The target exactly as supplied by the caller.
    pub url: String,
    pub params: MergedParams,
}

impl Request {
    /// Merges `params` with `settings` and wraps the result with `url`.
    ///
    /// No I/O happens here and the url is not normalized.
    pub fn forge(settings: &Settings, url: &str, params: RequestParams) -> Self {
        Self {
            url: url.to_string(),
            params: merge_request_params(settings, params),
        }
    }

    /// Cache key for this request.
    ///
    /// Built from the method, url, redirect policy, body and every header
    /// except `User-Agent`, in sorted header order, so equal requests always
    /// map to the same key even when user agents rotate. The body goes in
    /// base64 encoded so binary payloads never collide.
    pub fn cache_key(&self) -> String {
        let mut key = format!("{} {}", self.params.method, self.url);
        if self.params.follow_location {
            key.push_str(" +follow");
        }
        for (name, value) in &self.params.headers {
            if name.eq_ignore_ascii_case("user-agent") {
                continue;
            }
            key.push('\n');
            key.push_str(name);
            key.push_str(": ");
            key.push_str(value);
        }
        if let Some(body) = &self.params.body {
            key.push_str("\n\n");
            STANDARD.encode_string(body, &mut key);
        }
        key
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.params.method, self.url)
    }
}
