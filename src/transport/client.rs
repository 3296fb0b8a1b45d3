use std::{
    borrow::Cow,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use hashbrown::HashMap;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    header::{HOST, LOCATION, PROXY_AUTHORIZATION},
    StatusCode, Uri,
};
use hyper_tls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use native_tls::TlsConnector;
use tokio::{sync::Semaphore, time};

use super::{Response, Transport};
use crate::{
    error::TransportError,
    negotiators::{proxy_authorization, ConnectNegotiator, HttpNegotiator, Socks5Negotiator},
    proxy::{ProxyAddr, ProxyClient, ProxyScheme},
    request::{Headers, MergedParams, Method, Request},
};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Headers only sent to the host the request was addressed to, never to a
/// redirect target on another host.
const ORIGIN_BOUND_HEADERS: [&str; 3] = ["authorization", "cookie", "host"];

/// Connection settings that need a dedicated pooled client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ClientKey {
    verify_peer: bool,
    verify_host: bool,
    connect_timeout: u64,
}

impl From<&MergedParams> for ClientKey {
    fn from(params: &MergedParams) -> Self {
        Self {
            verify_peer: params.ssl_verifypeer,
            verify_host: params.ssl_verifyhost != 0,
            connect_timeout: params.connecttimeout,
        }
    }
}

/// The default transport, built on hyper.
///
/// Direct requests share pooled keep-alive connections. Proxied requests
/// open one connection each through [`ProxyClient`]. At most `max_threads`
/// requests are in flight at once.
pub struct HyperTransport {
    clients: Mutex<HashMap<ClientKey, HttpsClient>>,
    permits: Semaphore,
    max_idle_per_host: usize,
    max_redirects: usize,
}

impl HyperTransport {
    /// # Arguments
    ///
    /// * `max_threads`: Maximum number of concurrent requests, also used as
    ///   the idle pool size per host.
    pub fn new(max_threads: usize) -> Self {
        let max_threads = max_threads.max(1);
        Self {
            clients: Mutex::new(HashMap::new()),
            permits: Semaphore::new(max_threads),
            max_idle_per_host: max_threads,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Sets how many redirects are followed before giving up.
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    fn client(&self, key: ClientKey) -> Result<HttpsClient, TransportError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        let client = build_client(key, self.max_idle_per_host)?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    async fn send_once(
        &self,
        params: &MergedParams,
        headers: &Headers,
        method: Method,
        body: Option<Bytes>,
        uri: &Uri,
    ) -> Result<hyper::Response<Incoming>, TransportError> {
        let Some(proxy) = &params.proxy else {
            let req = build_request(headers, method, body, uri, uri.to_string(), None)?;
            return Ok(self.client(ClientKey::from(params))?.request(req).await?);
        };

        let proxy: ProxyAddr = proxy.parse().map_err(TransportError::Proxy)?;
        let mut client = ProxyClient::new(proxy);
        client.set_connect_timeout(millis(params.connecttimeout));
        client.set_tls_verification(params.ssl_verifypeer, params.ssl_verifyhost != 0);

        let auth = params.proxyauth.clone();
        let origin_form = uri
            .path_and_query()
            .map_or("/", |path| path.as_str())
            .to_string();

        match (client.proxy.scheme, uri.scheme_str()) {
            (ProxyScheme::Http, Some("https")) => {
                let req = build_request(headers, method, body, uri, origin_form, None)?;
                client
                    .send_request(req, uri, ConnectNegotiator::new(auth))
                    .await
            }
            (ProxyScheme::Http, _) => {
                let authorization = auth.as_deref().map(proxy_authorization);
                let req = build_request(headers, method, body, uri, uri.to_string(), authorization)?;
                client.send_request(req, uri, HttpNegotiator).await
            }
            (ProxyScheme::Socks5, _) => {
                let req = build_request(headers, method, body, uri, origin_form, None)?;
                client
                    .send_request(req, uri, Socks5Negotiator::new(auth))
                    .await
            }
        }
    }

    /// Sends the request, following redirects when asked to.
    async fn exchange(&self, request: &Request) -> Result<Response, TransportError> {
        let params = &request.params;
        let mut uri = parse_uri(&request.url)?;
        let mut method = params.method;
        let mut body = params.body.clone();
        let mut redirects = 0;
        let origin = uri.authority().cloned();
        let mut headers = Cow::Borrowed(&params.headers);

        loop {
            let response = self
                .send_once(params, &headers, method, body.clone(), &uri)
                .await?;
            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            match location {
                Some(location) if params.follow_location && status.is_redirection() => {
                    if redirects >= self.max_redirects {
                        return Err(TransportError::TooManyRedirects(self.max_redirects));
                    }
                    redirects += 1;

                    let next = resolve_location(&uri, &location)?;
                    #[cfg(feature = "log")]
                    log::debug!("{} redirected ({}) to {}", uri, status, next);

                    if status == StatusCode::SEE_OTHER && method == Method::Post {
                        method = Method::Get;
                        body = None;
                    }
                    if next.authority() != origin.as_ref() {
                        headers.to_mut().retain(|name, _| {
                            !ORIGIN_BOUND_HEADERS
                                .iter()
                                .any(|bound| name.eq_ignore_ascii_case(bound))
                        });
                    }
                    uri = next;
                }
                _ => return into_response(&uri, response).await,
            }
        }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransportError::Closed)?;

        let start_time = time::Instant::now();
        let result = match millis(request.params.timeout) {
            Some(limit) => time::timeout(limit, self.exchange(request))
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => self.exchange(request).await,
        };

        #[cfg(feature = "log")]
        match &result {
            Ok(response) => log::debug!(
                "{}: {} in {:?}",
                request,
                response.status,
                start_time.elapsed()
            ),
            Err(e) => log::debug!("{}: {}", request, e),
        }
        #[cfg(not(feature = "log"))]
        let _ = start_time;
        result
    }
}

/// Converts a millisecond setting, 0 meaning no limit.
fn millis(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_millis(value))
}

fn build_client(key: ClientKey, max_idle_per_host: usize) -> Result<HttpsClient, TransportError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(millis(key.connect_timeout));

    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(!key.verify_peer)
        .danger_accept_invalid_hostnames(!key.verify_host)
        .build()?;
    let https = HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls_connector)));

    Ok(Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(max_idle_per_host)
        .build(https))
}

fn parse_uri(url: &str) -> Result<Uri, TransportError> {
    let uri: Uri = url
        .parse()
        .map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(TransportError::InvalidUrl(url.to_string()));
    }
    Ok(uri)
}

/// Resolves a `Location` header against the url that returned it.
fn resolve_location(base: &Uri, location: &str) -> Result<Uri, TransportError> {
    let invalid = || TransportError::InvalidUrl(location.to_string());
    if location.contains("://") {
        return parse_uri(location);
    }

    let scheme = base.scheme_str().unwrap_or("http");
    let authority = base.authority().ok_or_else(invalid)?.as_str();
    let target = if let Some(rest) = location.strip_prefix("//") {
        format!("{scheme}://{rest}")
    } else if location.starts_with('/') {
        format!("{scheme}://{authority}{location}")
    } else {
        let dir = base.path().rsplit_once('/').map_or("", |(dir, _)| dir);
        format!("{scheme}://{authority}{dir}/{location}")
    };
    target.parse().map_err(|_| invalid())
}

/// Builds the hyper request.
///
/// # Arguments
///
/// * `uri`: The absolute target, used for the `Host` header.
/// * `target`: What goes on the request line (absolute or origin form).
/// * `proxy_authorization`: Header value for plain HTTP proxies.
fn build_request(
    headers: &Headers,
    method: Method,
    body: Option<Bytes>,
    uri: &Uri,
    target: String,
    proxy_authorization: Option<String>,
) -> Result<hyper::Request<Full<Bytes>>, TransportError> {
    let authority = uri
        .authority()
        .ok_or_else(|| TransportError::InvalidUrl(uri.to_string()))?;

    let mut builder = hyper::Request::builder()
        .method(method.as_str())
        .uri(target);
    if !headers.keys().any(|name| name.eq_ignore_ascii_case("host")) {
        builder = builder.header(HOST, authority.as_str());
    }
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(credentials) = proxy_authorization {
        builder = builder.header(PROXY_AUTHORIZATION, credentials);
    }
    Ok(builder.body(Full::new(body.unwrap_or_default()))?)
}

async fn into_response(
    uri: &Uri,
    response: hyper::Response<Incoming>,
) -> Result<Response, TransportError> {
    let (parts, incoming) = response.into_parts();
    let body = incoming.collect().await?.to_bytes();
    let headers = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    Ok(Response {
        url: uri.to_string(),
        status: parts.status.as_u16(),
        headers,
        body,
    })
}
