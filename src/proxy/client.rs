use std::{
    error::Error,
    fmt::{Debug, Display},
    time::Duration,
};

use hyper::{
    body::{Body, Incoming},
    client::conn::http1::handshake,
    Request, Response, Uri,
};
use hyper_util::rt::TokioIo;
use native_tls::TlsConnector;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::{self, timeout},
};

use crate::{error::TransportError, negotiators::NegotiatorTrait, proxy::models::ProxyAddr};

/// Sends single requests through a proxy server.
///
/// Each request opens its own connection: connect, negotiate, then speak
/// HTTP/1.1 over the (optionally TLS wrapped) stream.
#[derive(Debug)]
pub struct ProxyClient {
    pub proxy: ProxyAddr,
    connect_timeout: Option<Duration>,
    accept_invalid_certs: bool,
    accept_invalid_hostnames: bool,
}

impl ProxyClient {
    /// Creates a new instance of `ProxyClient`.
    ///
    /// # Arguments
    ///
    /// * `proxy`: The proxy to connect through.
    pub fn new(proxy: ProxyAddr) -> Self {
        Self {
            proxy,
            connect_timeout: None,
            accept_invalid_certs: false,
            accept_invalid_hostnames: false,
        }
    }

    pub fn set_connect_timeout(&mut self, connect_timeout: Option<Duration>) {
        self.connect_timeout = connect_timeout;
    }

    /// Mirrors the `ssl_verifypeer` / `ssl_verifyhost` request flags.
    pub fn set_tls_verification(&mut self, verify_peer: bool, verify_host: bool) {
        self.accept_invalid_certs = !verify_peer;
        self.accept_invalid_hostnames = !verify_host;
    }

    /// Establishes a TCP connection to the proxy server.
    ///
    /// # Returns
    ///
    /// A `TcpStream` if the connection is successful, or an error if it fails.
    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let start_time = time::Instant::now();
        self.log_trace("Starting TCP connection");

        let connecting = TcpStream::connect((self.proxy.host.as_str(), self.proxy.port));
        let tcp_stream = match self.connect_timeout {
            Some(limit) => timeout(limit, connecting)
                .await
                .map_err(|_| TransportError::Timeout(limit))??,
            None => connecting.await?,
        };

        self.log_trace(format!("Connected in {:?}", start_time.elapsed()));
        Ok(tcp_stream)
    }

    /// Sends a request over TLS through an established tunnel.
    ///
    /// # Arguments
    ///
    /// * `req`: The HTTP request to send.
    /// * `stream`: The negotiated stream to the target.
    /// * `domain`: Host name presented for TLS.
    pub async fn send_with_tls<B>(
        &self,
        req: Request<B>,
        stream: TcpStream,
        domain: &str,
    ) -> Result<Response<Incoming>, TransportError>
    where
        B: Body + 'static + Debug + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        self.log_trace("Starting TLS connection");
        let start_time = time::Instant::now();

        let tls_connector = TlsConnector::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .danger_accept_invalid_hostnames(self.accept_invalid_hostnames)
            .build()?;
        let connector = tokio_native_tls::TlsConnector::from(tls_connector);
        let tls_stream = connector.connect(domain, stream).await?;
        self.log_trace(format!(
            "TLS connection established in {:?}",
            start_time.elapsed()
        ));

        self.send_over(req, tls_stream).await
    }

    /// Sends a request without TLS through the proxy.
    ///
    /// # Arguments
    ///
    /// * `req`: The HTTP request to send.
    /// * `stream`: The TCP stream to use for the connection.
    pub async fn send_without_tls<B>(
        &self,
        req: Request<B>,
        stream: TcpStream,
    ) -> Result<Response<Incoming>, TransportError>
    where
        B: Body + 'static + Debug + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        self.send_over(req, stream).await
    }

    async fn send_over<B, S>(
        &self,
        req: Request<B>,
        stream: S,
    ) -> Result<Response<Incoming>, TransportError>
    where
        B: Body + 'static + Debug + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);
        let (mut sender, conn) = handshake(io).await?;

        let addr = self.proxy.as_text();
        let handler = tokio::task::spawn(async move {
            if let Err(err) = conn.await {
                #[cfg(feature = "log")]
                if log::max_level().eq(&log::LevelFilter::Trace) {
                    log::error!("{}: Connection error: {}", addr, err);
                }
                #[cfg(not(feature = "log"))]
                let _ = (addr, err);
            }
        });

        self.log_trace(format!("Sending request: {} {}", req.method(), req.uri()));
        let start_time = time::Instant::now();
        let result = sender.send_request(req).await;
        self.log_trace(format!("Response head in {:?}", start_time.elapsed()));

        // The connection task must keep running while the body is read, the
        // stream is closed once the response is dropped.
        if result.is_err() {
            handler.abort();
        }
        Ok(result?)
    }

    /// Sends a request through the proxy.
    ///
    /// # Type Parameters
    ///
    /// * `B`: The type of the request body.
    /// * `N`: The negotiator run on the fresh connection before the request.
    ///
    /// # Arguments
    ///
    /// * `req`: The HTTP request to send, its uri already in the form the
    ///   negotiator expects.
    /// * `target`: The absolute uri the request is meant for.
    /// * `negotiator`: Prepares the proxy connection for `target`.
    pub async fn send_request<B, N>(
        &self,
        req: Request<B>,
        target: &Uri,
        negotiator: N,
    ) -> Result<Response<Incoming>, TransportError>
    where
        B: Body + 'static + Debug + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
        N: NegotiatorTrait + Sync,
    {
        let mut stream = self.connect().await?;
        if let Err(e) = negotiator
            .negotiate(&mut stream, &self.proxy, target)
            .await
        {
            self.log_error(&e);
            return Err(e);
        }

        let tunnelled_tls = !negotiator.absolute_form() && target.scheme_str() == Some("https");
        match target.host() {
            Some(domain) if tunnelled_tls => {
                let domain = domain.trim_start_matches('[').trim_end_matches(']');
                self.send_with_tls(req, stream, domain).await
            }
            _ => self.send_without_tls(req, stream).await,
        }
    }

    /// Logs a trace message.
    ///
    /// # Arguments
    ///
    /// * `msg`: The message to log.
    #[allow(unused_variables)]
    pub fn log_trace<S>(&self, msg: S)
    where
        S: Display,
    {
        #[cfg(feature = "log")]
        log::trace!("{}: {}", self.proxy.as_text(), msg);
    }

    /// Logs an error message.
    ///
    /// # Arguments
    ///
    /// * `msg`: The message to log as an error.
    #[allow(unused_variables)]
    pub fn log_error<S>(&self, msg: S)
    where
        S: Display,
    {
        #[cfg(feature = "log")]
        if log::max_level().eq(&log::LevelFilter::Trace) {
            log::error!("{}: {}", self.proxy.as_text(), msg);
        }
    }
}
