mod connect;
mod http;
mod socks5;

use std::fmt::Display;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
pub use connect::ConnectNegotiator;
pub use http::HttpNegotiator;
use hyper::Uri;
pub use socks5::Socks5Negotiator;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    net::TcpStream,
};

use crate::{error::TransportError, proxy::models::ProxyAddr};

/// Largest proxy reply head accepted while negotiating.
const MAX_HEAD_SIZE: usize = 8192;

/// Prepares an open proxy connection before the HTTP request is sent.
#[async_trait]
pub trait NegotiatorTrait {
    #[allow(unused_variables)]
    async fn negotiate(
        &self,
        stream: &mut TcpStream,
        proxy: &ProxyAddr,
        uri: &Uri,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    /// Whether the request line must carry the absolute url, as plain HTTP
    /// proxies expect, instead of the origin form.
    fn absolute_form(&self) -> bool {
        false
    }

    /// Logs a trace message.
    ///
    /// # Arguments
    ///
    /// * `msg`: The message to log.
    #[allow(unused_variables)]
    fn log_trace<S>(&self, proxy: &ProxyAddr, msg: S)
    where
        S: Display,
    {
        #[cfg(feature = "log")]
        log::trace!("{}: {}", proxy.as_text(), msg);
    }
}

/// Value of a `Proxy-Authorization` header for `user:pass` credentials.
pub fn proxy_authorization(credentials: &str) -> String {
    format!("Basic {}", STANDARD.encode(credentials))
}

/// Default port of `uri` when it does not name one.
pub(crate) fn target_port(uri: &Uri) -> u16 {
    uri.port_u16()
        .unwrap_or(if uri.scheme_str() == Some("https") { 443 } else { 80 })
}

/// Reads an HTTP response head, up to and including the blank line.
///
/// Reads byte by byte so nothing past the head is consumed from the stream.
pub(crate) async fn read_response_head<R>(reader: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(128);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_HEAD_SIZE {
            return Err(TransportError::Proxy(format!(
                "reply head larger than {} bytes",
                MAX_HEAD_SIZE
            )));
        }
        head.push(reader.read_u8().await?);
    }
    Ok(head)
}
