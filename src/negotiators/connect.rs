use async_trait::async_trait;
use hyper::Uri;
use tokio::{io::AsyncWriteExt, net::TcpStream};

use super::{proxy_authorization, read_response_head, target_port, NegotiatorTrait};
use crate::{error::TransportError, proxy::models::ProxyAddr};

/// Opens a tunnel through an HTTP proxy with `CONNECT`.
pub struct ConnectNegotiator {
    auth: Option<String>,
}

impl ConnectNegotiator {
    /// # Arguments
    ///
    /// * `auth`: Optional `user:pass` sent as `Proxy-Authorization`.
    pub fn new(auth: Option<String>) -> Self {
        Self { auth }
    }

    /// Generates the CONNECT request sent to the proxy server.
    fn generate_connect_request(&self, host: &str, port: u16) -> String {
        let mut request = format!(
            "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\nProxy-Connection: keep-alive\r\n"
        );
        if let Some(auth) = &self.auth {
            request.push_str("Proxy-Authorization: ");
            request.push_str(&proxy_authorization(auth));
            request.push_str("\r\n");
        }
        request.push_str("\r\n");
        request
    }
}

#[async_trait]
impl NegotiatorTrait for ConnectNegotiator {
    async fn negotiate(
        &self,
        stream: &mut TcpStream,
        proxy: &ProxyAddr,
        uri: &Uri,
    ) -> Result<(), TransportError> {
        let host = uri
            .host()
            .ok_or_else(|| TransportError::InvalidUrl(uri.to_string()))?;
        let connect_request = self.generate_connect_request(host, target_port(uri));

        self.log_trace(proxy, format!("Sending a connection request to {}", host));
        stream.write_all(connect_request.as_bytes()).await?;

        let head = read_response_head(stream).await?;
        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut response = httparse::Response::new(&mut headers);
        response
            .parse(&head)
            .map_err(|e| TransportError::Proxy(e.to_string()))?;

        let code = response.code.unwrap_or_default();
        if code != 200 {
            return Err(TransportError::Proxy(format!(
                "Got response {}: {}. Expecting 200 OK",
                code,
                response.reason.unwrap_or("Unknown reason")
            )));
        }
        self.log_trace(proxy, "Connection successfully established");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    use super::*;
    use crate::{negotiators::read_response_head, proxy::models::ProxyScheme};

    async fn fake_proxy(reply: &'static [u8]) -> (ProxyAddr, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let head = read_response_head(&mut socket).await.unwrap();
            socket.write_all(reply).await.unwrap();
            String::from_utf8(head).unwrap()
        });
        let proxy = ProxyAddr {
            scheme: ProxyScheme::Http,
            host: "127.0.0.1".into(),
            port,
        };
        (proxy, handle)
    }

    #[test]
    fn test_connect_request_with_auth() {
        let negotiator = ConnectNegotiator::new(Some("user:pass".into()));
        let request = negotiator.generate_connect_request("example.com", 443);
        assert!(request.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(request.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_tunnel_established() {
        let (proxy, handle) =
            fake_proxy(b"HTTP/1.1 200 Connection established\r\n\r\n").await;
        let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port)).await.unwrap();
        let uri: Uri = "https://example.com/path".parse().unwrap();

        ConnectNegotiator::new(None)
            .negotiate(&mut stream, &proxy, &uri)
            .await
            .unwrap();

        let sent = handle.await.unwrap();
        assert!(sent.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(!sent.contains("Proxy-Authorization"));
    }

    #[tokio::test]
    async fn test_tunnel_refused() {
        let (proxy, handle) =
            fake_proxy(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;
        let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port)).await.unwrap();
        let uri: Uri = "https://example.com/".parse().unwrap();

        let result = ConnectNegotiator::new(None)
            .negotiate(&mut stream, &proxy, &uri)
            .await;
        assert!(matches!(result, Err(TransportError::Proxy(msg)) if msg.contains("407")));

        handle.await.unwrap();
    }
}
