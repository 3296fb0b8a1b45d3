use async_trait::async_trait;
use hyper::Uri;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use super::{target_port, NegotiatorTrait};
use crate::{error::TransportError, proxy::models::ProxyAddr};

const VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;
const USER_PASS: u8 = 0x02;
const NO_ACCEPTABLE: u8 = 0xff;

/// A negotiator for SOCKS5 proxies.
///
/// The target is sent as a domain name, so name resolution happens on the
/// proxy side.
pub struct Socks5Negotiator {
    auth: Option<String>,
}

impl Socks5Negotiator {
    /// # Arguments
    ///
    /// * `auth`: Optional `user:pass` for username/password authentication.
    pub fn new(auth: Option<String>) -> Self {
        Self { auth }
    }

    /// Builds the method selection greeting.
    fn greeting(&self) -> Vec<u8> {
        if self.auth.is_some() {
            vec![VERSION, 2, NO_AUTH, USER_PASS]
        } else {
            vec![VERSION, 1, NO_AUTH]
        }
    }

    /// Builds the username/password sub-negotiation packet.
    fn credentials_packet(&self) -> Result<Vec<u8>, TransportError> {
        let auth = self.auth.as_deref().unwrap_or_default();
        let (user, pass) = auth.split_once(':').unwrap_or((auth, ""));
        if user.len() > 255 || pass.len() > 255 {
            return Err(TransportError::Proxy(
                "credentials longer than 255 bytes".into(),
            ));
        }

        let mut packet = Vec::with_capacity(3 + user.len() + pass.len());
        packet.push(0x01);
        packet.push(user.len() as u8);
        packet.extend_from_slice(user.as_bytes());
        packet.push(pass.len() as u8);
        packet.extend_from_slice(pass.as_bytes());
        Ok(packet)
    }

    /// Builds the CONNECT command for `host:port`.
    fn connect_packet(host: &str, port: u16) -> Result<Vec<u8>, TransportError> {
        if host.len() > 255 {
            return Err(TransportError::Proxy(format!(
                "host name too long: {}",
                host
            )));
        }
        let mut packet = Vec::with_capacity(7 + host.len());
        packet.extend_from_slice(&[VERSION, 0x01, 0x00, 0x03, host.len() as u8]);
        packet.extend_from_slice(host.as_bytes());
        packet.extend_from_slice(&port.to_be_bytes());
        Ok(packet)
    }
}

/// Describes a SOCKS5 reply code.
fn reply_error(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown error",
    }
}

#[async_trait]
impl NegotiatorTrait for Socks5Negotiator {
    async fn negotiate(
        &self,
        stream: &mut TcpStream,
        proxy: &ProxyAddr,
        uri: &Uri,
    ) -> Result<(), TransportError> {
        let host = uri
            .host()
            .ok_or_else(|| TransportError::InvalidUrl(uri.to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']');

        stream.write_all(&self.greeting()).await?;
        let mut choice = [0u8; 2];
        stream.read_exact(&mut choice).await?;
        if choice[0] != VERSION {
            return Err(TransportError::Proxy("invalid response version".into()));
        }

        match choice[1] {
            NO_AUTH => {}
            USER_PASS if self.auth.is_some() => {
                self.log_trace(proxy, "Authenticating");
                stream.write_all(&self.credentials_packet()?).await?;
                let mut status = [0u8; 2];
                stream.read_exact(&mut status).await?;
                if status[1] != 0x00 {
                    return Err(TransportError::Proxy("authentication rejected".into()));
                }
            }
            NO_ACCEPTABLE => {
                return Err(TransportError::Proxy(
                    "no acceptable authentication method".into(),
                ))
            }
            other => {
                return Err(TransportError::Proxy(format!(
                    "unexpected authentication method {:#04x}",
                    other
                )))
            }
        }

        self.log_trace(proxy, format!("Requesting a connection to {}", host));
        stream
            .write_all(&Self::connect_packet(host, target_port(uri))?)
            .await?;

        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).await?;
        if reply[0] != VERSION {
            return Err(TransportError::Proxy("invalid response version".into()));
        }
        if reply[1] != 0x00 {
            return Err(TransportError::Proxy(reply_error(reply[1]).into()));
        }

        // Drain the bound address; its length depends on the address type.
        let remaining = match reply[3] {
            0x01 => 4 + 2,
            0x04 => 16 + 2,
            0x03 => stream.read_u8().await? as usize + 2,
            other => {
                return Err(TransportError::Proxy(format!(
                    "invalid address type {:#04x}",
                    other
                )))
            }
        };
        let mut bound = vec![0u8; remaining];
        stream.read_exact(&mut bound).await?;

        self.log_trace(proxy, "Connection successfully established");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::proxy::models::ProxyScheme;

    #[test]
    fn test_connect_packet() {
        let packet = Socks5Negotiator::connect_packet("ab.c", 443).unwrap();
        assert_eq!(
            packet,
            vec![5, 1, 0, 3, 4, b'a', b'b', b'.', b'c', 0x01, 0xbb]
        );
    }

    #[test]
    fn test_credentials_packet() {
        let negotiator = Socks5Negotiator::new(Some("me:pw".into()));
        assert_eq!(negotiator.greeting(), vec![5, 2, 0, 2]);
        assert_eq!(
            negotiator.credentials_packet().unwrap(),
            vec![1, 2, b'm', b'e', 2, b'p', b'w']
        );
    }

    #[tokio::test]
    async fn test_negotiate_with_auth() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut greeting = [0u8; 4];
            socket.read_exact(&mut greeting).await.unwrap();
            socket.write_all(&[5, USER_PASS]).await.unwrap();

            let mut credentials = [0u8; 7];
            socket.read_exact(&mut credentials).await.unwrap();
            socket.write_all(&[1, 0]).await.unwrap();

            let mut request = [0u8; 5 + 11 + 2];
            socket.read_exact(&mut request).await.unwrap();
            socket
                .write_all(&[5, 0, 0, 1, 127, 0, 0, 1, 0x1f, 0x90])
                .await
                .unwrap();
            request.to_vec()
        });

        let proxy = ProxyAddr {
            scheme: ProxyScheme::Socks5,
            host: "127.0.0.1".into(),
            port,
        };
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let uri: Uri = "http://example.com/".parse().unwrap();
        Socks5Negotiator::new(Some("me:pw".into()))
            .negotiate(&mut stream, &proxy, &uri)
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert_eq!(&request[5..16], b"example.com");
        assert_eq!(&request[16..], &80u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_negotiate_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            socket.read_exact(&mut greeting).await.unwrap();
            socket.write_all(&[5, NO_ACCEPTABLE]).await.unwrap();
        });

        let proxy = ProxyAddr {
            scheme: ProxyScheme::Socks5,
            host: "127.0.0.1".into(),
            port,
        };
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let uri: Uri = "http://example.com/".parse().unwrap();
        let result = Socks5Negotiator::new(None)
            .negotiate(&mut stream, &proxy, &uri)
            .await;
        assert!(matches!(result, Err(TransportError::Proxy(_))));
    }
}
