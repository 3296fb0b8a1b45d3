use std::{fmt::Display, str::FromStr};

/// The protocol spoken with the proxy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    /// Plain HTTP proxy: absolute-form requests, `CONNECT` for https targets.
    Http,
    /// SOCKS5 proxy, with optional username/password authentication.
    Socks5,
}

impl Display for ProxyScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Socks5 => write!(f, "socks5"),
        }
    }
}

/// A parsed proxy setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddr {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl ProxyAddr {
    /// Returns the proxy in `<host>:<port>` format.
    pub fn as_text(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for ProxyAddr {
    type Err = String;

    /// Accepts `host:port`, `http://host:port` and `socks5://host:port`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = match value.split_once("://") {
            Some(("http", rest)) => (ProxyScheme::Http, rest),
            Some(("socks5", rest)) | Some(("socks5h", rest)) => (ProxyScheme::Socks5, rest),
            Some((other, _)) => return Err(format!("unsupported proxy scheme {:?}", other)),
            None => (ProxyScheme::Http, value),
        };

        let rest = rest.trim_end_matches('/');
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got {:?}", value))?;
        if host.is_empty() {
            return Err(format!("missing host in {:?}", value));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid port in {:?}", value))?;

        Ok(Self {
            scheme,
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
        })
    }
}

impl Display for ProxyAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Proxy {}://{}:{}>", self.scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_port_is_http() {
        let proxy: ProxyAddr = "127.0.0.1:9050".parse().unwrap();
        assert_eq!(proxy.scheme, ProxyScheme::Http);
        assert_eq!(proxy.host, "127.0.0.1");
        assert_eq!(proxy.port, 9050);
        assert_eq!(proxy.as_text(), "127.0.0.1:9050");
    }

    #[test]
    fn test_schemes() {
        let socks: ProxyAddr = "socks5://proxy.local:1080".parse().unwrap();
        assert_eq!(socks.scheme, ProxyScheme::Socks5);
        assert_eq!(socks.host, "proxy.local");

        let http: ProxyAddr = "http://10.0.0.1:3128/".parse().unwrap();
        assert_eq!(http.scheme, ProxyScheme::Http);
        assert_eq!(http.port, 3128);
    }

    #[test]
    fn test_ipv6_brackets_are_stripped() {
        let proxy: ProxyAddr = "[::1]:8080".parse().unwrap();
        assert_eq!(proxy.host, "::1");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("localhost".parse::<ProxyAddr>().is_err());
        assert!(":8080".parse::<ProxyAddr>().is_err());
        assert!("host:http".parse::<ProxyAddr>().is_err());
        assert!("ftp://host:21".parse::<ProxyAddr>().is_err());
    }
}
