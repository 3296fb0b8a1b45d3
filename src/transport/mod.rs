mod client;
pub mod models;

use async_trait::async_trait;

pub use client::HyperTransport;
pub use models::Response;

use crate::{error::TransportError, request::Request};

/// Executes request descriptors.
///
/// The browser never opens connections itself; everything network related
/// (connecting, TLS, proxies, redirects, reading bodies, enforcing
/// `timeout`/`connecttimeout`) lives behind this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &Request) -> Result<Response, TransportError>;
}
