pub mod client;
pub mod models;

pub use client::ProxyClient;
pub use models::{ProxyAddr, ProxyScheme};
