use async_trait::async_trait;

use super::NegotiatorTrait;

/// Plain HTTP forwarding: nothing to negotiate, the proxy reads the absolute
/// url from the request line.
pub struct HttpNegotiator;

#[async_trait]
impl NegotiatorTrait for HttpNegotiator {
    fn absolute_form(&self) -> bool {
        true
    }
}
