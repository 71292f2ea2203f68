//! Middleware composition.
//!
//! Grounded on an established resolver-decorator chain
//! (`FilteredResolver`/`DnssecResolver`, each holding `inner: Arc<dyn
//! DnsResolver>` and wrapping one async trait method). Here the wrapped
//! trait is `Handler`, and a stage either produces a final outcome or
//! delegates to `inner`.

use crate::context::RequestContext;
use async_trait::async_trait;
use ferrous_dns_domain::{DomainError, RequestInfo, WireMessage};

/// What a pipeline stage decided to do with a request.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Write this response to the client.
    Respond(WireMessage),
    /// Emit no response at all (e.g. `UnknownDedicated`: silent drop).
    Drop,
}

/// One pipeline stage. `info` is mutable so stages can enrich it
/// (GeoIP location, profile/device, ECS) before delegating further in.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        ctx: &RequestContext,
        info: &mut RequestInfo,
        request: &WireMessage,
    ) -> Result<HandlerOutcome, DomainError>;
}

