//! Port for the pluggable upstream DNS resolver. The core
//! never recurses itself — it forwards a cache miss here and caches what
//! comes back.

use crate::context::RequestContext;
use async_trait::async_trait;
use ferrous_dns_domain::{DomainError, WireMessage};

#[async_trait]
pub trait UpstreamHandlerPort: Send + Sync {
    /// Forward `request` upstream and return the raw response. The caller
    /// (C7) is responsible for hop-to-hop filtering, TTL bookkeeping, and
    /// caching — this port only performs the exchange.
    async fn serve(
        &self,
        ctx: &RequestContext,
        request: &WireMessage,
    ) -> Result<WireMessage, DomainError>;
}

