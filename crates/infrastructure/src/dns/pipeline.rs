//! Pipeline glue (C9): wires C1–C8 into the one entry point
//! a transport listener calls per request.
//!
//! Grounded on an established top-level `FilteredResolver`/`DnssecResolver`
//! decorator chain, generalized into two layers: `CorePipeline` performs
//! the fixed "initial" sequence (AD/DO save, request-info assembly,
//! per-profile access, special-domain short-circuit), and delegates to an
//! inner [`Handler`] — [`CacheUpstreamHandler`] — for the Android-metric-
//! aware cache-and-upstream step, mirroring a "stage either produces a
//! final outcome or delegates to inner" shape.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Query;
use hickory_proto::rr::Record;
use tracing::debug;

use ferrous_dns_application::context::RequestContext;
use ferrous_dns_application::ports::{
    ClockPort, CoreMetricsPort, GeoIpPort, Handler, HandlerOutcome, ProfileDbPort,
    SpecialDomainClass, UpstreamHandlerPort,
};
use ferrous_dns_domain::{normalize_host, DomainError, ProfileFlags, RequestInfo, WireMessage};

use crate::dns::access::{GlobalAccessFilter, ProfileAccessManager};
use crate::dns::android_metric::{self, AndroidMetricMatch};
use crate::dns::device::{TransportMetadata, TransportProtocol};
use crate::dns::ecs_cache::{self, EcsAwareCache};
use crate::dns::request_info::{self, Assembled, AssemblerConfig};
use crate::dns::special::{self, DdrTemplates, SpecialOutcome};

/// Static knobs the pipeline glue itself consults, independent of any one
/// request.
pub struct PipelineConfig {
    pub device_wildcard_domains: Vec<String>,
    pub linked_ip_enabled: bool,
    pub binds_to_interfaces: bool,
    pub server_addresses: Vec<SocketAddr>,
    pub ddr: DdrTemplates,
    pub ddr_enabled: bool,
    pub default_flags: ProfileFlags,
}

/// The orchestrator a transport listener calls once per decoded request.
///
/// Not itself a [`Handler`]: a listener must supply transport metadata
/// (protocol, SNI, DoH path/userinfo, EDNS0 CPE-ID) that `Handler`'s
/// narrower three-argument contract has no room for, so this is the
/// crate's top-level entry point rather than a composable stage.
pub struct CorePipeline {
    global: Arc<GlobalAccessFilter>,
    profile_access: ProfileAccessManager,
    inner: CacheUpstreamHandler,
    profile_db: Arc<dyn ProfileDbPort>,
    geoip: Arc<dyn GeoIpPort>,
    metrics: Arc<dyn CoreMetricsPort>,
    config: PipelineConfig,
}

impl CorePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        global: Arc<GlobalAccessFilter>,
        profile_access: ProfileAccessManager,
        cache: EcsAwareCache,
        profile_db: Arc<dyn ProfileDbPort>,
        geoip: Arc<dyn GeoIpPort>,
        upstream: Arc<dyn UpstreamHandlerPort>,
        metrics: Arc<dyn CoreMetricsPort>,
        clock: Arc<dyn ClockPort>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            global,
            profile_access,
            inner: CacheUpstreamHandler {
                cache,
                geoip: geoip.clone(),
                upstream,
                metrics: metrics.clone(),
                clock,
            },
            profile_db,
            geoip,
            metrics,
            config,
        }
    }

    /// Handle one decoded request. `info` must already carry `remote_ip`
    /// and `local_addr` (the pooled object-reset convention).
    /// Returns `None` when the request must be silently dropped — the
    /// caller must not write anything to the wire in that case.
    pub async fn handle(
        &self,
        ctx: &RequestContext,
        info: &mut RequestInfo,
        protocol: TransportProtocol,
        transport: &TransportMetadata,
        request: &WireMessage,
    ) -> Option<WireMessage> {
        // Messages with more than one question are not cacheable and are
        // passed through unchanged — the core's per-question machinery
        // (ECS, device, special-domain, AD gating) has no well-defined
        // meaning for them.
        if !request.has_single_question() {
            return self.forward_raw(ctx, request).await;
        }

        // The global, static access filter runs outside the per-request
        // "initial" sequence, before rate-limiting or anything stateful.
        // Treated identically to the per-profile access block it composes
        // with (silent drop) for self-consistency.
        let question = request.single_question().ok()?;
        let pre_host = normalize_host(&question.name().to_utf8());
        if self.global.is_blocked_ip(info.remote_ip)
            || self.global.is_blocked_host(&pre_host, question.query_type())
        {
            self.metrics.inc_access_blocked();
            return None;
        }

        // Step 1: save reqAD/reqDO, force req.AD=true so the cache/
        // upstream layer validates and caches the authoritative AD bit;
        // the client-visible gate is re-applied in step 6 using the saved
        // originals, not this forced value.
        let req_ad = request.ad();
        let req_do = request.dnssec_ok();
        let mut forced = request.clone();
        forced.set_ad(true);

        // Step 2: build request-info.
        let assembler_config = AssemblerConfig {
            device_wildcard_domains: &self.config.device_wildcard_domains,
            linked_ip_enabled: self.config.linked_ip_enabled,
            binds_to_interfaces: self.config.binds_to_interfaces,
            server_addresses: &self.config.server_addresses,
        };
        let assembled = match request_info::assemble(
            info,
            &forced,
            protocol,
            transport,
            self.profile_db.as_ref(),
            self.geoip.as_ref(),
            &assembler_config,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(DomainError::BadEcs(reason)) => {
                debug!("malformed ECS option, responding FORMERR: {reason}");
                return Some(special::formerr_response(&forced));
            }
            Err(e) => {
                if e.reportable() {
                    debug!("request-info assembly failed: {e}");
                }
                return None;
            }
        };
        match assembled {
            Assembled::Drop => {
                self.metrics.inc_unknown_dedicated_drop();
                return None;
            }
            Assembled::Ready => {}
        }

        // Step 3: per-profile access (C3/C4.4 via ProfileAccessManager).
        if let Some(profile) = info.profile.clone() {
            let blocked = self.profile_access.is_profile_blocked(
                &profile,
                info.remote_ip,
                &info.host,
                info.qtype,
                info.location,
            );
            match blocked {
                Ok(true) => {
                    self.metrics.inc_access_blocked();
                    return None;
                }
                Ok(false) => {}
                Err(_) => return None,
            }
        }

        // Step 4: special-domain handler.
        let ddr_enabled = info
            .profile
            .as_ref()
            .map(|p| p.flags.ddr_enabled)
            .unwrap_or(self.config.ddr_enabled);
        let special_outcome = special::handle(
            info,
            &forced,
            protocol,
            &self.config.ddr,
            ddr_enabled,
            self.config.default_flags,
            self.metrics.as_ref(),
        );
        match special_outcome {
            Ok(SpecialOutcome::Handled(response)) => return Some(response),
            Ok(SpecialOutcome::NotSpecial) => {}
            Err(_) => return None,
        }

        // Step 5: invoke the inner pipeline (Android-metric + C7).
        let outcome = self.inner.handle(ctx, info, &forced).await.ok()?;
        let mut response = match outcome {
            HandlerOutcome::Respond(response) => response,
            HandlerOutcome::Drop => return None,
        };

        // Step 6: resp.AD ← resp.AD AND (reqAD OR reqDO).
        response.set_ad(response.ad() && (req_ad || req_do));

        // Step 7 (write) is the caller's responsibility.
        Some(response)
    }

    async fn forward_raw(&self, ctx: &RequestContext, request: &WireMessage) -> Option<WireMessage> {
        self.inner.upstream.serve(ctx, request).await.ok()
    }
}

/// Inner pipeline step: Android-metric hostname
/// canonicalization wrapping the ECS-aware cache/upstream exchange.
struct CacheUpstreamHandler {
    cache: EcsAwareCache,
    geoip: Arc<dyn GeoIpPort>,
    upstream: Arc<dyn UpstreamHandlerPort>,
    metrics: Arc<dyn CoreMetricsPort>,
    clock: Arc<dyn ClockPort>,
}

#[async_trait]
impl Handler for CacheUpstreamHandler {
    async fn handle(
        &self,
        ctx: &RequestContext,
        info: &mut RequestInfo,
        request: &WireMessage,
    ) -> Result<HandlerOutcome, DomainError> {
        let android = android_metric::detect(&info.host);

        let effective_info = match &android {
            Some(m) => {
                let mut canon = info.clone();
                canon.host = m.canonical_host.clone();
                canon
            }
            None => info.clone(),
        };
        let effective_request = match &android {
            Some(m) => canonicalize_request(request, m),
            None => request.clone(),
        };

        let (cache_req, family) =
            ecs_cache::build_cache_request(&effective_info, &effective_request, self.geoip.as_ref());
        let now = self.clock.now();

        let response = if let Some(hit) = self.cache.lookup(&cache_req, now, self.metrics.as_ref()) {
            self.cache
                .serve_hit(&hit, &effective_request, cache_req.subnet, now)
        } else {
            self.cache
                .resolve_miss(
                    ctx,
                    &effective_info,
                    &cache_req,
                    family,
                    &effective_request,
                    self.upstream.as_ref(),
                    self.metrics.as_ref(),
                    now,
                )
                .await?
        };

        let response = match &android {
            Some(m) => {
                self.metrics.inc_special_domain(SpecialDomainClass::AndroidMetric);
                restore_original_names(response, m)
            }
            None => response,
        };

        Ok(HandlerOutcome::Respond(response))
    }
}

/// Rewrite `request`'s single question to the canonical Android-metric
/// name before it is used as the cache key or sent upstream.
fn canonicalize_request(request: &WireMessage, m: &AndroidMetricMatch) -> WireMessage {
    let Some(canonical) = android_metric::canonical_name(m) else {
        return request.clone();
    };
    let mut message = request.message.clone();
    let queries = message.take_queries();
    let rewritten: Vec<Query> = queries
        .into_iter()
        .map(|mut q| {
            q.set_name(canonical.clone());
            q
        })
        .collect();
    for q in rewritten {
        message.add_query(q);
    }
    WireMessage::new(message)
}

/// Rewrite every owner name matching the canonical Android-metric hostname
/// back to the client's originally-queried hostname.
fn restore_original_names(mut wire: WireMessage, m: &AndroidMetricMatch) -> WireMessage {
    let queries = wire.message.take_queries();
    let queries: Vec<Query> = queries
        .into_iter()
        .map(|mut q| {
            if let Some(restored) = android_metric::rewrite_owner_name(q.name(), m) {
                q.set_name(restored);
            }
            q
        })
        .collect();
    for q in queries {
        wire.message.add_query(q);
    }

    let answers = wire.message.take_answers();
    wire.message
        .add_answers(answers.into_iter().map(|r| rewrite_record_owner(r, m)));
    let authority = wire.message.take_name_servers();
    wire.message
        .add_name_servers(authority.into_iter().map(|r| rewrite_record_owner(r, m)));
    let additional = wire.message.take_additionals();
    wire.message
        .add_additionals(additional.into_iter().map(|r| rewrite_record_owner(r, m)));

    wire
}

fn rewrite_record_owner(record: Record, m: &AndroidMetricMatch) -> Record {
    match (android_metric::rewrite_owner_name(record.name(), m), record.data()) {
        (Some(name), Some(rdata)) => Record::from_rdata(name, record.ttl(), rdata.clone()),
        _ => record,
    }
}
