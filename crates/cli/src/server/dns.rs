//! UDP listener loop. Socket construction (buffer tuning, `SO_REUSEADDR`/
//! `SO_REUSEPORT`) is grounded verbatim on an established own
//! `server::dns::start_dns_server` — only the registration target changes,
//! from `hickory_server`'s `ServerFuture`/`RequestHandler` (never actually
//! implemented anywhere in this codebase's history) to a plain read/
//! dispatch/write loop calling [`CorePipeline::handle`] directly, per
//! 's scoping of the transport/listener layer as an external
//! collaborator the core itself does not own.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ferrous_dns_application::context::RequestContext;
use ferrous_dns_domain::RequestInfo;
use ferrous_dns_infrastructure::dns::device::{TransportMetadata, TransportProtocol};
use ferrous_dns_infrastructure::dns::pipeline::CorePipeline;
use ferrous_dns_infrastructure::object_pool::{shared_pool, Pool};
use hickory_proto::op::Message;
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::Instant as TokioInstant;
use tracing::{debug, info, warn};

/// Maximum size of an incoming UDP datagram this server accepts.
const MAX_UDP_DATAGRAM: usize = 4096;

/// EDNS0 CPE-ID option code the device-identity extractor reads on plain
/// DNS transports.
const EDNS_OPTION_CPE_ID: u16 = 65074;

/// Per-request deadline budget: how long the pipeline may spend on a cache
/// miss (profile lookup, GeoIP, upstream exchange) before the request is
/// abandoned.
const REQUEST_DEADLINE: Duration = Duration::from_secs(5);

pub async fn start_dns_server(bind_addr: SocketAddr, pipeline: Arc<CorePipeline>) -> anyhow::Result<()> {
    info!(bind_address = %bind_addr, "starting DNS server");

    let domain = if bind_addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    // Default UDP buffers are ~256KB; DNS under load wants 4-8MB.
    socket.set_recv_buffer_size(8 * 1024 * 1024)?;
    socket.set_send_buffer_size(4 * 1024 * 1024)?;

    socket.bind(&bind_addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    let socket = Arc::new(UdpSocket::from_std(std_socket)?);

    info!("DNS server ready with tuned UDP buffers");

    let info_pool: Arc<Pool<RequestInfo>> = shared_pool(4096);
    let mut buf = vec![0u8; MAX_UDP_DATAGRAM];
    let mut next_id: u64 = 0;

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                warn!("UDP recv error: {e}");
                continue;
            }
        };

        let request_id = next_id;
        next_id = next_id.wrapping_add(1);

        let socket = socket.clone();
        let pipeline = pipeline.clone();
        let info_pool = info_pool.clone();
        let datagram = buf[..len].to_vec();

        tokio::spawn(async move {
            handle_datagram(socket, pipeline, info_pool, datagram, from, request_id).await;
        });
    }
}

async fn handle_datagram(
    socket: Arc<UdpSocket>,
    pipeline: Arc<CorePipeline>,
    info_pool: Arc<Pool<RequestInfo>>,
    datagram: Vec<u8>,
    from: SocketAddr,
    request_id: u64,
) {
    let message = match Message::from_vec(&datagram) {
        Ok(m) => m,
        Err(e) => {
            debug!(%from, "dropping malformed datagram: {e}");
            return;
        }
    };
    let local_addr = socket.local_addr().unwrap_or(from);

    let transport = TransportMetadata {
        edns_cpe_id: extract_cpe_id(&message),
        ..Default::default()
    };

    let mut info = info_pool.get(|| RequestInfo::new(from.ip(), local_addr, request_id));
    info.reset(from.ip(), local_addr, request_id);

    let ctx = RequestContext::new(request_id, TokioInstant::now() + REQUEST_DEADLINE);
    let request = ferrous_dns_domain::WireMessage::new(message);

    let response = pipeline
        .handle(&ctx, &mut info, TransportProtocol::Udp, &transport, &request)
        .await;

    info_pool.put(info);

    let Some(response) = response else {
        return;
    };

    let mut out = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut out);
    if let Err(e) = response.message.emit(&mut encoder) {
        warn!("failed to serialize response: {e}");
        return;
    }

    if let Err(e) = socket.send_to(&out, from).await {
        warn!(%from, "failed to send response: {e}");
    }
}

fn extract_cpe_id(message: &Message) -> Option<Vec<u8>> {
    let edns = message.extensions().as_ref()?;
    match edns.options().get(EdnsCode::Unknown(EDNS_OPTION_CPE_ID)) {
        Some(EdnsOption::Unknown(_, bytes)) => Some(bytes.clone()),
        _ => None,
    }
}
