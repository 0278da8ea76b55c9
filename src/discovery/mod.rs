//! Locating the console on the local network without user configuration.
//!
//! Attempts, in order: the on-disk cache validated by a fast TCP probe, a
//! WS-Discovery multicast probe plus DPWS metadata fetch, and finally a
//! structured "ask the user" failure carrying whatever partial information
//! was gathered. Every network wait is bounded, and the whole run stays
//! inside one total budget.

pub mod cache;
pub mod wsd;
pub mod xml;

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DiscoveryError, Error, Result};
use crate::transport::SmbTransport;

pub use cache::CacheRecord;
pub use wsd::ProbeMatch;

/// TCP probe used to validate a cached address.
pub const CACHE_PROBE_TIMEOUT: Duration = Duration::from_millis(200);
/// How long ProbeMatch responses are collected.
pub const MULTICAST_WINDOW: Duration = Duration::from_millis(700);
/// Per-endpoint budget for the metadata fetch.
pub const METADATA_TIMEOUT: Duration = Duration::from_millis(500);
/// Default bound on a whole discover() run.
pub const TOTAL_BUDGET: Duration = Duration::from_millis(1500);

/// Knobs for [`discover`].
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    /// Where the advisory cache lives; None disables caching entirely.
    pub cache_path: Option<PathBuf>,
    /// Bound on the whole run (cache probe excluded, it has its own).
    pub total_budget: Duration,
    /// Whether a failed run should ask for user input rather than just fail.
    pub allow_interactive: bool,
    /// NBSS port used for validation probes.
    pub nbss_port: u16,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        DiscoverOptions {
            cache_path: None,
            total_budget: TOTAL_BUDGET,
            allow_interactive: true,
            nbss_port: crate::client::DEFAULT_PORT,
        }
    }
}

/// Which attempt produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    Cached,
    WsDiscovery,
}

/// Where the time went, for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    pub cache_ms: u64,
    pub probe_ms: u64,
    pub metadata_ms: u64,
    pub total_ms: u64,
}

/// A located console.
#[derive(Debug, Clone)]
pub struct Discovered {
    pub ip: Ipv4Addr,
    pub name: String,
    pub method: DiscoveryMethod,
    pub timings: Timings,
}

fn ms_since(t: Instant) -> u64 {
    t.elapsed().as_millis() as u64
}

/// Find the console. Returns `(ip, name)` or a [`DiscoveryError`].
pub async fn discover(options: &DiscoverOptions) -> Result<Discovered> {
    let start = Instant::now();
    let mut timings = Timings::default();

    // 1. Cache, revalidated with at least a TCP connect. Never trusted blind.
    let mut stale_cache: Option<CacheRecord> = None;
    if let Some(path) = &options.cache_path {
        let t0 = Instant::now();
        if let Some(record) = cache::load(path) {
            if probe_port(record.ip, options.nbss_port, CACHE_PROBE_TIMEOUT).await {
                timings.cache_ms = ms_since(t0);
                timings.total_ms = ms_since(start);
                cache::store(path, &CacheRecord::new(record.ip, record.name.clone()));
                info!(ip = %record.ip, name = %record.name, "discovered via cache");
                return Ok(Discovered {
                    ip: record.ip,
                    name: record.name,
                    method: DiscoveryMethod::Cached,
                    timings,
                });
            }
            debug!(ip = %record.ip, "cached address did not answer, invalidating");
            stale_cache = Some(record);
        }
        timings.cache_ms = ms_since(t0);
    }

    // 2. WS-Discovery multicast probe.
    let t0 = Instant::now();
    let window = MULTICAST_WINDOW.min(options.total_budget.saturating_sub(start.elapsed()));
    let message_id = format!("urn:uuid:{}", Uuid::new_v4());
    let matches = probe_multicast(&message_id, window).await;
    timings.probe_ms = ms_since(t0);

    // 3. DPWS metadata, sequentially; the response set is small.
    let t0 = Instant::now();
    let mut any_metadata = false;
    'responders: for (ip, probe_match) in &matches {
        for url in &probe_match.xaddrs {
            let remaining = options.total_budget.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break 'responders;
            }
            let Some(xaddr) = wsd::parse_xaddr(url) else {
                continue;
            };
            let mid = format!("urn:uuid:{}", Uuid::new_v4());
            let body = match wsd::fetch_metadata(
                *ip,
                &xaddr,
                &probe_match.endpoint,
                &mid,
                METADATA_TIMEOUT.min(remaining),
            )
            .await
            {
                Ok(body) => body,
                Err(e) => {
                    debug!(ip = %ip, url = %url, error = %e, "metadata fetch failed");
                    continue;
                }
            };
            any_metadata = true;

            let meta = wsd::DeviceMetadata::parse(&body);
            if meta.is_3ds() {
                if let Some(name) = meta.netbios_name() {
                    timings.metadata_ms = ms_since(t0);
                    timings.total_ms = ms_since(start);
                    if let Some(path) = &options.cache_path {
                        cache::store(path, &CacheRecord::new(*ip, name.clone()));
                    }
                    info!(ip = %ip, name = %name, total_ms = timings.total_ms,
                          "discovered via WS-Discovery");
                    return Ok(Discovered {
                        ip: *ip,
                        name,
                        method: DiscoveryMethod::WsDiscovery,
                        timings,
                    });
                }
            }
            debug!(ip = %ip, "responder is not the console");
            continue 'responders;
        }
    }
    timings.metadata_ms = ms_since(t0);
    timings.total_ms = ms_since(start);

    // 4. Structured failure. A stale cached IP whose port still answers is
    // worth handing to the shell as a starting point.
    let mut partial_ip = matches.first().map(|(ip, _)| *ip);
    if partial_ip.is_none() {
        if let Some(record) = stale_cache {
            if probe_port(record.ip, options.nbss_port, CACHE_PROBE_TIMEOUT).await {
                partial_ip = Some(record.ip);
            }
        }
    }

    let err = if options.allow_interactive {
        DiscoveryError::NeedsUserInput { ip: partial_ip }
    } else if matches.is_empty() {
        DiscoveryError::NoResponders
    } else if !any_metadata {
        DiscoveryError::MetadataUnreachable
    } else {
        DiscoveryError::NameUnresolvable
    };
    warn!(error = ?err, total_ms = timings.total_ms, "discovery failed");
    Err(Error::Discovery(err))
}

/// Send one Probe and collect ProbeMatches until the window closes.
/// Responses are deduplicated by source address.
async fn probe_multicast(message_id: &str, window: Duration) -> Vec<(Ipv4Addr, ProbeMatch)> {
    let mut found = Vec::new();

    let socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "could not bind discovery socket");
            return found;
        }
    };
    let _ = socket.set_broadcast(true);
    let _ = socket.set_multicast_loop_v4(true);
    let _ = socket.set_multicast_ttl_v4(1);

    let probe = wsd::probe_envelope(message_id);
    if let Err(e) = socket
        .send_to(probe.as_bytes(), (wsd::WSD_MULTICAST_ADDR, wsd::WSD_PORT))
        .await
    {
        warn!(error = %e, "could not send WS-Discovery probe");
        return found;
    }

    let deadline = Instant::now() + window;
    let mut seen: HashSet<Ipv4Addr> = HashSet::new();
    let mut buf = vec![0u8; 65535];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let (n, addr) = match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                debug!(error = %e, "receive error while collecting ProbeMatches");
                break;
            }
            Err(_) => break,
        };
        let IpAddr::V4(src) = addr.ip() else {
            continue;
        };
        if seen.contains(&src) {
            continue;
        }
        let body = String::from_utf8_lossy(&buf[..n]);
        if let Some(probe_match) = wsd::parse_probe_match(&body, message_id) {
            debug!(ip = %src, xaddrs = probe_match.xaddrs.len(), "ProbeMatch");
            seen.insert(src);
            found.push((src, probe_match));
        }
    }
    found
}

/// True if `ip:port` accepts a TCP connection within `deadline`.
pub async fn probe_port(ip: Ipv4Addr, port: u16, deadline: Duration) -> bool {
    matches!(
        timeout(deadline, TcpStream::connect((ip, port))).await,
        Ok(Ok(_))
    )
}

/// True if the server at `ip` accepts an NBSS session for `name`.
///
/// Stronger than [`probe_port`]: the console refuses the session when the
/// called name is wrong, which makes this the way to check a user-typed name.
pub async fn verify_name(ip: Ipv4Addr, name: &str, port: u16, deadline: Duration) -> bool {
    let stream = match timeout(deadline, TcpStream::connect((ip, port))).await {
        Ok(Ok(s)) => s,
        _ => return false,
    };
    let mut transport = SmbTransport::new(stream, deadline);
    transport.request_session(name).await.is_ok()
}
