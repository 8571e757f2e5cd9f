//! ICMP echo transport shared by the packet loss and jitter probes.

use std::net::IpAddr;
use std::time::Duration;

use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio::time::timeout;

use crate::probe::ProbeError;

/// Default reachability target.
pub const DEFAULT_HOST: &str = "8.8.8.8";

/// Timeout used when the caller does not give one, so a lost reply cannot
/// suspend a probe forever.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(2);

/// A single reachability check against a host.
#[async_trait::async_trait]
pub trait Pinger: Send + Sync + 'static {
    /// Send one echo request and return its round-trip time.
    async fn ping(
        &self,
        host: &str,
        seq: u16,
        timeout: Option<Duration>,
    ) -> Result<Duration, ProbeError>;
}

/// Pinger backed by raw ICMP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcmpPinger;

impl IcmpPinger {
    pub fn new() -> Self {
        Self
    }
}

/// Resolve hostname to IP address.
pub(crate) async fn resolve_host(host: &str) -> Result<IpAddr, std::io::Error> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs = tokio::net::lookup_host(format!("{host}:0")).await?;
    addrs
        .into_iter()
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found"))
}

#[async_trait::async_trait]
impl Pinger for IcmpPinger {
    async fn ping(
        &self,
        host: &str,
        seq: u16,
        probe_timeout: Option<Duration>,
    ) -> Result<Duration, ProbeError> {
        let ip_addr = resolve_host(host).await?;

        let client = match ip_addr {
            IpAddr::V4(_) => Client::new(&Config::default()),
            IpAddr::V6(_) => Client::new(&Config::builder().kind(ICMP::V6).build()),
        }
        .map_err(|e| ProbeError::Network(format!("failed to create ICMP client: {e}")))?;

        let probe_timeout = probe_timeout.unwrap_or(FALLBACK_TIMEOUT);
        let mut pinger = client.pinger(ip_addr, PingIdentifier(rand::random())).await;
        pinger.timeout(probe_timeout);

        match timeout(probe_timeout, pinger.ping(PingSequence(seq), &[])).await {
            Ok(Ok((_, rtt))) => Ok(rtt),
            Ok(Err(e)) => Err(ProbeError::Network(e.to_string())),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}
