//! Destination input: name resolution and random public targets.

use rand::Rng;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use tracing::debug;

use crate::error::TraceError;

/// Destinations accepted for tracing plus the inputs that were rejected
#[derive(Debug, Default)]
pub struct ResolvedDestinations {
    /// Unique IPv4 destinations in first-seen order
    pub addrs: Vec<Ipv4Addr>,
    /// One `UnresolvedDestination` per rejected input
    pub rejected: Vec<TraceError>,
}

/// Resolve user input (IPv4 literals or hostnames) to IPv4 destinations
///
/// IPv6 literals, empty strings and names without an IPv4 address are
/// rejected per input; the remaining inputs are still returned.
pub fn resolve_destinations<S: AsRef<str>>(inputs: &[S]) -> ResolvedDestinations {
    let mut resolved = ResolvedDestinations::default();
    let mut seen = HashSet::new();

    for input in inputs {
        let input = input.as_ref();
        match resolve_destination(input) {
            Ok(addr) => {
                if seen.insert(addr) {
                    resolved.addrs.push(addr);
                } else {
                    debug!(input, destination = %addr, "Duplicate destination, skipping");
                }
            }
            Err(e) => resolved.rejected.push(e),
        }
    }

    resolved
}

/// Resolve a single input to an IPv4 destination
pub fn resolve_destination(input: &str) -> Result<Ipv4Addr, TraceError> {
    let unresolved = |reason: &str| TraceError::UnresolvedDestination {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(unresolved("empty destination"));
    }

    // Try parsing as IP address first
    match trimmed.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => return Ok(ip),
        Ok(IpAddr::V6(_)) => return Err(unresolved("IPv6 is not supported")),
        Err(_) => {}
    }

    // Resolve hostname
    let addrs = (trimmed, 0)
        .to_socket_addrs()
        .map_err(|e| unresolved(&e.to_string()))?;

    addrs
        .filter_map(|sa| match sa.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| unresolved("no IPv4 address found for hostname"))
}

/// Whether an address is outside the private, loopback, link-local and
/// multicast/reserved ranges (and not `0.0.0.0/8`)
pub fn is_public_candidate(ip: Ipv4Addr) -> bool {
    let [first, second, _, fourth] = ip.octets();
    (1..=223).contains(&first)
        && (1..=254).contains(&fourth)
        && first != 10
        && first != 127
        && !(first == 172 && (16..=31).contains(&second))
        && !(first == 192 && second == 168)
        && !(first == 169 && second == 254)
}

/// Generate `count` distinct random public IPv4 addresses
pub fn random_public_ips<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<Ipv4Addr> {
    let mut seen = HashSet::with_capacity(count);
    let mut ips = Vec::with_capacity(count);

    while ips.len() < count {
        let ip = Ipv4Addr::new(
            rng.gen_range(1..=223),
            rng.gen_range(0..=255),
            rng.gen_range(0..=255),
            rng.gen_range(1..=254),
        );
        if is_public_candidate(ip) && seen.insert(ip) {
            ips.push(ip);
        }
    }

    ips
}
