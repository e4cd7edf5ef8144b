//! Host name resolution for the relay's sockets.
//!
//! Resolvers commonly list `::1` before `127.0.0.1` for `localhost`. The
//! default allow-list is written for IPv4 loopback, so IPv4 results win.

use std::io;
use std::net::SocketAddr;

use tokio::net::lookup_host;

/// First IPv4 address of `addrs`, else the first address of any family.
pub fn prefer_ipv4<I>(addrs: I) -> Option<SocketAddr>
where
    I: IntoIterator<Item = SocketAddr>,
{
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}

/// Resolve `host:port` to one address, preferring IPv4.
///
/// Returns `Ok(None)` when the name resolves to no address at all.
pub async fn resolve(addr: &str) -> io::Result<Option<SocketAddr>> {
    Ok(prefer_ipv4(lookup_host(addr).await?))
}
