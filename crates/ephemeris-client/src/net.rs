//! Address discovery.
//!
//! Connecting a UDP socket sends nothing; it only makes the OS pick a route,
//! which reveals the local address peers on other hosts would see. Behind
//! NAT that is not the address the internet sees, so [`public_ipv4`] asks an
//! echo service instead.

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::error::{ClientError, Result};

/// Echo service that answers with the caller's public address as plain text.
pub const PUBLIC_IP_ECHO_URL: &str = "http://api.ipify.org?format=text";

const PUBLIC_IP_TIMEOUT: Duration = Duration::from_secs(5);

const ROUTE_TARGET_V4: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 53);
const ROUTE_TARGET_V6: SocketAddr = SocketAddr::new(
    IpAddr::V6(Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888)),
    53,
);

/// Local IPv4 address used for traffic to the public internet.
pub async fn outbound_ipv4() -> Result<Ipv4Addr> {
    match local_address_towards(ROUTE_TARGET_V4).await? {
        IpAddr::V4(addr) => Ok(addr),
        IpAddr::V6(addr) => Err(unexpected_family(addr.into()).into()),
    }
}

/// Local IPv6 address used for traffic to the public internet.
pub async fn outbound_ipv6() -> Result<Ipv6Addr> {
    match local_address_towards(ROUTE_TARGET_V6).await? {
        IpAddr::V6(addr) => Ok(addr),
        IpAddr::V4(addr) => Err(unexpected_family(addr.into()).into()),
    }
}

/// Public IPv4 address as reported by [`PUBLIC_IP_ECHO_URL`].
pub async fn public_ipv4() -> Result<Ipv4Addr> {
    public_ipv4_from(PUBLIC_IP_ECHO_URL, PUBLIC_IP_TIMEOUT).await
}

/// Asks `echo_url` for this host's public IPv4 address.
///
/// The response body must be the bare address, surrounding whitespace
/// allowed.
pub async fn public_ipv4_from(echo_url: &str, timeout: Duration) -> Result<Ipv4Addr> {
    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
    let request = Request::get(echo_url)
        .body(Empty::new())
        .map_err(|e| ClientError::Config(format!("invalid echo URL: {e}")))?;

    let exchange = async {
        let response = client
            .request(request)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .to_bytes();
        Ok::<_, ClientError>((status, body))
    };

    let (status, body) = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ClientError::Timeout(timeout))??;
    if status != StatusCode::OK {
        return Err(ClientError::Status(status));
    }

    let text = std::str::from_utf8(&body).map_err(|e| ClientError::Malformed(e.to_string()))?;
    text.trim()
        .parse()
        .map_err(|_| ClientError::Malformed(format!("not an IPv4 address: {:?}", text.trim())))
}

async fn local_address_towards(target: SocketAddr) -> io::Result<IpAddr> {
    let bind: SocketAddr = match target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(target).await?;
    Ok(socket.local_addr()?.ip())
}

fn unexpected_family(addr: IpAddr) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("route resolved to {addr} in the wrong address family"),
    )
}
