//! Connection endpoint and the timed, lock-step framed socket both roles use.

use anyhow::{anyhow, bail, Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};

use crate::packet::Frame;
use crate::protocol::{ACK, NAK};

/// Address family restriction, mirroring `tcp`, `tcp4` and `tcp6`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Network {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
}

impl Network {
    fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        }
    }
}

/// Where a sender listens or a receiver dials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub network: Network,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, network: Network) -> Self {
        Self {
            host: host.into(),
            port,
            network,
        }
    }

    /// Parse `host:port` (or `[v6]:port`). Anything else is rejected.
    pub fn parse(addr: &str, network: Network) -> Result<Self> {
        let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
            let (host, port) = rest
                .split_once("]:")
                .ok_or_else(|| anyhow!("{}: wrong address format, it should be host:port", addr))?;
            (host, port)
        } else {
            let parts: Vec<&str> = addr.split(':').collect();
            if parts.len() != 2 {
                bail!("{}: wrong address format, it should be host:port", addr);
            }
            (parts[0], parts[1])
        };
        if host.is_empty() {
            bail!("{}: missing host", addr);
        }
        let port = port
            .parse::<u16>()
            .with_context(|| format!("{}: invalid port {:?}", addr, port))?;
        Ok(Self::new(host, port, network))
    }

    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub async fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("resolve {}", self.addr()))?
            .filter(|a| self.network.accepts(a))
            .collect();
        if addrs.is_empty() {
            bail!("no {:?} address found for {}", self.network, self.addr());
        }
        Ok(addrs)
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addrs = self.resolve().await?;
        TcpListener::bind(&addrs[..])
            .await
            .with_context(|| format!("failed to listen on {}", self.addr()))
    }

    pub async fn connect(&self, connect_timeout: Duration) -> Result<TcpStream> {
        let addrs = self.resolve().await?;
        let stream = match timeout(connect_timeout, TcpStream::connect(&addrs[..])).await {
            Ok(res) => res.with_context(|| format!("failed to dial {}", self.addr()))?,
            Err(_) => bail!(
                "connect {} timeout ({} ms)",
                self.addr(),
                connect_timeout.as_millis()
            ),
        };
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}

/// First non-loopback IPv4 address of this host, or 127.0.0.1.
///
/// Connecting a UDP socket sends nothing; it only selects the outbound
/// interface.
pub fn local_ipv4() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let sock = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        sock.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
        Ok(sock.local_addr()?.ip())
    };
    match probe() {
        Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => ip,
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

/// Socket owned by one connection worker. Every read and write is bounded
/// by the step deadline.
pub struct FrameStream {
    stream: TcpStream,
    peer: String,
    io_timeout: Duration,
}

impl FrameStream {
    pub fn new(stream: TcpStream, io_timeout: Duration) -> Self {
        let _ = stream.set_nodelay(true);
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            stream,
            peer,
            io_timeout,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn read_exact_timed(&mut self, buf: &mut [u8]) -> Result<()> {
        let ms = self.io_timeout.as_millis();
        match timeout(self.io_timeout, self.stream.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => bail!("read timeout ({} ms)", ms),
        }
    }

    pub async fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_timed(&mut buf).await?;
        Ok(buf)
    }

    pub async fn write_all_timed(&mut self, buf: &[u8]) -> Result<()> {
        let ms = self.io_timeout.as_millis();
        match timeout(self.io_timeout, self.stream.write_all(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => bail!("write timeout ({} ms)", ms),
        }
    }

    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let buf = frame
            .serialize()
            .with_context(|| format!("failed to serialize {}", frame.kind()))?;
        self.write_all_timed(&buf)
            .await
            .with_context(|| format!("failed to write {}", frame.kind()))
    }

    /// Wait for the peer's one-byte verdict. `Ok(false)` is a rejection.
    pub async fn await_ack(&mut self) -> Result<bool> {
        let mut ack = [0u8; 1];
        self.read_exact_timed(&mut ack)
            .await
            .context("failed to receive acknowledgment")?;
        Ok(ack[0] == ACK)
    }

    pub async fn send_ack(&mut self, accepted: bool) -> Result<()> {
        let byte = if accepted { ACK } else { NAK };
        self.write_all_timed(&[byte])
            .await
            .context("failed to send acknowledgment")
    }

    /// Single bounded read; returns whatever arrived, empty on EOF.
    pub async fn read_some(&mut self, max: usize, deadline: Duration) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max];
        match timeout(deadline, self.stream.read(&mut buf)).await {
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(buf)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => bail!("read timeout ({} ms)", deadline.as_millis()),
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let ep = Endpoint::parse("172.17.0.1:6969", Network::Tcp).unwrap();
        assert_eq!(ep.host, "172.17.0.1");
        assert_eq!(ep.port, 6969);
        assert_eq!(ep.addr(), "172.17.0.1:6969");

        let ep = Endpoint::parse("[::1]:3000", Network::Tcp6).unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.addr(), "[::1]:3000");
    }

    #[test]
    fn test_parse_endpoint_rejects_bad_shapes() {
        assert!(Endpoint::parse("localhost", Network::Tcp).is_err());
        assert!(Endpoint::parse("a:b:c", Network::Tcp).is_err());
        assert!(Endpoint::parse(":3000", Network::Tcp).is_err());
        assert!(Endpoint::parse("host:notaport", Network::Tcp).is_err());
        assert!(Endpoint::parse("host:70000", Network::Tcp).is_err());
    }

    #[tokio::test]
    async fn test_resolve_respects_network() {
        let ep = Endpoint::new("127.0.0.1", 0, Network::Tcp6);
        assert!(ep.resolve().await.is_err());
        let ep = Endpoint::new("127.0.0.1", 0, Network::Tcp4);
        assert_eq!(ep.resolve().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ack_exchange() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await?;
            let mut fs = FrameStream::new(stream, Duration::from_secs(5));
            fs.send_ack(true).await?;
            fs.send_ack(false).await?;
            anyhow::Ok(())
        });
        let (stream, _) = listener.accept().await?;
        let mut fs = FrameStream::new(stream, Duration::from_secs(5));
        assert!(fs.await_ack().await?);
        assert!(!fs.await_ack().await?);
        client.await??;
        // Peer closed: the next ack read fails instead of hanging
        assert!(fs.await_ack().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_read_times_out() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let _client = TcpStream::connect(addr).await?;
        let (stream, _) = listener.accept().await?;
        let mut fs = FrameStream::new(stream, Duration::from_millis(50));
        let err = fs.await_ack().await.unwrap_err();
        assert!(format!("{:#}", err).contains("timeout"));
        Ok(())
    }
}
