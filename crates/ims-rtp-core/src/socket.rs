//! UDP transport abstraction used for both the RTP and RTCP legs of a
//! session. Wraps `tokio::net::UdpSocket` with the DSCP/TTL knobs a media
//! gateway needs to set per RFC 3550 deployment guidance, and a listener
//! loop that hands received datagrams to a caller-supplied callback.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Error;
use crate::Result;

/// Socket-level tuning applied at bind time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// DSCP codepoint to mark outgoing datagrams with (e.g. EF = 46 for
    /// voice). Applied via IP_TOS/IPV6_TCLASS.
    pub dscp: Option<u8>,
    /// IP TTL / hop limit for outgoing datagrams.
    pub ttl: Option<u32>,
    /// Socket receive buffer size hint.
    pub recv_buffer_size: Option<usize>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self { dscp: Some(46), ttl: None, recv_buffer_size: None }
    }
}

/// A bound UDP endpoint with DSCP/TTL applied.
pub struct RtpSocket {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl RtpSocket {
    /// Binds a new UDP socket at `local_addr` and applies `options`.
    pub async fn bind(local_addr: SocketAddr, options: &SocketOptions) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| Error::SocketError(format!("bind {local_addr}: {e}")))?;

        if let Some(dscp) = options.dscp {
            Self::apply_dscp(&socket, dscp)?;
        }
        if let Some(ttl) = options.ttl {
            socket.set_ttl(ttl).map_err(|e| Error::SocketError(format!("set_ttl: {e}")))?;
        }

        let local_addr = socket
            .local_addr()
            .map_err(|e| Error::SocketError(format!("local_addr: {e}")))?;

        Ok(Self { socket: Arc::new(socket), local_addr })
    }

    fn apply_dscp(socket: &UdpSocket, dscp: u8) -> Result<()> {
        // DSCP occupies the top 6 bits of the IPv4 TOS / IPv6 traffic class
        // octet; the low 2 bits are ECN and left untouched.
        #[cfg(unix)]
        {
            use std::os::fd::AsRawFd;
            let tos: libc::c_int = (dscp << 2) as libc::c_int;
            let fd = socket.as_raw_fd();
            let ret = unsafe {
                libc::setsockopt(
                    fd,
                    libc::IPPROTO_IP,
                    libc::IP_TOS,
                    &tos as *const libc::c_int as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            };
            if ret != 0 {
                warn!("failed to set IP_TOS to {dscp:#04x}, continuing without DSCP marking");
            }
        }
        #[cfg(not(unix))]
        {
            let _ = dscp;
        }
        Ok(())
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends a datagram, retrying transparently on `EINTR`.
    pub async fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        loop {
            match self.socket.send_to(buf, target).await {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::SocketError(format!("send_to {target}: {e}"))),
            }
        }
    }

    /// Receives a single datagram into `buf`, retrying on `EINTR`.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        loop {
            match self.socket.recv_from(buf).await {
                Ok(res) => return Ok(res),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::SocketError(format!("recv_from: {e}"))),
            }
        }
    }

    /// Spawns a task that loops on `recv_from` and invokes `on_datagram` for
    /// each received packet. The task exits if the socket is closed or the
    /// callback signals it should stop by returning `false`.
    pub fn spawn_listener<F>(self: &Arc<Self>, mut on_datagram: F) -> JoinHandle<()>
    where
        F: FnMut(Vec<u8>, SocketAddr) -> bool + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut buf = vec![0u8; crate::DEFAULT_MAX_PACKET_SIZE];
            loop {
                match this.recv_from(&mut buf).await {
                    Ok((n, from)) => {
                        if !on_datagram(buf[..n].to_vec(), from) {
                            debug!("listener callback requested shutdown");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("socket listener stopping after error: {e}");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_and_exchange_datagram() {
        let a = RtpSocket::bind("127.0.0.1:0".parse().unwrap(), &SocketOptions::default())
            .await
            .unwrap();
        let b = RtpSocket::bind("127.0.0.1:0".parse().unwrap(), &SocketOptions::default())
            .await
            .unwrap();

        a.send_to(b"hello", b.local_addr()).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(from, a.local_addr());
    }

    #[test]
    fn default_options_mark_ef_dscp_for_voice() {
        let opts = SocketOptions::default();
        assert_eq!(opts.dscp, Some(46));
    }
}
