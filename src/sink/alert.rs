use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use anyhow::{anyhow, Context, Result};

use super::Alert;

/// Fire-and-forget JSON alerts over UDP, one datagram per alert.
pub struct UdpAlertBroadcaster {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpAlertBroadcaster {
    pub fn new(target: &str) -> Result<Self> {
        let target = target
            .to_socket_addrs()
            .with_context(|| format!("resolve alert address {}", target))?
            .next()
            .ok_or_else(|| anyhow!("alert address {} resolved to nothing", target))?;
        let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind).context("bind alert socket")?;
        socket
            .set_broadcast(true)
            .context("enable SO_BROADCAST on alert socket")?;
        log::info!("sink: alerts to udp://{}", target);
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn send(&mut self, alert: &Alert) -> Result<()> {
        let body = serde_json::to_vec(alert)?;
        self.socket
            .send_to(&body, self.target)
            .with_context(|| format!("send alert to {}", self.target))?;
        Ok(())
    }
}
