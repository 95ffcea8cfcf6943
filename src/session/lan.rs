//! IPMI over LAN (RMCP/UDP) session shell: v1.5 sessions and v2.0 RMCP+

use super::manager::{Disposition, SessionManager};
use super::shell::{InboundRequest, SessionShell};
use crate::config::Credentials;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bmc_shared::codec::{self, Packet, MAX_DATAGRAM_SIZE};
use bmc_shared::{Request, Response};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// UDP listener speaking IPMI-over-LAN with straight-password and RMCP+ sessions
pub struct LanShell {
    socket: UdpSocket,
    sessions: SessionManager,
    buf: Vec<u8>,
}

impl LanShell {
    /// Bind the listening socket
    pub async fn bind(host: &str, port: u16, credentials: &Credentials) -> Result<Self> {
        let socket = UdpSocket::bind((host, port))
            .await
            .with_context(|| format!("failed to bind UDP socket on [{host}]:{port}"))?;

        Ok(Self {
            socket,
            sessions: SessionManager::new(credentials),
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Handle one datagram; returns the request if it is for the dispatcher
    async fn process(&mut self, peer: SocketAddr, len: usize) -> Option<InboundRequest> {
        let packet = match codec::decode(&self.buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("{}: Dropping datagram: {}", peer, e);
                return None;
            }
        };

        let now = Instant::now();
        let disposition = match packet {
            Packet::Ping { tag } => {
                self.send(peer, &codec::encode_pong(tag)).await;
                return None;
            }
            Packet::Ipmi { header, message } => self.sessions.handle(peer, &header, &message, now),
            Packet::RmcpPlus(frame) => self.sessions.handle_rmcp_plus(peer, &frame, now),
        };

        match disposition {
            Disposition::Reply {
                frame,
                message,
                response,
            } => {
                match frame.encode(&message, &response) {
                    Ok(datagram) => self.send(peer, &datagram).await,
                    Err(e) => warn!("{}: Failed to encode response: {}", peer, e),
                }
                None
            }
            Disposition::Dispatch { frame, message } => Some(InboundRequest {
                request: Request::new(message.net_fn, message.command, message.data.to_vec(), peer.ip()),
                peer,
                frame,
                message,
            }),
            Disposition::Send(datagram) => {
                self.send(peer, &datagram).await;
                None
            }
            Disposition::Drop(e) => {
                warn!("{}: Dropping IPMI message: {}", peer, e);
                None
            }
        }
    }

    async fn send(&self, peer: SocketAddr, datagram: &[u8]) {
        if let Err(e) = self.socket.send_to(datagram, peer).await {
            warn!("{}: Failed to send datagram: {}", peer, e);
        }
    }
}

#[async_trait]
impl SessionShell for LanShell {
    async fn wait_for_request(&mut self, timeout: Duration) -> Result<Option<InboundRequest>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            self.sessions.expire_idle(Instant::now());

            let received = tokio::time::timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await;
            let (len, peer) = match received {
                Ok(result) => result.context("failed to receive datagram")?,
                Err(_) => return Ok(None),
            };

            if let Some(inbound) = self.process(peer, len).await {
                return Ok(Some(inbound));
            }
        }
    }

    async fn send_response(&mut self, inbound: &InboundRequest, response: &Response) -> Result<()> {
        let datagram = inbound.frame.encode(&inbound.message, response)?;
        self.socket
            .send_to(&datagram, inbound.peer)
            .await
            .with_context(|| format!("failed to send response to {}", inbound.peer))?;
        Ok(())
    }
}
