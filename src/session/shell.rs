//! Seam between the network side and the command dispatcher

use anyhow::Result;
use async_trait::async_trait;
use super::frame::ReplyFrame;
use bmc_shared::codec::LanMessage;
use bmc_shared::{Request, Response};
use std::net::SocketAddr;
use std::time::Duration;

/// A request that passed authentication, plus what is needed to answer it
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub request: Request,
    pub peer: SocketAddr,
    /// Session framing to send the response under
    pub frame: ReplyFrame,
    /// The request message, for addressing the response
    pub message: LanMessage,
}

/// Authenticates clients and moves requests and responses over the wire
#[async_trait]
pub trait SessionShell: Send {
    /// Wait up to `timeout` for the next request.
    ///
    /// Login traffic and dropped packets are handled internally; `None`
    /// means the timeout elapsed without a request for the dispatcher.
    async fn wait_for_request(&mut self, timeout: Duration) -> Result<Option<InboundRequest>>;

    /// Send the dispatcher's response to `inbound`
    async fn send_response(&mut self, inbound: &InboundRequest, response: &Response) -> Result<()>;
}
