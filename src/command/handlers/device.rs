//! Get Device ID handler

use super::{HandlerContext, HandlerResult};
use bmc_shared::{Request, Response};

/// Handle Get Device ID. Answered locally, no script involved.
pub async fn handle_get_device_id(ctx: &HandlerContext<'_>, _request: &Request) -> HandlerResult {
    Ok(Response::with_data(ctx.identity.encode()))
}
