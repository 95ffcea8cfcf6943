//! Chassis power handlers (status, control)

use super::{payload_byte, HandlerContext, HandlerError, HandlerResult};
use bmc_shared::params::{PowerAction, PowerState};
use bmc_shared::{Request, Response};
use tracing::info;

/// Handle Get Chassis Status
///
/// The power-status script must print "on" or "off" (any case).
pub async fn handle_get_power_status(ctx: &HandlerContext<'_>, _request: &Request) -> HandlerResult {
    info!("{}: Power status", ctx.client);

    let status = ctx.run_script(&ctx.scripts.power_status, None).await?;
    match PowerState::parse(&status) {
        Some(state) => Ok(Response::with_data(state.encode_status())),
        None => Err(HandlerError::UnsupportedPowerStatus(status)),
    }
}

/// Handle Chassis Control
///
/// An unknown control code is a handler failure rather than an
/// "invalid data field" completion; clients see 0xFF.
pub async fn handle_chassis_control(ctx: &HandlerContext<'_>, request: &Request) -> HandlerResult {
    let code = payload_byte(request, 0)?;
    let action = PowerAction::from_code(code).ok_or(HandlerError::UnknownChassisControl(code))?;

    info!("{}: Power {}", ctx.client, action);
    ctx.run_script(&ctx.scripts.power_action, Some(action.as_str()))
        .await?;

    Ok(Response::success())
}
