//! System boot options handlers (get boot flags, set boot device)

use super::{payload_byte, HandlerContext, HandlerError, HandlerResult};
use bmc_shared::params::{self, BootDevice, BootOptionsRequest, BOOT_FLAGS_SELECTOR};
use bmc_shared::{CompletionCode, Request, Response};
use tracing::info;

/// Handle Get System Boot Options
///
/// Only the boot-flags parameter (5) is supported.
pub async fn handle_get_boot_parameter(ctx: &HandlerContext<'_>, request: &Request) -> HandlerResult {
    let selector = payload_byte(request, 0)?;
    if !params::is_supported_boot_parameter(selector) {
        return Ok(Response::completion(CompletionCode::PARAMETER_NOT_SUPPORTED));
    }

    info!("{}: Chassis bootparam get {}", ctx.client, BOOT_FLAGS_SELECTOR);
    let param = BOOT_FLAGS_SELECTOR.to_string();
    let device = ctx
        .run_script(&ctx.scripts.boot_device_get, Some(&param))
        .await?;

    match BootDevice::from_name(&device) {
        Some(device) => Ok(Response::with_data(params::encode_boot_flags(device))),
        None => Err(HandlerError::UnsupportedBootDevice(device)),
    }
}

/// Handle Set System Boot Options
pub async fn handle_set_boot_device(ctx: &HandlerContext<'_>, request: &Request) -> HandlerResult {
    let code = payload_byte(request, 0)?;

    match BootOptionsRequest::from_code(code) {
        Some(BootOptionsRequest::NoOp) => Ok(Response::success()),
        Some(BootOptionsRequest::SetDevice) => {
            let selector = params::device_selector(payload_byte(request, 2)?);
            let Some(device) = BootDevice::from_selector(selector) else {
                return Ok(Response::completion(CompletionCode::INVALID_DATA_FIELD));
            };

            info!("{}: Chassis bootdevice {}", ctx.client, device);
            ctx.run_script(&ctx.scripts.boot_device_set, Some(device.as_str()))
                .await?;
            Ok(Response::success())
        }
        None => Ok(Response::completion(CompletionCode::INVALID_COMMAND)),
    }
}
