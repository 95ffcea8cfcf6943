//! Command handlers for the supported IPMI commands

mod boot;
mod chassis;
mod device;

pub use boot::{handle_get_boot_parameter, handle_set_boot_device};
pub use chassis::{handle_chassis_control, handle_get_power_status};
pub use device::handle_get_device_id;

use crate::action::{ActionError, ActionRunner};
use crate::config::ScriptPaths;
use bmc_shared::{DeviceIdentity, Request, Response};
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

/// Outcome of one handler: a response to send, or a failure that the
/// dispatcher turns into completion code 0xFF
pub type HandlerResult = Result<Response, HandlerError>;

/// Why a handler could not produce a response
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("request payload too short: byte {index} missing ({len} bytes received)")]
    ShortPayload { index: usize, len: usize },

    #[error("unknown chassis control request: {0:#04x}")]
    UnknownChassisControl(u8),

    #[error("unsupported power status from the process: {0:?}")]
    UnsupportedPowerStatus(String),

    #[error("unsupported boot device from the process: {0:?}")]
    UnsupportedBootDevice(String),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Context passed to command handlers
pub struct HandlerContext<'a> {
    pub client: IpAddr,
    pub managed_host: &'a str,
    pub scripts: &'a ScriptPaths,
    pub runner: &'a dyn ActionRunner,
    pub identity: &'a DeviceIdentity,
}

impl HandlerContext<'_> {
    /// Run `script <managed_host> [param]`
    pub async fn run_script(&self, script: &Path, param: Option<&str>) -> Result<String, ActionError> {
        let mut args = vec![self.managed_host];
        args.extend(param);
        self.runner.run(script, &args).await
    }
}

/// Payload byte `index`, or a short-payload failure
fn payload_byte(request: &Request, index: usize) -> Result<u8, HandlerError> {
    request.byte(index).ok_or(HandlerError::ShortPayload {
        index,
        len: request.data.len(),
    })
}
