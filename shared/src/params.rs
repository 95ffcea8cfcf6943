//! Parameter mapping between IPMI numeric codes and BMC actions
//!
//! Every decoder returns `None` for an unmapped input; callers decide which
//! completion code (or handler failure) that turns into.

use std::fmt;

/// Boot parameter selector for "boot flags", the only one supported
pub const BOOT_FLAGS_SELECTOR: u8 = 5;

/// Parameter version reported in Get System Boot Options responses
pub const BOOT_OPTIONS_PARAMETER_VERSION: u8 = 1;

/// Boot flags byte 1: "boot flags valid" set
pub const BOOT_FLAGS_VALID: u8 = 0b1000_0000;

/// Chassis control actions (Chassis Control request byte 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Off,
    On,
    Cycle,
    Reset,
    Diag,
    Soft,
}

impl PowerAction {
    pub const ALL: [PowerAction; 6] = [
        PowerAction::Off,
        PowerAction::On,
        PowerAction::Cycle,
        PowerAction::Reset,
        PowerAction::Diag,
        PowerAction::Soft,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PowerAction::Off),
            1 => Some(PowerAction::On),
            2 => Some(PowerAction::Cycle),
            3 => Some(PowerAction::Reset),
            4 => Some(PowerAction::Diag),
            5 => Some(PowerAction::Soft),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            PowerAction::Off => 0,
            PowerAction::On => 1,
            PowerAction::Cycle => 2,
            PowerAction::Reset => 3,
            PowerAction::Diag => 4,
            PowerAction::Soft => 5,
        }
    }

    /// Word passed to the power-action script
    pub fn as_str(self) -> &'static str {
        match self {
            PowerAction::Off => "off",
            PowerAction::On => "on",
            PowerAction::Cycle => "cycle",
            PowerAction::Reset => "reset",
            PowerAction::Diag => "diag",
            PowerAction::Soft => "soft",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power state reported by the power-status script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    /// Parse script output, ignoring case
    pub fn parse(text: &str) -> Option<Self> {
        if text.eq_ignore_ascii_case("on") {
            Some(PowerState::On)
        } else if text.eq_ignore_ascii_case("off") {
            Some(PowerState::Off)
        } else {
            None
        }
    }

    /// Get Chassis Status response data: current power state, then
    /// last power event and misc chassis state left clear
    pub fn encode_status(self) -> [u8; 3] {
        let powered = match self {
            PowerState::On => 1,
            PowerState::Off => 0,
        };
        [powered, 0, 0]
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

/// Boot device understood by the boot-device scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDevice {
    Pxe,
    Cdrom,
    Disk,
}

impl BootDevice {
    /// Decode the 4-bit device selector of a Set System Boot Options request
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            1 => Some(BootDevice::Pxe),
            5 => Some(BootDevice::Cdrom),
            2 => Some(BootDevice::Disk),
            _ => None,
        }
    }

    pub fn selector(self) -> u8 {
        match self {
            BootDevice::Pxe => 1,
            BootDevice::Cdrom => 5,
            BootDevice::Disk => 2,
        }
    }

    /// Device byte of a Get System Boot Options boot-flags response
    pub fn flags_code(self) -> u8 {
        match self {
            BootDevice::Pxe => 0x04,
            BootDevice::Cdrom => 0x14,
            BootDevice::Disk => 0x08,
        }
    }

    /// Exact match on script output or argument name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pxe" => Some(BootDevice::Pxe),
            "cdrom" => Some(BootDevice::Cdrom),
            "disk" => Some(BootDevice::Disk),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BootDevice::Pxe => "pxe",
            BootDevice::Cdrom => "cdrom",
            BootDevice::Disk => "disk",
        }
    }
}

impl fmt::Display for BootDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set System Boot Options request, keyed by payload byte 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOptionsRequest {
    /// Set-in-progress, boot info acknowledge and boot flag valid clearing.
    /// Accepted and ignored.
    NoOp,
    /// Boot flags: selects the next boot device
    SetDevice,
}

impl BootOptionsRequest {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 | 3 | 4 => Some(BootOptionsRequest::NoOp),
            BOOT_FLAGS_SELECTOR => Some(BootOptionsRequest::SetDevice),
            _ => None,
        }
    }
}

/// Extract the device selector from boot flags data byte 2 (bits 2..=5)
pub fn device_selector(flags: u8) -> u8 {
    (flags >> 2) & 0x0F
}

/// Whether Get System Boot Options supports this parameter selector
pub fn is_supported_boot_parameter(selector: u8) -> bool {
    selector == BOOT_FLAGS_SELECTOR
}

/// Get System Boot Options response data for the boot-flags parameter
pub fn encode_boot_flags(device: BootDevice) -> [u8; 7] {
    [
        BOOT_OPTIONS_PARAMETER_VERSION,
        BOOT_FLAGS_SELECTOR,
        BOOT_FLAGS_VALID,
        device.flags_code(),
        0,
        0,
        0,
    ]
}
