//! virtual-bmc Shared Protocol Types
//!
//! This crate provides the IPMI protocol types shared by the BMC service:
//! network function and command codes, completion codes, the decoded
//! request/response pair, the parameter mapping tables and the LAN codec.

pub mod codec;
pub mod params;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Network function codes (the "function class" half of a command selector)
pub mod netfn {
    pub const CHASSIS: u8 = 0x00;
    pub const APP: u8 = 0x06;
}

/// Command codes, grouped by network function
pub mod cmd {
    // Chassis
    pub const GET_CHASSIS_STATUS: u8 = 0x01;
    pub const CHASSIS_CONTROL: u8 = 0x02;
    pub const SET_SYSTEM_BOOT_OPTIONS: u8 = 0x08;
    pub const GET_SYSTEM_BOOT_OPTIONS: u8 = 0x09;

    // App
    pub const GET_DEVICE_ID: u8 = 0x01;
    pub const GET_CHANNEL_AUTH_CAPABILITIES: u8 = 0x38;
    pub const GET_SESSION_CHALLENGE: u8 = 0x39;
    pub const ACTIVATE_SESSION: u8 = 0x3A;
    pub const SET_SESSION_PRIVILEGE: u8 = 0x3B;
    pub const CLOSE_SESSION: u8 = 0x3C;
    pub const GET_CHANNEL_CIPHER_SUITES: u8 = 0x54;
}

/// Completion code carried as the first byte of every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompletionCode(pub u8);

impl CompletionCode {
    pub const SUCCESS: Self = Self(0x00);
    /// Get System Boot Options: parameter not supported
    pub const PARAMETER_NOT_SUPPORTED: Self = Self(0x80);
    /// Get Session Challenge: invalid user name.
    /// Activate Session: no session slot available.
    /// Set Session Privilege Level: requested level not available.
    pub const INVALID_USER_NAME: Self = Self(0x81);
    pub const NO_SESSION_SLOT: Self = Self(0x81);
    pub const PRIVILEGE_NOT_AVAILABLE: Self = Self(0x81);
    pub const INVALID_SESSION_ID: Self = Self(0x87);
    pub const INVALID_COMMAND: Self = Self(0xC1);
    pub const REQUEST_DATA_LENGTH_INVALID: Self = Self(0xC7);
    pub const INVALID_DATA_FIELD: Self = Self(0xCC);
    pub const UNSPECIFIED_ERROR: Self = Self(0xFF);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// A decoded IPMI request as seen by the command dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub net_fn: u8,
    pub command: u8,
    pub data: Vec<u8>,
    /// Address of the remote console that sent the request
    pub client: IpAddr,
}

impl Request {
    pub fn new(net_fn: u8, command: u8, data: impl Into<Vec<u8>>, client: IpAddr) -> Self {
        Self {
            net_fn,
            command,
            data: data.into(),
            client,
        }
    }

    /// Payload byte at `index`, if the request carries that many bytes
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new(0, 0, Vec::new(), IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

/// A response to one request: a completion code and optional data bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub completion: CompletionCode,
    pub data: Vec<u8>,
}

impl Response {
    /// Successful response without data
    pub fn success() -> Self {
        Self::completion(CompletionCode::SUCCESS)
    }

    /// Successful response carrying data
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            completion: CompletionCode::SUCCESS,
            data: data.into(),
        }
    }

    /// Response made of a completion code alone
    pub fn completion(completion: CompletionCode) -> Self {
        Self {
            completion,
            data: Vec::new(),
        }
    }
}

/// Identity reported by Get Device ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: u8,
    pub revision: u8,
    pub firmware_major: u8,
    /// BCD encoded
    pub firmware_minor: u8,
    /// BCD encoded, low nibble is the major version
    pub ipmi_version: u8,
    pub additional_support: u8,
    /// IANA enterprise number, 20 bits used
    pub manufacturer_id: u32,
    pub product_id: u16,
}

impl DeviceIdentity {
    /// Encode the Get Device ID response data
    pub fn encode(&self) -> Vec<u8> {
        let mfg = self.manufacturer_id.to_le_bytes();
        let prod = self.product_id.to_le_bytes();
        vec![
            self.device_id,
            self.revision,
            self.firmware_major & 0x7F,
            self.firmware_minor,
            self.ipmi_version,
            self.additional_support,
            mfg[0],
            mfg[1],
            mfg[2],
            prod[0],
            prod[1],
        ]
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            device_id: 0,
            revision: 0,
            firmware_major: 1,
            firmware_minor: 0,
            ipmi_version: 0x02,
            additional_support: 0,
            manufacturer_id: 0,
            product_id: 0,
        }
    }
}

/// Session privilege levels
pub mod privilege {
    pub const CALLBACK: u8 = 0x01;
    pub const USER: u8 = 0x02;
    pub const OPERATOR: u8 = 0x03;
    pub const ADMINISTRATOR: u8 = 0x04;
}
