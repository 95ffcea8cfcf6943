//! RMCP+ handshake payloads: Open Session and RAKP messages 1-4

use super::rakp::{CipherSuite, Guid, Random, INTEGRITY_LEN, RANDOM_LEN};

/// RMCP+ status codes carried by handshake replies
pub mod status {
    pub const NO_ERRORS: u8 = 0x00;
    pub const INSUFFICIENT_RESOURCES: u8 = 0x01;
    pub const INVALID_SESSION_ID: u8 = 0x02;
    pub const INVALID_AUTH_ALGORITHM: u8 = 0x04;
    pub const INVALID_INTEGRITY_ALGORITHM: u8 = 0x05;
    pub const INVALID_ROLE: u8 = 0x09;
    pub const UNAUTHORIZED_NAME: u8 = 0x0D;
    pub const INVALID_INTEGRITY_CHECK: u8 = 0x0F;
    pub const INVALID_CONFIDENTIALITY_ALGORITHM: u8 = 0x10;
}

const AUTH_RAKP_HMAC_SHA1: u8 = 0x01;
const INTEGRITY_NONE: u8 = 0x00;
const INTEGRITY_HMAC_SHA1_96: u8 = 0x01;
const CONFIDENTIALITY_NONE: u8 = 0x00;
const CONFIDENTIALITY_AES_CBC_128: u8 = 0x01;

/// Longest user name RAKP 1 may carry
const MAX_USER_LEN: usize = 16;

/// Cipher suites offered, by id: 1, 2 and 3
const CIPHER_SUITES: [(u8, CipherSuite); 3] = [
    (
        1,
        CipherSuite {
            integrity: false,
            confidentiality: false,
        },
    ),
    (
        2,
        CipherSuite {
            integrity: true,
            confidentiality: false,
        },
    ),
    (
        3,
        CipherSuite {
            integrity: true,
            confidentiality: true,
        },
    ),
];

fn integrity_algorithm(suite: CipherSuite) -> u8 {
    if suite.integrity {
        INTEGRITY_HMAC_SHA1_96
    } else {
        INTEGRITY_NONE
    }
}

fn confidentiality_algorithm(suite: CipherSuite) -> u8 {
    if suite.confidentiality {
        CONFIDENTIALITY_AES_CBC_128
    } else {
        CONFIDENTIALITY_NONE
    }
}

/// Cipher suite records for Get Channel Cipher Suites
pub fn cipher_suite_records() -> Vec<u8> {
    CIPHER_SUITES
        .iter()
        .flat_map(|(id, suite)| {
            [
                0xC0,
                *id,
                AUTH_RAKP_HMAC_SHA1,
                0x40 | integrity_algorithm(*suite),
                0x80 | confidentiality_algorithm(*suite),
            ]
        })
        .collect()
}

fn u32_at(payload: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&payload[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

/// One algorithm proposal; `None` lets the BMC choose
fn proposal(record: &[u8]) -> Option<u8> {
    if record[3] == 0 {
        None
    } else {
        Some(record[4] & 0x3F)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSessionRequest {
    pub tag: u8,
    pub max_privilege: u8,
    pub console_id: u32,
    pub auth: Option<u8>,
    pub integrity: Option<u8>,
    pub confidentiality: Option<u8>,
}

impl OpenSessionRequest {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 32 {
            return None;
        }
        Some(Self {
            tag: payload[0],
            max_privilege: payload[1] & 0x0F,
            console_id: u32_at(payload, 4),
            auth: proposal(&payload[8..16]),
            integrity: proposal(&payload[16..24]),
            confidentiality: proposal(&payload[24..32]),
        })
    }

    /// Pick the algorithms, or the status code refusing them
    pub fn negotiate(&self) -> Result<CipherSuite, u8> {
        match self.auth {
            None | Some(AUTH_RAKP_HMAC_SHA1) => {}
            Some(_) => return Err(status::INVALID_AUTH_ALGORITHM),
        }
        let integrity = match self.integrity {
            None | Some(INTEGRITY_HMAC_SHA1_96) => true,
            Some(INTEGRITY_NONE) => false,
            Some(_) => return Err(status::INVALID_INTEGRITY_ALGORITHM),
        };
        let confidentiality = match self.confidentiality {
            None | Some(CONFIDENTIALITY_AES_CBC_128) => true,
            Some(CONFIDENTIALITY_NONE) => false,
            Some(_) => return Err(status::INVALID_CONFIDENTIALITY_ALGORITHM),
        };
        Ok(CipherSuite {
            integrity,
            confidentiality,
        })
    }

    pub fn accept(&self, bmc_id: u32, max_privilege: u8, suite: CipherSuite) -> Vec<u8> {
        let mut out = Vec::with_capacity(36);
        out.extend_from_slice(&[self.tag, status::NO_ERRORS, max_privilege, 0]);
        out.extend_from_slice(&self.console_id.to_le_bytes());
        out.extend_from_slice(&bmc_id.to_le_bytes());
        out.extend_from_slice(&[0x00, 0, 0, 0x08, AUTH_RAKP_HMAC_SHA1, 0, 0, 0]);
        out.extend_from_slice(&[0x01, 0, 0, 0x08, integrity_algorithm(suite), 0, 0, 0]);
        out.extend_from_slice(&[0x02, 0, 0, 0x08, confidentiality_algorithm(suite), 0, 0, 0]);
        out
    }

    pub fn reject(&self, status: u8) -> Vec<u8> {
        error_reply(self.tag, status, self.console_id)
    }
}

/// `tag | status | reserved (2) | console session id`, shared by every
/// refusing handshake reply
pub fn error_reply(tag: u8, status: u8, console_id: u32) -> Vec<u8> {
    let mut out = vec![tag, status, 0, 0];
    out.extend_from_slice(&console_id.to_le_bytes());
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rakp1 {
    pub tag: u8,
    pub bmc_id: u32,
    pub console_random: Random,
    pub role: u8,
    pub user: Vec<u8>,
}

impl Rakp1 {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 28 {
            return None;
        }
        let user_len = payload[27] as usize;
        if user_len > MAX_USER_LEN || payload.len() < 28 + user_len {
            return None;
        }
        let mut console_random = [0u8; RANDOM_LEN];
        console_random.copy_from_slice(&payload[8..24]);
        Some(Self {
            tag: payload[0],
            bmc_id: u32_at(payload, 4),
            console_random,
            role: payload[24],
            user: payload[28..28 + user_len].to_vec(),
        })
    }
}

pub fn rakp2(tag: u8, console_id: u32, bmc_random: &Random, guid: &Guid, auth_code: &[u8]) -> Vec<u8> {
    let mut out = error_reply(tag, status::NO_ERRORS, console_id);
    out.extend_from_slice(bmc_random);
    out.extend_from_slice(guid);
    out.extend_from_slice(auth_code);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rakp3 {
    pub tag: u8,
    pub status: u8,
    pub bmc_id: u32,
    pub auth_code: Vec<u8>,
}

impl Rakp3 {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 8 {
            return None;
        }
        Some(Self {
            tag: payload[0],
            status: payload[1],
            bmc_id: u32_at(payload, 4),
            auth_code: payload[8..].to_vec(),
        })
    }
}

pub fn rakp4(tag: u8, console_id: u32, check_value: &[u8; INTEGRITY_LEN]) -> Vec<u8> {
    let mut out = error_reply(tag, status::NO_ERRORS, console_id);
    out.extend_from_slice(check_value);
    out
}
