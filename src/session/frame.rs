//! Outbound framing for both session flavours

use super::manager::SessionError;
use super::rakp::SessionKeys;
use bmc_shared::codec::{self, payload, LanMessage, RmcpPlusHeader, SessionHeader, RMCP_HEADER_LEN};
use bmc_shared::Response;

/// How to frame a reply to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyFrame {
    /// IPMI v1.5 session header
    Lan(SessionHeader),
    /// RMCP+ IPMI payload; `session_id` is the console's id
    RmcpPlus {
        session_id: u32,
        sequence: u32,
        keys: Option<SessionKeys>,
    },
}

impl ReplyFrame {
    /// Pre-session RMCP+ reply
    pub fn session_less() -> Self {
        ReplyFrame::RmcpPlus {
            session_id: 0,
            sequence: 0,
            keys: None,
        }
    }

    /// Encode the datagram answering `request` with `response`
    pub fn encode(&self, request: &LanMessage, response: &Response) -> Result<Vec<u8>, SessionError> {
        match self {
            ReplyFrame::Lan(header) => {
                Ok(codec::encode_response(header, request, response.completion, &response.data)?.to_vec())
            }
            ReplyFrame::RmcpPlus {
                session_id,
                sequence,
                keys,
            } => {
                let message = codec::encode_response_message(request, response.completion, &response.data);
                seal(*session_id, *sequence, keys.as_ref(), &message)
            }
        }
    }
}

/// Frame `plain` as an RMCP+ IPMI payload, encrypted and signed as the
/// session keys require
pub fn seal(session_id: u32, sequence: u32, keys: Option<&SessionKeys>, plain: &[u8]) -> Result<Vec<u8>, SessionError> {
    let header = RmcpPlusHeader {
        payload_type: payload::IPMI,
        encrypted: keys.is_some_and(|k| k.confidentiality),
        authenticated: keys.is_some_and(|k| k.integrity),
        session_id,
        sequence,
    };

    let body = match keys {
        Some(keys) if keys.confidentiality => keys.encrypt(plain)?,
        _ => plain.to_vec(),
    };
    let mut buf = codec::encode_rmcp_plus(&header, &body)?;
    if let Some(keys) = keys.filter(|k| k.integrity) {
        let auth_code = keys.sign(&buf[RMCP_HEADER_LEN..])?;
        buf.extend_from_slice(&auth_code);
    }
    Ok(buf.to_vec())
}

/// Frame one Open Session or RAKP reply
pub fn encode_handshake(payload_type: u8, body: &[u8]) -> Result<Vec<u8>, SessionError> {
    Ok(codec::encode_rmcp_plus(&RmcpPlusHeader::session_less(payload_type), body)?.to_vec())
}
