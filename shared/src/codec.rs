//! IPMI-over-LAN datagram codec (v1.5 sessions and v2.0 RMCP+ framing)
//!
//! Every datagram starts with an RMCP header. IPMI v1.5 packets carry a
//! session header and one LAN message:
//! ```text
//! [ 06 00 FF 07 ][ auth type | seq (u32 LE) | session id (u32 LE) | auth code? (16) | len ]
//! [ rsSA | netFn/rsLUN | chk1 | rqSA | rqSeq/rqLUN | cmd | data... | chk2 ]
//! ```
//! RMCP+ packets (auth type 0x06) carry a typed payload and, when
//! authenticated, an integrity trailer:
//! ```text
//! [ 06 00 FF 07 ][ 06 | E A type | session id (u32 LE) | seq (u32 LE) | len (u16 LE) ]
//! [ payload... ][ FF pad | pad len | 07 | auth code ]
//! ```
//! Keys live with the session, so this codec only frames: decryption and
//! auth code checks happen in the caller.
//!
//! ASF class packets are only decoded far enough to answer presence pings.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::CompletionCode;

pub const RMCP_VERSION: u8 = 0x06;
/// RMCP sequence number meaning "no RMCP ACK wanted"
pub const RMCP_NO_ACK: u8 = 0xFF;
pub const RMCP_CLASS_ASF: u8 = 0x06;
pub const RMCP_CLASS_IPMI: u8 = 0x07;

/// ASF IANA enterprise number
pub const ASF_IANA: u32 = 4542;
const ASF_PRESENCE_PING: u8 = 0x80;
const ASF_PRESENCE_PONG: u8 = 0x40;
/// Pong "supported entities": IPMI supported, ASF version 1.0
const ASF_SUPPORTS_IPMI: u8 = 0x81;

pub const RMCP_HEADER_LEN: usize = 4;

/// Auth type value announcing an IPMI v2.0 / RMCP+ session header
pub const AUTH_TYPE_RMCP_PLUS: u8 = 0x06;

/// Auth type through payload length of an RMCP+ session header
const RMCP_PLUS_HEADER_LEN: usize = 12;
const RMCP_PLUS_INTEGRITY_PAD: u8 = 0xFF;
const RMCP_PLUS_NEXT_HEADER: u8 = 0x07;

/// RMCP+ payload types
pub mod payload {
    pub const IPMI: u8 = 0x00;
    pub const OPEN_SESSION_REQUEST: u8 = 0x10;
    pub const OPEN_SESSION_RESPONSE: u8 = 0x11;
    pub const RAKP_1: u8 = 0x12;
    pub const RAKP_2: u8 = 0x13;
    pub const RAKP_3: u8 = 0x14;
    pub const RAKP_4: u8 = 0x15;
}

pub const AUTH_CODE_LEN: usize = 16;

/// Slave address of the BMC on the IPMB
pub const BMC_ADDRESS: u8 = 0x20;

/// Receive buffer size; LAN packets are far smaller
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Smallest LAN message: six header bytes plus the trailing checksum
const MIN_MESSAGE_LEN: usize = 7;

pub type AuthCode = [u8; AUTH_CODE_LEN];

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Not enough data: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unsupported RMCP header: version={version:#04x} class={class:#04x}")]
    UnsupportedRmcp { version: u8, class: u8 },

    #[error("Unsupported ASF message type: {0:#04x}")]
    UnsupportedAsf(u8),

    #[error("Unsupported authentication type: {0:#04x}")]
    UnsupportedAuthType(u8),

    #[error("Bad {0} checksum")]
    Checksum(&'static str),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Malformed RMCP+ integrity trailer")]
    IntegrityTrailer,
}

/// Session authentication types understood by this codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    None,
    /// Straight password key: the auth code is the padded password
    Password,
}

impl AuthType {
    /// Bit for this type in the Get Channel Authentication Capabilities map
    pub fn support_bit(self) -> u8 {
        1 << self.code()
    }

    pub fn code(self) -> u8 {
        match self {
            AuthType::None => 0x00,
            AuthType::Password => 0x04,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, CodecError> {
        match code {
            0x00 => Ok(AuthType::None),
            0x04 => Ok(AuthType::Password),
            other => Err(CodecError::UnsupportedAuthType(other)),
        }
    }
}

/// Null-pad (or truncate) a username or password to the 16-byte field size
pub fn pad16(bytes: &[u8]) -> AuthCode {
    let mut out = [0u8; AUTH_CODE_LEN];
    let len = bytes.len().min(AUTH_CODE_LEN);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

/// IPMI 1.5 session header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeader {
    pub auth_type: AuthType,
    pub sequence: u32,
    pub session_id: u32,
    /// Present whenever `auth_type` is not `None`
    pub auth_code: Option<AuthCode>,
}

impl SessionHeader {
    /// Header for session-less traffic (auth type none, session 0)
    pub fn unauthenticated() -> Self {
        Self {
            auth_type: AuthType::None,
            sequence: 0,
            session_id: 0,
            auth_code: None,
        }
    }

    /// Header authenticated with a straight password
    pub fn password(sequence: u32, session_id: u32, auth_code: AuthCode) -> Self {
        Self {
            auth_type: AuthType::Password,
            sequence,
            session_id,
            auth_code: Some(auth_code),
        }
    }
}

/// One IPMI LAN message, request or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanMessage {
    pub rs_addr: u8,
    pub net_fn: u8,
    pub rs_lun: u8,
    pub rq_addr: u8,
    pub rq_seq: u8,
    pub rq_lun: u8,
    pub command: u8,
    pub data: Bytes,
}

impl LanMessage {
    /// Request from a remote console (software id 0x81) to the BMC
    pub fn request(net_fn: u8, command: u8, rq_seq: u8, data: impl Into<Bytes>) -> Self {
        Self {
            rs_addr: BMC_ADDRESS,
            net_fn,
            rs_lun: 0,
            rq_addr: 0x81,
            rq_seq,
            rq_lun: 0,
            command,
            data: data.into(),
        }
    }
}

/// IPMI v2.0 session header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmcpPlusHeader {
    pub payload_type: u8,
    pub encrypted: bool,
    pub authenticated: bool,
    pub session_id: u32,
    pub sequence: u32,
}

impl RmcpPlusHeader {
    /// Header for handshake and pre-session traffic
    pub fn session_less(payload_type: u8) -> Self {
        Self {
            payload_type,
            encrypted: false,
            authenticated: false,
            session_id: 0,
            sequence: 0,
        }
    }

    fn type_byte(&self) -> u8 {
        let mut byte = self.payload_type & 0x3F;
        if self.encrypted {
            byte |= 0x80;
        }
        if self.authenticated {
            byte |= 0x40;
        }
        byte
    }
}

/// A framed RMCP+ packet, payload still encrypted if it was sent that way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RmcpPlusFrame {
    pub header: RmcpPlusHeader,
    pub payload: Bytes,
    /// Bytes covered by the auth code: auth type through next header
    pub signed: Bytes,
    /// Empty unless the packet is authenticated
    pub auth_code: Bytes,
}

/// A decoded datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// ASF presence ping, answered with a pong carrying the same tag
    Ping { tag: u8 },
    Ipmi {
        header: SessionHeader,
        message: LanMessage,
    },
    RmcpPlus(RmcpPlusFrame),
}

/// Two's complement checksum: bytes plus checksum sum to zero
pub fn checksum(bytes: &[u8]) -> u8 {
    0u8.wrapping_sub(bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)))
}

fn ensure(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        return Err(CodecError::Truncated {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

/// Decode one datagram
pub fn decode(datagram: &[u8]) -> Result<Packet, CodecError> {
    let mut buf = datagram;
    ensure(buf, 4)?;

    let version = buf.get_u8();
    let _reserved = buf.get_u8();
    let _rmcp_seq = buf.get_u8();
    let class = buf.get_u8() & 0x1F;

    match (version, class) {
        (RMCP_VERSION, RMCP_CLASS_ASF) => decode_asf(buf),
        (RMCP_VERSION, RMCP_CLASS_IPMI) if buf.first() == Some(&AUTH_TYPE_RMCP_PLUS) => {
            decode_rmcp_plus(datagram)
        }
        (RMCP_VERSION, RMCP_CLASS_IPMI) => decode_ipmi(buf),
        _ => Err(CodecError::UnsupportedRmcp { version, class }),
    }
}

fn decode_asf(mut buf: &[u8]) -> Result<Packet, CodecError> {
    ensure(buf, 8)?;
    let iana = buf.get_u32();
    let msg_type = buf.get_u8();
    let tag = buf.get_u8();

    if iana != ASF_IANA || msg_type != ASF_PRESENCE_PING {
        return Err(CodecError::UnsupportedAsf(msg_type));
    }
    Ok(Packet::Ping { tag })
}

fn decode_ipmi(mut buf: &[u8]) -> Result<Packet, CodecError> {
    ensure(buf, 1)?;
    let auth_type = AuthType::from_code(buf.get_u8())?;

    ensure(buf, 8)?;
    let sequence = buf.get_u32_le();
    let session_id = buf.get_u32_le();

    let auth_code = match auth_type {
        AuthType::None => None,
        _ => {
            ensure(buf, AUTH_CODE_LEN)?;
            let mut code = [0u8; AUTH_CODE_LEN];
            buf.copy_to_slice(&mut code);
            Some(code)
        }
    };

    ensure(buf, 1)?;
    let msg_len = buf.get_u8() as usize;
    ensure(buf, msg_len)?;

    let message = decode_message(&buf[..msg_len])?;
    Ok(Packet::Ipmi {
        header: SessionHeader {
            auth_type,
            sequence,
            session_id,
            auth_code,
        },
        message,
    })
}

/// Integrity pad that aligns auth type through next header to 4 bytes
fn integrity_pad_len(payload_len: usize) -> usize {
    (4 - (RMCP_PLUS_HEADER_LEN + payload_len + 2) % 4) % 4
}

fn decode_rmcp_plus(datagram: &[u8]) -> Result<Packet, CodecError> {
    let mut buf = &datagram[RMCP_HEADER_LEN..];
    ensure(buf, RMCP_PLUS_HEADER_LEN)?;
    let _auth_type = buf.get_u8();
    let type_byte = buf.get_u8();
    let session_id = buf.get_u32_le();
    let sequence = buf.get_u32_le();
    let len = buf.get_u16_le() as usize;
    ensure(buf, len)?;

    let header = RmcpPlusHeader {
        payload_type: type_byte & 0x3F,
        encrypted: type_byte & 0x80 != 0,
        authenticated: type_byte & 0x40 != 0,
        session_id,
        sequence,
    };
    let payload = Bytes::copy_from_slice(&buf[..len]);

    let (signed, auth_code) = if header.authenticated {
        let body_end = RMCP_HEADER_LEN + RMCP_PLUS_HEADER_LEN + len;
        let pad = integrity_pad_len(len);
        let trailer_end = body_end + pad + 2;
        ensure(datagram, trailer_end)?;
        if datagram[body_end + pad] as usize != pad || datagram[body_end + pad + 1] != RMCP_PLUS_NEXT_HEADER {
            return Err(CodecError::IntegrityTrailer);
        }
        (
            Bytes::copy_from_slice(&datagram[RMCP_HEADER_LEN..trailer_end]),
            Bytes::copy_from_slice(&datagram[trailer_end..]),
        )
    } else {
        (Bytes::new(), Bytes::new())
    };

    Ok(Packet::RmcpPlus(RmcpPlusFrame {
        header,
        payload,
        signed,
        auth_code,
    }))
}

/// Decode one LAN message (an IPMI payload), checking both checksums
pub fn decode_message(body: &[u8]) -> Result<LanMessage, CodecError> {
    ensure(body, MIN_MESSAGE_LEN)?;
    let last = body.len() - 1;

    if checksum(&body[..2]) != body[2] {
        return Err(CodecError::Checksum("header"));
    }
    if checksum(&body[3..last]) != body[last] {
        return Err(CodecError::Checksum("data"));
    }

    Ok(LanMessage {
        rs_addr: body[0],
        net_fn: body[1] >> 2,
        rs_lun: body[1] & 0x03,
        rq_addr: body[3],
        rq_seq: body[4] >> 2,
        rq_lun: body[4] & 0x03,
        command: body[5],
        data: Bytes::copy_from_slice(&body[6..last]),
    })
}

fn put_rmcp_header(buf: &mut BytesMut, class: u8) {
    buf.put_u8(RMCP_VERSION);
    buf.put_u8(0x00);
    buf.put_u8(RMCP_NO_ACK);
    buf.put_u8(class);
}

/// Wrap an encoded LAN message in RMCP and session headers
fn encode_ipmi(header: &SessionHeader, message: &[u8]) -> Result<Bytes, CodecError> {
    if message.len() > u8::MAX as usize {
        return Err(CodecError::MessageTooLarge(message.len()));
    }

    let mut buf = BytesMut::with_capacity(4 + 10 + AUTH_CODE_LEN + message.len());
    put_rmcp_header(&mut buf, RMCP_CLASS_IPMI);
    buf.put_u8(header.auth_type.code());
    buf.put_u32_le(header.sequence);
    buf.put_u32_le(header.session_id);
    if header.auth_type != AuthType::None {
        buf.put_slice(&header.auth_code.unwrap_or_default());
    }
    buf.put_u8(message.len() as u8);
    buf.put_slice(message);

    Ok(buf.freeze())
}

/// Encode a request datagram (remote console side)
pub fn encode_request(header: &SessionHeader, message: &LanMessage) -> Result<Bytes, CodecError> {
    encode_ipmi(header, &encode_request_message(message))
}

/// Encode a request LAN message without any session framing
pub fn encode_request_message(message: &LanMessage) -> Bytes {
    let mut msg = BytesMut::with_capacity(MIN_MESSAGE_LEN + message.data.len());
    msg.put_u8(message.rs_addr);
    msg.put_u8((message.net_fn << 2) | (message.rs_lun & 0x03));
    msg.put_u8(checksum(&msg[..2]));
    msg.put_u8(message.rq_addr);
    msg.put_u8((message.rq_seq << 2) | (message.rq_lun & 0x03));
    msg.put_u8(message.command);
    msg.put_slice(&message.data);
    let chk = checksum(&msg[3..]);
    msg.put_u8(chk);

    msg.freeze()
}

/// Encode the response to `request` under a v1.5 session header
pub fn encode_response(
    header: &SessionHeader,
    request: &LanMessage,
    completion: CompletionCode,
    data: &[u8],
) -> Result<Bytes, CodecError> {
    encode_ipmi(header, &encode_response_message(request, completion, data))
}

/// Encode the LAN message answering `request`: addresses swapped, odd
/// (response) network function, completion code ahead of the data
pub fn encode_response_message(request: &LanMessage, completion: CompletionCode, data: &[u8]) -> Bytes {
    let mut msg = BytesMut::with_capacity(MIN_MESSAGE_LEN + 1 + data.len());
    msg.put_u8(request.rq_addr);
    msg.put_u8(((request.net_fn | 0x01) << 2) | (request.rq_lun & 0x03));
    msg.put_u8(checksum(&msg[..2]));
    msg.put_u8(request.rs_addr);
    msg.put_u8((request.rq_seq << 2) | (request.rs_lun & 0x03));
    msg.put_u8(request.command);
    msg.put_u8(completion.0);
    msg.put_slice(data);
    let chk = checksum(&msg[3..]);
    msg.put_u8(chk);

    msg.freeze()
}

/// Frame an RMCP+ packet around an already encrypted (or plain) payload.
///
/// For authenticated headers the integrity pad, pad length and next header
/// are written too; the caller appends the auth code computed over
/// everything after the RMCP header.
pub fn encode_rmcp_plus(header: &RmcpPlusHeader, payload: &[u8]) -> Result<BytesMut, CodecError> {
    if payload.len() > u16::MAX as usize {
        return Err(CodecError::MessageTooLarge(payload.len()));
    }

    let pad = integrity_pad_len(payload.len());
    let mut buf = BytesMut::with_capacity(RMCP_HEADER_LEN + RMCP_PLUS_HEADER_LEN + payload.len() + pad + 2 + 20);
    put_rmcp_header(&mut buf, RMCP_CLASS_IPMI);
    buf.put_u8(AUTH_TYPE_RMCP_PLUS);
    buf.put_u8(header.type_byte());
    buf.put_u32_le(header.session_id);
    buf.put_u32_le(header.sequence);
    buf.put_u16_le(payload.len() as u16);
    buf.put_slice(payload);
    if header.authenticated {
        buf.put_bytes(RMCP_PLUS_INTEGRITY_PAD, pad);
        buf.put_u8(pad as u8);
        buf.put_u8(RMCP_PLUS_NEXT_HEADER);
    }
    Ok(buf)
}

/// Encode an ASF presence ping (remote console side)
pub fn encode_ping(tag: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(12);
    put_rmcp_header(&mut buf, RMCP_CLASS_ASF);
    buf.put_u32(ASF_IANA);
    buf.put_u8(ASF_PRESENCE_PING);
    buf.put_u8(tag);
    buf.put_u8(0x00);
    buf.put_u8(0x00);
    buf.freeze()
}

/// Encode the presence pong answering a ping with `tag`
pub fn encode_pong(tag: u8) -> Bytes {
    let mut buf = BytesMut::with_capacity(28);
    put_rmcp_header(&mut buf, RMCP_CLASS_ASF);
    buf.put_u32(ASF_IANA);
    buf.put_u8(ASF_PRESENCE_PONG);
    buf.put_u8(tag);
    buf.put_u8(0x00);
    buf.put_u8(16);
    buf.put_u32(ASF_IANA);
    buf.put_u32(0);
    buf.put_u8(ASF_SUPPORTS_IPMI);
    buf.put_u8(0x00);
    buf.put_bytes(0, 6);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cmd, netfn};

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[0x20, 0x18]), 0xC8);
        assert_eq!(checksum(&[]), 0);
        let bytes = [0x81, 0x04, 0x38, 0x0E, 0x04];
        let sum = bytes
            .iter()
            .fold(checksum(&bytes), |acc, b| acc.wrapping_add(*b));
        assert_eq!(sum, 0);
    }

    #[test]
    fn test_decode_known_auth_capabilities_request() {
        // Get Channel Authentication Capabilities as sent by ipmitool -I lan
        let datagram = [
            0x06, 0x00, 0xFF, 0x07, // RMCP
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x09, // session
            0x20, 0x18, 0xC8, 0x81, 0x00, 0x38, 0x0E, 0x04, 0x35, // message
        ];

        let packet = decode(&datagram).expect("decode failed");
        let Packet::Ipmi { header, message } = packet else {
            panic!("expected an IPMI packet");
        };
        assert_eq!(header, SessionHeader::unauthenticated());
        assert_eq!(message.net_fn, netfn::APP);
        assert_eq!(message.command, cmd::GET_CHANNEL_AUTH_CAPABILITIES);
        assert_eq!(message.rq_addr, 0x81);
        assert_eq!(&message.data[..], &[0x0E, 0x04]);
    }

    #[test]
    fn test_request_with_password_header_decodes() {
        let header = SessionHeader::password(7, 0xDEAD_BEEF, pad16(b"secret"));
        let message = LanMessage::request(netfn::CHASSIS, cmd::CHASSIS_CONTROL, 3, vec![0x01]);
        let encoded = encode_request(&header, &message).expect("encode failed");

        let packet = decode(&encoded).expect("decode failed");
        assert_eq!(packet, Packet::Ipmi { header, message });
    }

    #[test]
    fn test_response_layout() {
        let request = LanMessage::request(netfn::CHASSIS, cmd::GET_CHASSIS_STATUS, 5, Bytes::new());
        let encoded = encode_response(
            &SessionHeader::unauthenticated(),
            &request,
            CompletionCode::SUCCESS,
            &[1, 0, 0],
        )
        .expect("encode failed");

        // RMCP(4) + session(10) then the message
        let body = &encoded[14..];
        assert_eq!(encoded[13] as usize, body.len());
        assert_eq!(body[0], 0x81);
        assert_eq!(body[1], (netfn::CHASSIS | 1) << 2);
        assert_eq!(body[3], BMC_ADDRESS);
        assert_eq!(body[4], 5 << 2);
        assert_eq!(body[5], cmd::GET_CHASSIS_STATUS);
        assert_eq!(&body[6..10], &[0x00, 1, 0, 0]);
        assert_eq!(checksum(&body[..2]), body[2]);
        assert_eq!(checksum(&body[3..body.len() - 1]), body[body.len() - 1]);
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let message = LanMessage::request(netfn::APP, cmd::GET_DEVICE_ID, 1, Bytes::new());
        let encoded = encode_request(&SessionHeader::unauthenticated(), &message).expect("encode failed");

        let mut corrupted = encoded.to_vec();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xFF;
        assert_eq!(decode(&corrupted), Err(CodecError::Checksum("data")));
    }

    #[test]
    fn test_truncated_datagram() {
        let message = LanMessage::request(netfn::APP, cmd::GET_DEVICE_ID, 1, Bytes::new());
        let encoded = encode_request(&SessionHeader::unauthenticated(), &message).expect("encode failed");

        let result = decode(&encoded[..encoded.len() - 2]);
        assert!(matches!(result, Err(CodecError::Truncated { .. })));
        assert!(matches!(decode(&[0x06, 0x00]), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn test_decode_open_session_request() {
        // RMCP+ Open Session Request as sent by ipmitool -I lanplus -C 3
        let datagram = [
            0x06, 0x00, 0xFF, 0x07, // RMCP
            0x06, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00, // session
            0x00, 0x04, 0x00, 0x00, 0xA4, 0xA3, 0xA2, 0xA0, // tag, role, console id
            0x00, 0x00, 0x00, 0x08, 0x01, 0x00, 0x00, 0x00, // RAKP-HMAC-SHA1
            0x01, 0x00, 0x00, 0x08, 0x01, 0x00, 0x00, 0x00, // HMAC-SHA1-96
            0x02, 0x00, 0x00, 0x08, 0x01, 0x00, 0x00, 0x00, // AES-CBC-128
        ];

        let Packet::RmcpPlus(frame) = decode(&datagram).expect("decode failed") else {
            panic!("expected an RMCP+ packet");
        };
        assert_eq!(frame.header, RmcpPlusHeader::session_less(payload::OPEN_SESSION_REQUEST));
        assert_eq!(frame.payload.len(), 32);
        assert_eq!(&frame.payload[4..8], &[0xA4, 0xA3, 0xA2, 0xA0]);
        assert!(frame.auth_code.is_empty());
    }

    #[test]
    fn test_authenticated_rmcp_plus_trailer() {
        let header = RmcpPlusHeader {
            payload_type: payload::IPMI,
            encrypted: true,
            authenticated: true,
            session_id: 0x0102_0304,
            sequence: 9,
        };
        let body = [0xAA; 5];
        let mut encoded = encode_rmcp_plus(&header, &body).expect("encode failed");
        // 12 header + 5 payload + 1 pad + 2 = 20, a multiple of 4
        assert_eq!(encoded.len(), RMCP_HEADER_LEN + 20);
        assert_eq!(&encoded[encoded.len() - 3..], &[0xFF, 0x01, 0x07]);
        let signed_len = encoded.len() - RMCP_HEADER_LEN;
        encoded.put_slice(&[0x55; 12]);

        let Packet::RmcpPlus(frame) = decode(&encoded).expect("decode failed") else {
            panic!("expected an RMCP+ packet");
        };
        assert_eq!(frame.header, header);
        assert_eq!(&frame.payload[..], &body);
        assert_eq!(frame.signed.len(), signed_len);
        assert_eq!(&frame.signed[..], &encoded[RMCP_HEADER_LEN..RMCP_HEADER_LEN + signed_len]);
        assert_eq!(&frame.auth_code[..], &[0x55; 12]);
    }

    #[test]
    fn test_bad_integrity_trailer() {
        let header = RmcpPlusHeader {
            authenticated: true,
            ..RmcpPlusHeader::session_less(payload::IPMI)
        };
        let mut encoded = encode_rmcp_plus(&header, &[1, 2]).expect("encode failed").to_vec();
        let last = encoded.len() - 1;
        encoded[last] = 0x00;
        assert_eq!(decode(&encoded), Err(CodecError::IntegrityTrailer));
    }

    #[test]
    fn test_unauthenticated_rmcp_plus_has_no_trailer() {
        let header = RmcpPlusHeader::session_less(payload::RAKP_2);
        let encoded = encode_rmcp_plus(&header, &[0u8; 40]).expect("encode failed");
        assert_eq!(encoded.len(), RMCP_HEADER_LEN + RMCP_PLUS_HEADER_LEN + 40);
        assert_eq!(encoded[5], payload::RAKP_2);
    }

    #[test]
    fn test_presence_ping_pong() {
        let ping = encode_ping(0x2A);
        assert_eq!(decode(&ping), Ok(Packet::Ping { tag: 0x2A }));

        let pong = encode_pong(0x2A);
        assert_eq!(pong.len(), 28);
        assert_eq!(&pong[..4], &[0x06, 0x00, 0xFF, 0x06]);
        assert_eq!(pong[8], 0x40);
        assert_eq!(pong[9], 0x2A);
        assert_eq!(pong[20], 0x81);
        // a pong is not something we answer
        assert_eq!(decode(&pong), Err(CodecError::UnsupportedAsf(0x40)));
    }

    #[test]
    fn test_pad16() {
        let padded = pad16(b"admin");
        assert_eq!(&padded[..5], b"admin");
        assert!(padded[5..].iter().all(|b| *b == 0));
        assert_eq!(pad16(&[b'x'; 20]), [b'x'; 16]);
    }

    #[test]
    fn test_message_too_large() {
        let message = LanMessage::request(netfn::APP, cmd::GET_DEVICE_ID, 1, vec![0u8; 300]);
        let result = encode_request(&SessionHeader::unauthenticated(), &message);
        assert!(matches!(result, Err(CodecError::MessageTooLarge(_))));
    }
}
