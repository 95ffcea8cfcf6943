//! Session manager for IPMI 1.5 and RMCP+ LAN logins

use super::frame::{self, ReplyFrame};
use super::rakp::{self, CipherSuite, CryptoError, Guid, Handshake, SessionKeys, USER_KEY_LEN};
use super::rmcp_plus::{self, status, OpenSessionRequest, Rakp1, Rakp3};
use crate::config::Credentials;
use bmc_shared::codec::{
    self, pad16, payload, AuthCode, AuthType, CodecError, LanMessage, RmcpPlusFrame, SessionHeader, AUTH_CODE_LEN,
};
use bmc_shared::{cmd, netfn, privilege, CompletionCode, Response};
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

/// Sessions idle for longer than this are closed
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum number of active sessions
pub const MAX_SESSIONS: usize = 8;

/// Pending logins kept before the oldest is evicted
const MAX_PENDING_LOGINS: usize = 32;

/// Reasons a message is dropped without a reply
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("netfn={net_fn:#04x} command={command:#04x} sent outside a session")]
    NotAuthenticated { net_fn: u8, command: u8 },

    #[error("unknown session id {0:#010x}")]
    UnknownSession(u32),

    #[error("bad auth code for session {0:#010x}")]
    BadAuthCode(u32),

    #[error("challenge mismatch for session {0:#010x}")]
    ChallengeMismatch(u32),

    #[error("malformed RMCP+ payload of type {0:#04x}")]
    MalformedHandshake(u8),

    #[error("console aborted the RMCP+ handshake with status {0:#04x}")]
    HandshakeAborted(u8),

    #[error("encryption flag does not match session {0:#010x}")]
    EncryptionMismatch(u32),

    #[error("unsupported RMCP+ payload type {0:#04x}")]
    UnsupportedPayload(u8),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// What the shell should do with an incoming message
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Session traffic answered by the session layer itself
    Reply {
        frame: ReplyFrame,
        message: LanMessage,
        response: Response,
    },
    /// Authenticated request for the command dispatcher
    Dispatch { frame: ReplyFrame, message: LanMessage },
    /// Ready-made RMCP+ handshake datagram
    Send(Vec<u8>),
    Drop(SessionError),
}

#[derive(Debug)]
enum SessionState {
    /// v1.5: challenge sent, waiting for Activate Session
    Challenged { challenge: AuthCode },
    /// v1.5 session
    Active,
    /// RMCP+: Open Session answered, waiting for RAKP 1
    Opened { console_id: u32, suite: CipherSuite },
    /// RMCP+: RAKP 2 sent, waiting for RAKP 3
    Authenticating { suite: CipherSuite, handshake: Handshake },
    /// RMCP+ session
    Established { console_id: u32, keys: SessionKeys },
}

impl SessionState {
    fn is_active(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Established { .. })
    }
}

#[derive(Debug)]
struct Session {
    peer: SocketAddr,
    state: SessionState,
    privilege: u8,
    max_privilege: u8,
    outbound_seq: u32,
    last_activity: Instant,
}

/// Tracks pending logins and active sessions
pub struct SessionManager {
    user: Vec<u8>,
    lan_user: AuthCode,
    /// `None` when the password does not fit the v1.5 auth code field
    lan_password: Option<AuthCode>,
    user_key: [u8; USER_KEY_LEN],
    guid: Guid,
    sessions: HashMap<u32, Session>,
}

impl SessionManager {
    pub fn new(credentials: &Credentials) -> Self {
        let password = credentials.password.as_bytes();
        Self {
            user: credentials.user.as_bytes().to_vec(),
            lan_user: pad16(credentials.user.as_bytes()),
            lan_password: (password.len() <= AUTH_CODE_LEN).then(|| pad16(password)),
            user_key: rakp::user_key(password),
            guid: rakp::random(),
            sessions: HashMap::new(),
        }
    }

    /// Number of activated sessions
    pub fn active_count(&self) -> usize {
        self.sessions.values().filter(|s| s.state.is_active()).count()
    }

    fn pending_count(&self) -> usize {
        self.sessions.len() - self.active_count()
    }

    /// Decide how to answer one decoded v1.5 message
    pub fn handle(
        &mut self,
        peer: SocketAddr,
        header: &SessionHeader,
        message: &LanMessage,
        now: Instant,
    ) -> Disposition {
        if header.session_id == 0 {
            let frame = ReplyFrame::Lan(SessionHeader::unauthenticated());
            let response = match (message.net_fn, message.command) {
                (netfn::APP, cmd::GET_CHANNEL_AUTH_CAPABILITIES) => self.auth_capabilities(message),
                (netfn::APP, cmd::GET_CHANNEL_CIPHER_SUITES) => cipher_suites(message),
                (netfn::APP, cmd::GET_SESSION_CHALLENGE) => self.challenge(peer, message, now),
                (net_fn, command) => return Disposition::Drop(SessionError::NotAuthenticated { net_fn, command }),
            };
            return Disposition::Reply {
                frame,
                message: message.clone(),
                response,
            };
        }

        if (message.net_fn, message.command) == (netfn::APP, cmd::ACTIVATE_SESSION) {
            self.activate(header, message, now)
        } else {
            self.in_session(header, message, now)
        }
    }

    /// Decide how to answer one RMCP+ packet
    pub fn handle_rmcp_plus(&mut self, peer: SocketAddr, frame: &RmcpPlusFrame, now: Instant) -> Disposition {
        let result = match frame.header.payload_type {
            payload::OPEN_SESSION_REQUEST => self.open_session(peer, &frame.payload, now),
            payload::RAKP_1 => self.rakp1(&frame.payload, now),
            payload::RAKP_3 => self.rakp3(&frame.payload, now),
            payload::IPMI if frame.header.session_id == 0 => self.session_less(frame),
            payload::IPMI => self.rmcp_plus_session(frame, now),
            other => Err(SessionError::UnsupportedPayload(other)),
        };
        result.unwrap_or_else(Disposition::Drop)
    }

    /// Close sessions idle past the timeout, returning their ids
    pub fn expire_idle(&mut self, now: Instant) -> Vec<u32> {
        let expired: Vec<u32> = self
            .sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_activity) > SESSION_IDLE_TIMEOUT)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(session) = self.sessions.remove(id) {
                if session.state.is_active() {
                    info!("{}: Session {:#010x} expired", session.peer, id);
                }
            }
        }
        expired
    }

    fn authenticated(&self, header: &SessionHeader) -> bool {
        header.auth_type == AuthType::Password && self.lan_password.is_some() && header.auth_code == self.lan_password
    }

    /// Get Channel Authentication Capabilities. Straight password is
    /// offered when the password fits; bit 7 of the channel byte asks
    /// for the IPMI v2.0 extended capabilities too.
    fn auth_capabilities(&self, message: &LanMessage) -> Response {
        let Some(&channel) = message.data.first() else {
            return Response::completion(CompletionCode::REQUEST_DATA_LENGTH_INVALID);
        };
        let password = self.lan_password.is_some();

        let mut auth_types = if password {
            AuthType::Password.support_bit()
        } else {
            0x00
        };
        let mut extended = 0x00;
        if channel & 0x80 != 0 {
            auth_types |= 0x80;
            extended = 0x02 | u8::from(password);
        }

        // 0x0E means "this channel"
        let channel = match channel & 0x0F {
            0x0E => 0x01,
            other => other,
        };
        Response::with_data(vec![
            channel,
            auth_types,
            0x04, // non-null user names enabled
            extended,
            0x00,
            0x00,
            0x00,
            0x00,
        ])
    }

    fn challenge(&mut self, peer: SocketAddr, message: &LanMessage, now: Instant) -> Response {
        let data = &message.data;
        if data.len() < 1 + AUTH_CODE_LEN {
            return Response::completion(CompletionCode::REQUEST_DATA_LENGTH_INVALID);
        }
        if self.lan_password.is_none() || AuthType::from_code(data[0]) != Ok(AuthType::Password) {
            return Response::completion(CompletionCode::INVALID_DATA_FIELD);
        }
        if data[1..1 + AUTH_CODE_LEN] != self.lan_user {
            return Response::completion(CompletionCode::INVALID_USER_NAME);
        }

        if self.pending_count() >= MAX_PENDING_LOGINS {
            self.evict_oldest_pending();
        }

        let mut rng = rand::thread_rng();
        let mut challenge = [0u8; AUTH_CODE_LEN];
        rng.fill_bytes(&mut challenge);
        let id = self.new_session_id(&mut rng);

        self.sessions.insert(
            id,
            Session {
                peer,
                state: SessionState::Challenged { challenge },
                privilege: privilege::USER,
                max_privilege: privilege::USER,
                outbound_seq: 0,
                last_activity: now,
            },
        );

        let mut out = Vec::with_capacity(4 + AUTH_CODE_LEN);
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&challenge);
        Response::with_data(out)
    }

    fn activate(&mut self, header: &SessionHeader, message: &LanMessage, now: Instant) -> Disposition {
        let id = header.session_id;
        let Some(SessionState::Challenged { challenge }) = self.sessions.get(&id).map(|s| &s.state) else {
            return Disposition::Drop(SessionError::UnknownSession(id));
        };
        let challenge = *challenge;
        let (true, Some(password)) = (self.authenticated(header), self.lan_password) else {
            return Disposition::Drop(SessionError::BadAuthCode(id));
        };

        let frame = ReplyFrame::Lan(SessionHeader::password(0, id, password));
        let reply = |response| Disposition::Reply {
            frame: frame.clone(),
            message: message.clone(),
            response,
        };

        let data = &message.data;
        if data.len() < 2 + AUTH_CODE_LEN + 4 {
            return reply(Response::completion(CompletionCode::REQUEST_DATA_LENGTH_INVALID));
        }
        if data[2..2 + AUTH_CODE_LEN] != challenge {
            return Disposition::Drop(SessionError::ChallengeMismatch(id));
        }
        if self.active_count() >= MAX_SESSIONS {
            self.sessions.remove(&id);
            return reply(Response::completion(CompletionCode::NO_SESSION_SLOT));
        }

        let max_privilege = (data[1] & 0x0F).clamp(privilege::CALLBACK, privilege::ADMINISTRATOR);
        let mut seq = [0u8; 4];
        seq.copy_from_slice(&data[2 + AUTH_CODE_LEN..2 + AUTH_CODE_LEN + 4]);
        let outbound_seq = u32::from_le_bytes(seq);
        // Console sequence numbers are not checked, so any start will do
        let inbound_seq = rand::thread_rng().gen_range(1..=u32::MAX);

        let Some(session) = self.sessions.get_mut(&id) else {
            return Disposition::Drop(SessionError::UnknownSession(id));
        };
        session.state = SessionState::Active;
        session.max_privilege = max_privilege;
        session.privilege = privilege::USER.min(max_privilege);
        session.outbound_seq = outbound_seq;
        session.last_activity = now;
        info!("{}: Session {:#010x} activated", session.peer, id);

        let mut out = Vec::with_capacity(10);
        out.push(AuthType::Password.code());
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&inbound_seq.to_le_bytes());
        out.push(max_privilege);
        reply(Response::with_data(out))
    }

    fn in_session(&mut self, header: &SessionHeader, message: &LanMessage, now: Instant) -> Disposition {
        let id = header.session_id;
        let authenticated = self.authenticated(header);

        let session = match self.sessions.get_mut(&id) {
            Some(session) if matches!(session.state, SessionState::Active) => session,
            _ => return Disposition::Drop(SessionError::UnknownSession(id)),
        };
        let (true, Some(password)) = (authenticated, self.lan_password) else {
            return Disposition::Drop(SessionError::BadAuthCode(id));
        };

        session.last_activity = now;
        let frame = ReplyFrame::Lan(SessionHeader::password(session.outbound_seq, id, password));
        session.outbound_seq = session.outbound_seq.wrapping_add(1);

        self.session_command(id, frame, message.clone())
    }

    fn open_session(&mut self, peer: SocketAddr, body: &[u8], now: Instant) -> Result<Disposition, SessionError> {
        let request =
            OpenSessionRequest::parse(body).ok_or(SessionError::MalformedHandshake(payload::OPEN_SESSION_REQUEST))?;
        let suite = match request.negotiate() {
            Ok(suite) => suite,
            Err(status) => return handshake_reply(payload::OPEN_SESSION_RESPONSE, request.reject(status)),
        };
        if self.active_count() >= MAX_SESSIONS {
            return handshake_reply(
                payload::OPEN_SESSION_RESPONSE,
                request.reject(status::INSUFFICIENT_RESOURCES),
            );
        }
        if self.pending_count() >= MAX_PENDING_LOGINS {
            self.evict_oldest_pending();
        }

        // 0 asks for the highest level available
        let max_privilege = match request.max_privilege {
            0 => privilege::ADMINISTRATOR,
            level => level.min(privilege::ADMINISTRATOR),
        };
        let id = self.new_session_id(&mut rand::thread_rng());
        self.sessions.insert(
            id,
            Session {
                peer,
                state: SessionState::Opened {
                    console_id: request.console_id,
                    suite,
                },
                privilege: privilege::USER.min(max_privilege),
                max_privilege,
                outbound_seq: 1,
                last_activity: now,
            },
        );

        handshake_reply(
            payload::OPEN_SESSION_RESPONSE,
            request.accept(id, max_privilege, suite),
        )
    }

    fn rakp1(&mut self, body: &[u8], now: Instant) -> Result<Disposition, SessionError> {
        let rakp1 = Rakp1::parse(body).ok_or(SessionError::MalformedHandshake(payload::RAKP_1))?;
        let refuse = |status, console_id| {
            handshake_reply(payload::RAKP_2, rmcp_plus::error_reply(rakp1.tag, status, console_id))
        };

        let (console_id, suite, max_privilege) = match self.sessions.get(&rakp1.bmc_id) {
            Some(Session {
                state: SessionState::Opened { console_id, suite },
                max_privilege,
                ..
            }) => (*console_id, *suite, *max_privilege),
            _ => return refuse(status::INVALID_SESSION_ID, 0),
        };

        if rakp1.user != self.user {
            self.sessions.remove(&rakp1.bmc_id);
            return refuse(status::UNAUTHORIZED_NAME, console_id);
        }
        let level = rakp1.role & 0x0F;
        if level == 0 || level > max_privilege {
            self.sessions.remove(&rakp1.bmc_id);
            return refuse(status::INVALID_ROLE, console_id);
        }

        let handshake = Handshake {
            console_id,
            bmc_id: rakp1.bmc_id,
            console_random: rakp1.console_random,
            bmc_random: rakp::random(),
            role: rakp1.role,
            user: rakp1.user.clone(),
        };
        let auth_code = handshake.rakp2_auth_code(&self.user_key, &self.guid)?;
        let reply = rmcp_plus::rakp2(rakp1.tag, console_id, &handshake.bmc_random, &self.guid, &auth_code);

        if let Some(session) = self.sessions.get_mut(&rakp1.bmc_id) {
            session.state = SessionState::Authenticating { suite, handshake };
            session.max_privilege = level;
            session.privilege = privilege::USER.min(level);
            session.last_activity = now;
        }
        handshake_reply(payload::RAKP_2, reply)
    }

    fn rakp3(&mut self, body: &[u8], now: Instant) -> Result<Disposition, SessionError> {
        let rakp3 = Rakp3::parse(body).ok_or(SessionError::MalformedHandshake(payload::RAKP_3))?;
        let id = rakp3.bmc_id;
        let refuse = |status, console_id| {
            handshake_reply(payload::RAKP_4, rmcp_plus::error_reply(rakp3.tag, status, console_id))
        };

        let (suite, handshake) = match self.sessions.get(&id) {
            Some(Session {
                state: SessionState::Authenticating { suite, handshake },
                ..
            }) => (*suite, handshake.clone()),
            _ => return refuse(status::INVALID_SESSION_ID, 0),
        };

        if rakp3.status != status::NO_ERRORS {
            self.sessions.remove(&id);
            return Err(SessionError::HandshakeAborted(rakp3.status));
        }
        if handshake.verify_rakp3(&self.user_key, &rakp3.auth_code).is_err() {
            self.sessions.remove(&id);
            return refuse(status::INVALID_INTEGRITY_CHECK, handshake.console_id);
        }
        if self.active_count() >= MAX_SESSIONS {
            self.sessions.remove(&id);
            return refuse(status::INSUFFICIENT_RESOURCES, handshake.console_id);
        }

        let sik = handshake.session_integrity_key(&self.user_key)?;
        let check_value = handshake.rakp4_check_value(&sik, &self.guid)?;
        let keys = SessionKeys::derive(&sik, suite)?;

        if let Some(session) = self.sessions.get_mut(&id) {
            session.state = SessionState::Established {
                console_id: handshake.console_id,
                keys,
            };
            session.last_activity = now;
            info!("{}: Session {:#010x} activated", session.peer, id);
        }
        handshake_reply(
            payload::RAKP_4,
            rmcp_plus::rakp4(rakp3.tag, handshake.console_id, &check_value),
        )
    }

    /// IPMI payloads sent over RMCP+ before any session exists
    fn session_less(&self, frame: &RmcpPlusFrame) -> Result<Disposition, SessionError> {
        let message = codec::decode_message(&frame.payload)?;
        let response = match (message.net_fn, message.command) {
            (netfn::APP, cmd::GET_CHANNEL_AUTH_CAPABILITIES) => self.auth_capabilities(&message),
            (netfn::APP, cmd::GET_CHANNEL_CIPHER_SUITES) => cipher_suites(&message),
            (net_fn, command) => return Err(SessionError::NotAuthenticated { net_fn, command }),
        };
        Ok(Disposition::Reply {
            frame: ReplyFrame::session_less(),
            message,
            response,
        })
    }

    fn rmcp_plus_session(&mut self, frame: &RmcpPlusFrame, now: Instant) -> Result<Disposition, SessionError> {
        let id = frame.header.session_id;
        let (console_id, keys) = match self.sessions.get(&id) {
            Some(Session {
                state: SessionState::Established { console_id, keys },
                ..
            }) => (*console_id, keys.clone()),
            _ => return Err(SessionError::UnknownSession(id)),
        };

        if frame.header.authenticated != keys.integrity {
            return Err(SessionError::BadAuthCode(id));
        }
        if keys.integrity {
            keys.verify(&frame.signed, &frame.auth_code)
                .map_err(|_| SessionError::BadAuthCode(id))?;
        }
        if frame.header.encrypted != keys.confidentiality {
            return Err(SessionError::EncryptionMismatch(id));
        }
        let message = if keys.confidentiality {
            codec::decode_message(&keys.decrypt(&frame.payload)?)?
        } else {
            codec::decode_message(&frame.payload)?
        };

        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        session.last_activity = now;
        let sequence = session.outbound_seq;
        // 0 is reserved for session-less packets
        session.outbound_seq = session.outbound_seq.wrapping_add(1).max(1);

        let reply = ReplyFrame::RmcpPlus {
            session_id: console_id,
            sequence,
            keys: Some(keys),
        };
        Ok(self.session_command(id, reply, message))
    }

    /// Session commands handled here for either session flavour; the rest
    /// go to the dispatcher
    fn session_command(&mut self, id: u32, frame: ReplyFrame, message: LanMessage) -> Disposition {
        let response = match (message.net_fn, message.command) {
            (netfn::APP, cmd::GET_CHANNEL_AUTH_CAPABILITIES) => self.auth_capabilities(&message),
            (netfn::APP, cmd::GET_CHANNEL_CIPHER_SUITES) => cipher_suites(&message),
            (netfn::APP, cmd::SET_SESSION_PRIVILEGE) => match self.sessions.get_mut(&id) {
                Some(session) => set_privilege(session, &message),
                None => Response::completion(CompletionCode::INVALID_SESSION_ID),
            },
            (netfn::APP, cmd::CLOSE_SESSION) => self.close(&message),
            _ => return Disposition::Dispatch { frame, message },
        };
        Disposition::Reply {
            frame,
            message,
            response,
        }
    }

    fn close(&mut self, message: &LanMessage) -> Response {
        let Some(bytes) = message.data.get(..4) else {
            return Response::completion(CompletionCode::REQUEST_DATA_LENGTH_INVALID);
        };
        let mut id = [0u8; 4];
        id.copy_from_slice(bytes);
        let id = u32::from_le_bytes(id);

        match self.sessions.remove(&id) {
            Some(session) => {
                info!("{}: Session {:#010x} closed", session.peer, id);
                Response::success()
            }
            None => Response::completion(CompletionCode::INVALID_SESSION_ID),
        }
    }

    fn evict_oldest_pending(&mut self) {
        let oldest = self
            .sessions
            .iter()
            .filter(|(_, s)| !s.state.is_active())
            .min_by_key(|(_, s)| s.last_activity)
            .map(|(id, _)| *id);
        if let Some(id) = oldest {
            self.sessions.remove(&id);
        }
    }

    fn new_session_id(&self, rng: &mut impl Rng) -> u32 {
        loop {
            let id = rng.gen_range(1..=u32::MAX);
            if !self.sessions.contains_key(&id) {
                return id;
            }
        }
    }
}

fn handshake_reply(payload_type: u8, body: Vec<u8>) -> Result<Disposition, SessionError> {
    Ok(Disposition::Send(frame::encode_handshake(payload_type, &body)?))
}

/// Get Channel Cipher Suites: 16 bytes of records per list index
fn cipher_suites(message: &LanMessage) -> Response {
    let data = &message.data;
    if data.len() < 3 {
        return Response::completion(CompletionCode::REQUEST_DATA_LENGTH_INVALID);
    }
    let channel = match data[0] & 0x0F {
        0x0E => 0x01,
        other => other,
    };
    let start = (data[2] & 0x3F) as usize * 16;

    let mut out = vec![channel];
    out.extend(rmcp_plus::cipher_suite_records().into_iter().skip(start).take(16));
    Response::with_data(out)
}

fn set_privilege(session: &mut Session, message: &LanMessage) -> Response {
    let Some(&requested) = message.data.first() else {
        return Response::completion(CompletionCode::REQUEST_DATA_LENGTH_INVALID);
    };
    let requested = requested & 0x0F;
    if requested == 0 {
        return Response::with_data(vec![session.privilege]);
    }
    if requested > session.max_privilege {
        return Response::completion(CompletionCode::PRIVILEGE_NOT_AVAILABLE);
    }
    session.privilege = requested;
    Response::with_data(vec![requested])
}
