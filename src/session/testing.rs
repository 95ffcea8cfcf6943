//! Remote console side of an RMCP+ login, for driving the BMC in tests

use super::frame;
use super::rakp::{self, CipherSuite, Guid, Handshake, SessionKeys};
use bmc_shared::codec::{self, payload, LanMessage, Packet, RmcpPlusFrame, RmcpPlusHeader};

pub const CONSOLE_ID: u32 = 0xA0A2_A3A4;
/// Administrator, name-only lookup
pub const ROLE: u8 = 0x14;

pub fn frame_of(datagram: &[u8]) -> RmcpPlusFrame {
    match codec::decode(datagram).unwrap() {
        Packet::RmcpPlus(frame) => frame,
        other => panic!("expected an RMCP+ packet, got {other:?}"),
    }
}

pub struct Console {
    user: Vec<u8>,
    password: Vec<u8>,
    suite: CipherSuite,
    console_random: rakp::Random,
    pub bmc_id: u32,
    handshake: Option<(Handshake, Guid)>,
    pub keys: Option<SessionKeys>,
    sequence: u32,
}

impl Console {
    pub fn new(user: &str, password: &str, suite: CipherSuite) -> Self {
        Self {
            user: user.as_bytes().to_vec(),
            password: password.as_bytes().to_vec(),
            suite,
            console_random: rakp::random(),
            bmc_id: 0,
            handshake: None,
            keys: None,
            sequence: 0,
        }
    }

    pub fn open_session(&self) -> Vec<u8> {
        let mut body = vec![0x01, 0x00, 0, 0];
        body.extend_from_slice(&CONSOLE_ID.to_le_bytes());
        body.extend_from_slice(&[0x00, 0, 0, 0x08, 0x01, 0, 0, 0]);
        body.extend_from_slice(&[0x01, 0, 0, 0x08, self.suite.integrity as u8, 0, 0, 0]);
        body.extend_from_slice(&[0x02, 0, 0, 0x08, self.suite.confidentiality as u8, 0, 0, 0]);
        handshake_request(payload::OPEN_SESSION_REQUEST, &body)
    }

    /// RAKP 1 following an accepted Open Session response
    pub fn rakp1(&mut self, response: &RmcpPlusFrame) -> Vec<u8> {
        assert_eq!(response.header.payload_type, payload::OPEN_SESSION_RESPONSE);
        assert_eq!(response.payload[1], 0x00, "open session refused");
        assert_eq!(&response.payload[4..8], &CONSOLE_ID.to_le_bytes());
        self.bmc_id = u32::from_le_bytes(response.payload[8..12].try_into().unwrap());

        let mut body = vec![0x02, 0, 0, 0];
        body.extend_from_slice(&self.bmc_id.to_le_bytes());
        body.extend_from_slice(&self.console_random);
        body.extend_from_slice(&[ROLE, 0, 0, self.user.len() as u8]);
        body.extend_from_slice(&self.user);
        handshake_request(payload::RAKP_1, &body)
    }

    /// Check RAKP 2 and answer with RAKP 3
    pub fn rakp3(&mut self, response: &RmcpPlusFrame) -> Vec<u8> {
        assert_eq!(response.header.payload_type, payload::RAKP_2);
        let body = &response.payload;
        assert_eq!(body[1], 0x00, "RAKP 2 refused");

        let mut guid = [0u8; 16];
        guid.copy_from_slice(&body[24..40]);
        let handshake = Handshake {
            console_id: CONSOLE_ID,
            bmc_id: self.bmc_id,
            console_random: self.console_random,
            bmc_random: body[8..24].try_into().unwrap(),
            role: ROLE,
            user: self.user.clone(),
        };
        let user_key = rakp::user_key(&self.password);
        assert_eq!(
            &handshake.rakp2_auth_code(&user_key, &guid).unwrap()[..],
            &body[40..60],
            "BMC does not know the password"
        );

        let mut out = vec![0x03, 0, 0, 0];
        out.extend_from_slice(&self.bmc_id.to_le_bytes());
        out.extend_from_slice(&handshake.rakp3_auth_code(&user_key).unwrap());
        self.handshake = Some((handshake, guid));
        handshake_request(payload::RAKP_3, &out)
    }

    /// Check RAKP 4 and derive the session keys
    pub fn finish(&mut self, response: &RmcpPlusFrame) {
        assert_eq!(response.header.payload_type, payload::RAKP_4);
        assert_eq!(response.payload[1], 0x00, "RAKP 4 refused");
        let (handshake, guid) = self.handshake.as_ref().expect("RAKP 3 not sent");

        let sik = handshake
            .session_integrity_key(&rakp::user_key(&self.password))
            .unwrap();
        assert_eq!(&response.payload[8..20], &handshake.rakp4_check_value(&sik, guid).unwrap());
        self.keys = Some(SessionKeys::derive(&sik, self.suite).unwrap());
    }

    /// An in-session request, protected as the cipher suite requires
    pub fn request(&mut self, message: &LanMessage) -> Vec<u8> {
        self.sequence += 1;
        frame::seal(
            self.bmc_id,
            self.sequence,
            self.keys.as_ref(),
            &codec::encode_request_message(message),
        )
        .unwrap()
    }

    /// Verify and decrypt an in-session response
    pub fn open(&self, response: &RmcpPlusFrame) -> LanMessage {
        let keys = self.keys.as_ref().expect("no session");
        assert_eq!(response.header.session_id, CONSOLE_ID);
        assert_eq!(response.header.authenticated, keys.integrity);
        assert_eq!(response.header.encrypted, keys.confidentiality);
        if keys.integrity {
            keys.verify(&response.signed, &response.auth_code).unwrap();
        }
        let plain = if keys.confidentiality {
            keys.decrypt(&response.payload).unwrap()
        } else {
            response.payload.to_vec()
        };
        codec::decode_message(&plain).unwrap()
    }
}

pub fn handshake_request(payload_type: u8, body: &[u8]) -> Vec<u8> {
    codec::encode_rmcp_plus(&RmcpPlusHeader::session_less(payload_type), body)
        .unwrap()
        .to_vec()
}

/// Session-less IPMI request over RMCP+
pub fn session_less_request(message: &LanMessage) -> Vec<u8> {
    frame::seal(0, 0, None, &codec::encode_request_message(message)).unwrap()
}
