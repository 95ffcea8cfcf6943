//! RMCP+ session keys: RAKP-HMAC-SHA1 key exchange, HMAC-SHA1-96
//! integrity and AES-CBC-128 confidentiality

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// K_UID is the password zero-padded to this size
pub const USER_KEY_LEN: usize = 20;
pub const RANDOM_LEN: usize = 16;
pub const GUID_LEN: usize = 16;
/// HMAC-SHA1-96 auth codes and the RAKP 4 check value
pub const INTEGRITY_LEN: usize = 12;
const AES_BLOCK: usize = 16;

pub type Digest = [u8; 20];
pub type Random = [u8; RANDOM_LEN];
pub type Guid = [u8; GUID_LEN];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length")]
    KeyLength,

    #[error("auth code mismatch")]
    Mismatch,

    #[error("encrypted payload is not a whole number of blocks: {0} bytes")]
    BlockLength(usize),

    #[error("bad confidentiality pad")]
    Padding,
}

fn hmac_sha1(key: &[u8], parts: &[&[u8]]) -> Result<HmacSha1, CryptoError> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|_| CryptoError::KeyLength)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac)
}

fn digest(key: &[u8], parts: &[&[u8]]) -> Result<Digest, CryptoError> {
    let mut out = [0u8; 20];
    out.copy_from_slice(&hmac_sha1(key, parts)?.finalize().into_bytes());
    Ok(out)
}

/// K_UID for `password`
pub fn user_key(password: &[u8]) -> [u8; USER_KEY_LEN] {
    let mut key = [0u8; USER_KEY_LEN];
    let len = password.len().min(USER_KEY_LEN);
    key[..len].copy_from_slice(&password[..len]);
    key
}

pub fn random() -> Random {
    let mut out = [0u8; RANDOM_LEN];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

/// Algorithms negotiated in Open Session; authentication is always
/// RAKP-HMAC-SHA1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuite {
    /// HMAC-SHA1-96 on every session packet
    pub integrity: bool,
    /// AES-CBC-128 on every session payload
    pub confidentiality: bool,
}

/// Values exchanged in RAKP 1 and 2 that every later code is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub console_id: u32,
    pub bmc_id: u32,
    pub console_random: Random,
    pub bmc_random: Random,
    /// Requested role byte from RAKP 1, name-only lookup bit included
    pub role: u8,
    pub user: Vec<u8>,
}

impl Handshake {
    fn user_len(&self) -> [u8; 1] {
        [self.user.len() as u8]
    }

    /// RAKP 2 key exchange auth code
    pub fn rakp2_auth_code(&self, user_key: &[u8], guid: &Guid) -> Result<Digest, CryptoError> {
        digest(
            user_key,
            &[
                &self.console_id.to_le_bytes(),
                &self.bmc_id.to_le_bytes(),
                &self.console_random,
                &self.bmc_random,
                guid,
                &[self.role],
                &self.user_len(),
                &self.user,
            ],
        )
    }

    fn rakp3_mac(&self, user_key: &[u8]) -> Result<HmacSha1, CryptoError> {
        hmac_sha1(
            user_key,
            &[
                &self.bmc_random,
                &self.console_id.to_le_bytes(),
                &[self.role],
                &self.user_len(),
                &self.user,
            ],
        )
    }

    /// RAKP 3 key exchange auth code, as the console computes it
    #[cfg(test)]
    pub fn rakp3_auth_code(&self, user_key: &[u8]) -> Result<Digest, CryptoError> {
        let mut out = [0u8; 20];
        out.copy_from_slice(&self.rakp3_mac(user_key)?.finalize().into_bytes());
        Ok(out)
    }

    /// Check the console's RAKP 3 auth code
    pub fn verify_rakp3(&self, user_key: &[u8], auth_code: &[u8]) -> Result<(), CryptoError> {
        self.rakp3_mac(user_key)?
            .verify_slice(auth_code)
            .map_err(|_| CryptoError::Mismatch)
    }

    /// Session integrity key; K_G is K_UID since no BMC key is configured
    pub fn session_integrity_key(&self, user_key: &[u8]) -> Result<Digest, CryptoError> {
        digest(
            user_key,
            &[
                &self.console_random,
                &self.bmc_random,
                &[self.role],
                &self.user_len(),
                &self.user,
            ],
        )
    }

    /// RAKP 4 integrity check value
    pub fn rakp4_check_value(&self, sik: &Digest, guid: &Guid) -> Result<[u8; INTEGRITY_LEN], CryptoError> {
        let full = digest(sik, &[&self.console_random, &self.bmc_id.to_le_bytes(), guid])?;
        let mut out = [0u8; INTEGRITY_LEN];
        out.copy_from_slice(&full[..INTEGRITY_LEN]);
        Ok(out)
    }
}

/// Keys of an established RMCP+ session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    k1: Digest,
    k2: Digest,
    pub integrity: bool,
    pub confidentiality: bool,
}

impl SessionKeys {
    pub fn derive(sik: &Digest, suite: CipherSuite) -> Result<Self, CryptoError> {
        Ok(Self {
            k1: digest(sik, &[&[0x01; 20]])?,
            k2: digest(sik, &[&[0x02; 20]])?,
            integrity: suite.integrity,
            confidentiality: suite.confidentiality,
        })
    }

    /// HMAC-SHA1-96 over `signed`
    pub fn sign(&self, signed: &[u8]) -> Result<[u8; INTEGRITY_LEN], CryptoError> {
        let full = digest(&self.k1, &[signed])?;
        let mut out = [0u8; INTEGRITY_LEN];
        out.copy_from_slice(&full[..INTEGRITY_LEN]);
        Ok(out)
    }

    pub fn verify(&self, signed: &[u8], auth_code: &[u8]) -> Result<(), CryptoError> {
        if auth_code.len() != INTEGRITY_LEN {
            return Err(CryptoError::Mismatch);
        }
        hmac_sha1(&self.k1, &[signed])?
            .verify_truncated_left(auth_code)
            .map_err(|_| CryptoError::Mismatch)
    }

    /// Encrypt under a fresh random IV
    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.encrypt_with_iv(plain, random())
    }

    /// `IV | AES-CBC(plain | 1, 2, .. N | N)`
    pub fn encrypt_with_iv(&self, plain: &[u8], iv: [u8; AES_BLOCK]) -> Result<Vec<u8>, CryptoError> {
        let pad = (AES_BLOCK - (plain.len() + 1) % AES_BLOCK) % AES_BLOCK;
        let mut buf = Vec::with_capacity(AES_BLOCK + plain.len() + pad + 1);
        buf.extend_from_slice(&iv);
        buf.extend_from_slice(plain);
        buf.extend(1..=pad as u8);
        buf.push(pad as u8);

        let len = buf.len() - AES_BLOCK;
        Aes128CbcEnc::new_from_slices(&self.k2[..AES_BLOCK], &iv)
            .map_err(|_| CryptoError::KeyLength)?
            .encrypt_padded_mut::<NoPadding>(&mut buf[AES_BLOCK..], len)
            .map_err(|_| CryptoError::BlockLength(len))?;
        Ok(buf)
    }

    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if payload.len() < 2 * AES_BLOCK || payload.len() % AES_BLOCK != 0 {
            return Err(CryptoError::BlockLength(payload.len()));
        }
        let (iv, body) = payload.split_at(AES_BLOCK);
        let mut buf = body.to_vec();
        let plain = Aes128CbcDec::new_from_slices(&self.k2[..AES_BLOCK], iv)
            .map_err(|_| CryptoError::KeyLength)?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| CryptoError::BlockLength(body.len()))?;

        let Some(&pad) = plain.last() else {
            return Err(CryptoError::Padding);
        };
        let pad = pad as usize;
        if pad >= AES_BLOCK || pad + 1 > plain.len() {
            return Err(CryptoError::Padding);
        }
        let data_len = plain.len() - pad - 1;
        if !plain[data_len..plain.len() - 1].iter().copied().eq(1..=pad as u8) {
            return Err(CryptoError::Padding);
        }
        Ok(plain[..data_len].to_vec())
    }
}
