use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::Sha512;

use crate::actual::api_types::{EncryptMeta, TestMessage};
use crate::actual::errors::DownloadFailure;

pub const KEY_DERIVATION_ROUNDS: u32 = 10_000;
pub const ALGORITHM: &str = "aes-256-gcm";
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A budget encryption key derived from the user's budget password
pub struct BudgetKey {
    id: String,
    raw: [u8; 32],
}

impl BudgetKey {
    /// PBKDF2-HMAC-SHA512 over the password; the salt is used as its text bytes.
    pub fn derive(id: &str, password: &str, salt: &str) -> Self {
        let mut raw = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha512>(
            password.as_bytes(),
            salt.as_bytes(),
            KEY_DERIVATION_ROUNDS,
            &mut raw,
        );
        Self {
            id: id.to_string(),
            raw,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Decrypt a payload produced with this key.
    ///
    /// `file_id` only labels the error.
    pub fn decrypt(
        &self,
        payload: &[u8],
        meta: &EncryptMeta,
        file_id: &str,
    ) -> Result<Vec<u8>, DownloadFailure> {
        let failure = || DownloadFailure::DecryptFailure {
            file_id: file_id.to_string(),
        };

        if meta.algorithm != ALGORITHM {
            tracing::warn!(algorithm = %meta.algorithm, "unsupported encryption algorithm");
            return Err(failure());
        }
        if let Some(key_id) = &meta.key_id {
            if key_id != &self.id {
                tracing::warn!(expected = %key_id, loaded = %self.id, "payload encrypted with another key");
                return Err(failure());
            }
        }

        let iv = STANDARD.decode(&meta.iv).map_err(|_| failure())?;
        let tag = STANDARD.decode(&meta.auth_tag).map_err(|_| failure())?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(failure());
        }

        let mut sealed = Vec::with_capacity(payload.len() + TAG_LEN);
        sealed.extend_from_slice(payload);
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.raw));
        cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| failure())
    }

    /// Check the key against the `test` document stored with it on the server.
    pub fn verify(&self, test: &str, file_id: &str) -> Result<(), DownloadFailure> {
        let failure = || DownloadFailure::DecryptFailure {
            file_id: file_id.to_string(),
        };
        let message: TestMessage = serde_json::from_str(test).map_err(|_| failure())?;
        let value = STANDARD.decode(&message.value).map_err(|_| failure())?;
        self.decrypt(&value, &message.meta, file_id).map(|_| ())
    }
}

#[cfg(test)]
pub(crate) fn encrypt_for_tests(key: &BudgetKey, plaintext: &[u8]) -> (Vec<u8>, EncryptMeta) {
    let iv = [7u8; IV_LEN];
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.raw));
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .expect("encrypt");
    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    let meta = EncryptMeta {
        key_id: Some(key.id.clone()),
        algorithm: ALGORITHM.to_string(),
        iv: STANDARD.encode(iv),
        auth_tag: STANDARD.encode(tag),
    };
    (sealed, meta)
}

#[cfg(test)]
pub(crate) fn test_message_for_tests(key: &BudgetKey) -> String {
    let (value, meta) = encrypt_for_tests(key, b"\"verification\"");
    serde_json::to_string(&TestMessage {
        value: STANDARD.encode(value),
        meta,
    })
    .expect("serialize test message")
}
