//! AES-256-CBC encryption of persisted result sets
//!
//! Every call to [`EncryptionCodec::encrypt`] draws a fresh random 16-byte IV;
//! the IV travels next to the ciphertext in an [`EncryptedBlob`], both base64
//! encoded. Padding is PKCS#7.
//!
//! There is no authentication tag. A tampered blob either fails the padding
//! check or decrypts to garbage; it is not otherwise detected.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::{CryptoError, Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Environment variable holding the 32-byte key
pub const ENCRYPTION_KEY_VAR: &str = "ENCRYPTION_KEY";

/// AES block / IV length in bytes
pub const IV_LEN: usize = 16;

/// Key length in bytes
pub const KEY_LEN: usize = 32;

/// A validated 256-bit key
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Build a key from raw bytes; fails unless exactly 32 bytes are given
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    /// Read the key from `ENCRYPTION_KEY`
    ///
    /// The variable's UTF-8 bytes are the key, so it must be exactly 32 bytes long.
    pub fn from_env() -> Result<Self> {
        let value = std::env::var(ENCRYPTION_KEY_VAR)
            .map_err(|_| CryptoError::MissingKey(ENCRYPTION_KEY_VAR))?;
        Self::from_bytes(value.as_bytes())
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// IV and ciphertext, both base64, stored together as one record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// Base64 initialization vector
    pub iv: String,
    /// Base64 ciphertext
    pub data: String,
}

/// Symmetric codec for result sets
#[derive(Clone, Debug)]
pub struct EncryptionCodec {
    key: EncryptionKey,
}

impl EncryptionCodec {
    /// Create a codec around an already validated key
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Create a codec from `ENCRYPTION_KEY`, failing if it is absent or malformed
    pub fn from_env() -> Result<Self> {
        EncryptionKey::from_env().map(Self::new)
    }

    /// Encrypt bytes under a fresh random IV
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedBlob> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(&self.key.0, &iv)
            .map_err(|e| Error::Other(format!("cipher setup failed: {e}")))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        Ok(EncryptedBlob {
            iv: STANDARD.encode(iv),
            data: STANDARD.encode(ciphertext),
        })
    }

    /// Decrypt a blob with the IV stored alongside it
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<Vec<u8>> {
        let iv = STANDARD
            .decode(&blob.iv)
            .map_err(|e| CryptoError::InvalidIv(e.to_string()))?;
        if iv.len() != IV_LEN {
            return Err(CryptoError::InvalidIv(format!(
                "expected {IV_LEN} bytes, got {}",
                iv.len()
            ))
            .into());
        }
        let ciphertext = STANDARD
            .decode(&blob.data)
            .map_err(|e| CryptoError::InvalidCiphertext(e.to_string()))?;

        let plaintext = Aes256CbcDec::new_from_slices(&self.key.0, &iv)
            .map_err(|e| Error::Other(format!("cipher setup failed: {e}")))?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CryptoError::BadPadding)?;
        Ok(plaintext)
    }

    /// Serialize a value to JSON and encrypt it
    pub fn encrypt_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<EncryptedBlob> {
        let plaintext = serde_json::to_vec(value)?;
        self.encrypt(&plaintext)
    }

    /// Decrypt a blob and parse the plaintext as JSON
    pub fn decrypt_json<T: DeserializeOwned>(&self, blob: &EncryptedBlob) -> Result<T> {
        let plaintext = self.decrypt(blob)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}
