use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use std::path::Path;
use thiserror::Error;
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encryption error")]
    Encryption,

    #[error("Decryption error")]
    Decryption,

    #[error("Invalid master key length: expected 32 bytes, got {0}")]
    InvalidKey(usize),
}

/// Text-in, text-out encryption primitive.
///
/// `decrypt(encrypt(x)) == x`, and `decrypt` fails on anything it did not
/// produce with the same key.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// AES-256-GCM with a random nonce per message, encoded as
/// `base64(nonce || ciphertext)`.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn new(master_key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(master_key.into()),
        }
    }

    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Read the 32-byte key at `path`, creating it on first use.
    pub fn load_or_create_key<P: AsRef<Path>>(path: P) -> Result<[u8; 32], CipherError> {
        let path = path.as_ref();

        if path.exists() {
            let mut bytes = std::fs::read(path)?;
            if bytes.len() != 32 {
                let len = bytes.len();
                bytes.zeroize();
                return Err(CipherError::InvalidKey(len));
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            bytes.zeroize();
            return Ok(key);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let key = Self::generate_key();
        std::fs::write(path, key)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(key)
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encryption)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(blob))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let blob = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CipherError::Decryption)?;

        if blob.len() <= NONCE_LEN {
            return Err(CipherError::Decryption);
        }

        let (nonce_bytes, body) = blob.split_at(NONCE_LEN);
        let mut plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|_| CipherError::Decryption)?;

        let result = String::from_utf8(plaintext.clone()).map_err(|_| CipherError::Decryption);
        plaintext.zeroize();
        result
    }
}
