//! Archive key derivation and chunk sealing with AES-256-GCM.
//!
//! ## Security Model
//!
//! - One key per archive. The password is stretched with Argon2id over a
//!   random 16-byte salt stored in the archive, then expanded with
//!   HKDF-SHA256 under a fixed label
//! - Every chunk gets a fresh random nonce
//! - The AAD binds each chunk to its entry name, position and final flag,
//!   so chunks cannot be swapped, reordered or truncated unnoticed
//! - Keys are zeroized on drop

use crate::error::{ArchiveError, ArchiveResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Size of the per-archive salt in bytes.
pub const SALT_SIZE: usize = 16;

/// Argon2id memory cost in KiB.
const ARGON2_MEMORY_KIB: u32 = 19_456;
/// Argon2id passes.
const ARGON2_ITERATIONS: u32 = 2;
/// Argon2id lanes.
const ARGON2_LANES: u32 = 1;

/// Key protecting the entries of one archive.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ArchiveKey {
    bytes: [u8; KEY_SIZE],
}

impl ArchiveKey {
    /// Derives the archive key from a password and the archive salt.
    ///
    /// Argon2id makes every password guess cost memory and time; HKDF then
    /// binds the stretched secret to the archive key label.
    pub fn derive(password: &[u8], salt: &[u8]) -> ArchiveResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_LANES,
            Some(KEY_SIZE),
        )
        .map_err(|e| ArchiveError::encryption(format!("invalid Argon2 parameters: {e}")))?;
        let mut stretched = Zeroizing::new([0u8; KEY_SIZE]);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(password, salt, &mut stretched[..])
            .map_err(|e| ArchiveError::encryption(format!("password stretching failed: {e}")))?;

        let hk = Hkdf::<Sha256>::new(Some(salt), &stretched[..]);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"chatvault-archive-key-v2", &mut bytes)
            .map_err(|_| ArchiveError::encryption("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    /// Generates a fresh random salt.
    #[must_use]
    pub fn generate_salt() -> [u8; SALT_SIZE] {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        salt
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for ArchiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Seals and opens individual chunks.
pub(crate) struct ChunkCipher {
    cipher: Aes256Gcm,
}

impl ChunkCipher {
    pub(crate) fn new(key: &ArchiveKey) -> Self {
        let key_array = GenericArray::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key_array),
        }
    }

    /// Seals `plaintext`; output is `nonce || ciphertext || tag`.
    pub(crate) fn seal(&self, plaintext: &[u8], aad: &[u8]) -> ArchiveResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| ArchiveError::encryption("chunk encryption failed"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    /// Opens a chunk produced by [`seal`](Self::seal).
    pub(crate) fn open(&self, sealed: &[u8], aad: &[u8]) -> ArchiveResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ArchiveError::unreadable("sealed chunk too short"));
        }
        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &sealed[NONCE_SIZE..],
                    aad,
                },
            )
            .map_err(|_| ArchiveError::unreadable("wrong password or corrupted entry"))
    }
}

/// Builds the associated data for one chunk of an entry.
pub(crate) fn chunk_aad(entry: &str, index: u64, last: bool) -> Vec<u8> {
    let mut aad = Vec::with_capacity(entry.len() + 9);
    aad.extend_from_slice(entry.as_bytes());
    aad.extend_from_slice(&index.to_le_bytes());
    aad.push(u8::from(last));
    aad
}
