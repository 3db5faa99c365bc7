//! One symmetric key plus its nonce counter.
use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::CryptoError,
    nonce::{Nonce, MAX_NONCE},
    primitives::{aead_decrypt, aead_encrypt, CipherAlg, KEY_LEN},
};

#[derive(Zeroize, ZeroizeOnDrop, Eq, PartialEq)]
struct CipherKey([u8; KEY_LEN]);

impl CipherKey {
    fn valid_key(&self) -> bool {
        self.0.iter().any(|&b| b != 0)
    }
}

#[derive(Eq, PartialEq)]
pub struct CipherState {
    alg: CipherAlg,
    nonce: Nonce,
    key: CipherKey,
}

/// The two transport cipher states one side ends a handshake with.
/// `writer` encrypts outgoing traffic, `reader` decrypts incoming traffic.
pub struct CipherPair {
    pub writer: CipherState,
    pub reader: CipherState,
}

impl CipherState {
    pub(crate) fn new(alg: CipherAlg, key: [u8; KEY_LEN]) -> Self {
        let key = CipherKey(key);
        assert!(
            key.valid_key(),
            "invariant breakage: attempt to initialise empty key"
        );
        Self {
            alg,
            nonce: Nonce::new(),
            key,
        }
    }

    /// Builds a state from hash output, keeping the first key-length bytes.
    pub(crate) fn from_derived(alg: CipherAlg, derived: &[u8]) -> Self {
        let mut key = [0; KEY_LEN];
        key.copy_from_slice(&derived[..KEY_LEN]);
        let state = Self::new(alg, key);
        key.zeroize();
        state
    }

    /// Refreshes the cipher state with a new key, setting nonce to 0.
    pub(crate) fn reset_key(self, derived: &[u8]) -> Self {
        Self::from_derived(self.alg, derived)
    }

    pub fn alg(&self) -> CipherAlg {
        self.alg
    }

    pub fn nonce(&self) -> u64 {
        self.nonce.value()
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = Nonce::from(nonce);
    }

    /// Encrypts under the current nonce, then moves the nonce on by one.
    /// The ciphertext is the plain-text length plus the tag.
    pub fn encrypt_with_ad(&mut self, ad: &[u8], plain_text: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let n = self.nonce.current()?;
        let text = aead_encrypt(self.alg, &self.key.0, n, ad, plain_text)?;
        self.nonce.increment();
        Ok(text)
    }

    /// Decrypts under the current nonce. The nonce only moves when the tag checks out.
    pub fn decrypt_with_ad(&mut self, ad: &[u8], cipher_text: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let n = self.nonce.current()?;
        let text = aead_decrypt(self.alg, &self.key.0, n, ad, cipher_text)?;
        self.nonce.increment();
        Ok(text)
    }

    /// Replaces the key with the leading bytes of `ENCRYPT(k, MAX_NONCE, "", zeros)` and
    /// starts a new nonce epoch at zero.
    pub fn rekey(&mut self) -> Result<(), CryptoError> {
        let zeros = [0; KEY_LEN];
        let mut text = aead_encrypt(self.alg, &self.key.0, MAX_NONCE, &[], &zeros)?;
        self.key.0.copy_from_slice(&text[..KEY_LEN]);
        text.zeroize();
        self.nonce = Nonce::new();
        Ok(())
    }
}

impl fmt::Debug for CipherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherState")
            .field("alg", &self.alg)
            .field("nonce", &self.nonce.value())
            .finish_non_exhaustive()
    }
}
