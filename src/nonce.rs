//! Noise nonces are a 64 bit counter, one per key.
//! Repeated use under the same key is catastrophic.
//! The max value is reserved for rekeying.
//!
//! We use rusts type system to keep ordinary traffic away from the reserved value.

use zeroize::Zeroize;

use crate::error::CryptoError;

/// Counter value reserved exclusively for [`crate::cipher_state::CipherState::rekey`].
pub const MAX_NONCE: u64 = u64::MAX;

#[derive(Zeroize, Clone, Copy, Default, Eq, PartialEq)]
#[cfg_attr(test, derive(Debug))]
pub struct Nonce(u64);

impl Nonce {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The counter to feed the next AEAD call.
    /// Once the counter reaches the reserved value, no ordinary nonce is left.
    pub fn current(&self) -> Result<u64, CryptoError> {
        if self.0 == MAX_NONCE {
            return Err(CryptoError::NonceExhausted);
        }
        Ok(self.0)
    }

    /// Moves past a nonce that a successful AEAD call just consumed.
    /// #Panics: panics if asked to step onto or past the reserved value from it
    pub(crate) fn increment(&mut self) {
        assert!(
            self.0 != MAX_NONCE,
            "invariant broken: increment of the reserved nonce"
        );
        self.0 += 1;
    }
}

impl From<u64> for Nonce {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

/// ChaCha20-Poly1305 nonce layout: 32 zero bits, then the counter little-endian.
pub(crate) fn chacha_nonce(n: u64) -> [u8; 12] {
    let mut nonce = [0; 12];
    nonce[4..].copy_from_slice(&n.to_le_bytes());
    nonce
}
