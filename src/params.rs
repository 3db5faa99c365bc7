//! Protocol names of the form `Noise_<PATTERN>_<DH>_<CIPHER>_<HASH>`.
use std::{fmt, str::FromStr};

use crate::{
    error::CryptoError,
    pattern::HandshakePattern,
    primitives::{CipherAlg, DhAlg, HashAlg},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoiseParams {
    pub pattern: HandshakePattern,
    pub dh: DhAlg,
    pub cipher: CipherAlg,
    pub hash: HashAlg,
}

impl NoiseParams {
    pub fn new(
        pattern: impl Into<HandshakePattern>,
        dh: DhAlg,
        cipher: CipherAlg,
        hash: HashAlg,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            dh,
            cipher,
            hash,
        }
    }
}

impl FromStr for NoiseParams {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        let ["Noise", pattern, dh, cipher, hash] = parts[..] else {
            return Err(CryptoError::UnsupportedAlgorithm(s.to_owned()));
        };
        Ok(Self {
            pattern: pattern.parse()?,
            dh: dh.parse()?,
            cipher: cipher.parse()?,
            hash: hash.parse()?,
        })
    }
}

impl fmt::Display for NoiseParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Noise_{}_{}_{}_{}",
            self.pattern, self.dh, self.cipher, self.hash
        )
    }
}
