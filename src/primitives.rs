//! Stateless cryptographic functions and the closed set of algorithms they run on.
//!
//! HMAC and HKDF are built by hand over the selected hash rather than through a MAC crate,
//! so that the block length always follows the hash chosen for the handshake.

use std::{fmt, str::FromStr};

use blake2::{Blake2b512, Blake2s256, Digest};
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, Key, KeyInit, Tag};
use sha2::{Sha256, Sha512};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{error::CryptoError, nonce::chacha_nonce};

/// Symmetric key length shared by every supported AEAD.
pub const KEY_LEN: usize = 32;
/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    Blake2b,
    Blake2s,
    Sha256,
    Sha512,
}

impl HashAlg {
    pub const fn hash_len(self) -> usize {
        match self {
            HashAlg::Blake2b | HashAlg::Sha512 => 64,
            HashAlg::Blake2s | HashAlg::Sha256 => 32,
        }
    }

    pub const fn block_len(self) -> usize {
        match self {
            HashAlg::Blake2b | HashAlg::Sha512 => 128,
            HashAlg::Blake2s | HashAlg::Sha256 => 64,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            HashAlg::Blake2b => "BLAKE2b",
            HashAlg::Blake2s => "BLAKE2s",
            HashAlg::Sha256 => "SHA256",
            HashAlg::Sha512 => "SHA512",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DhAlg {
    X25519,
}

impl DhAlg {
    /// Length of both public keys and shared secrets.
    pub const fn dh_len(self) -> usize {
        match self {
            DhAlg::X25519 => 32,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DhAlg::X25519 => "25519",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlg {
    ChaChaPoly,
}

impl CipherAlg {
    pub const fn key_len(self) -> usize {
        match self {
            CipherAlg::ChaChaPoly => KEY_LEN,
        }
    }

    pub const fn tag_len(self) -> usize {
        match self {
            CipherAlg::ChaChaPoly => TAG_LEN,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            CipherAlg::ChaChaPoly => "ChaChaPoly",
        }
    }
}

macro_rules! named_alg {
    ($ty:ty, [$($variant:expr),+]) => {
        impl FromStr for $ty {
            type Err = CryptoError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                [$($variant),+]
                    .into_iter()
                    .find(|alg| alg.name() == s)
                    .ok_or_else(|| CryptoError::UnsupportedAlgorithm(s.to_owned()))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

named_alg!(
    HashAlg,
    [HashAlg::Blake2b, HashAlg::Blake2s, HashAlg::Sha256, HashAlg::Sha512]
);
named_alg!(DhAlg, [DhAlg::X25519]);
named_alg!(CipherAlg, [CipherAlg::ChaChaPoly]);

/// Right-pads `data` with `pad_byte` up to `min_size`. Longer input is returned as is.
pub fn pad(data: &[u8], min_size: usize, pad_byte: u8) -> Vec<u8> {
    let mut out = data.to_vec();
    if out.len() < min_size {
        out.resize(min_size, pad_byte);
    }
    out
}

/// XORs every 32-bit word of `input` with `pad_byte` repeated four times.
/// #Panics: panics if `input` is not a whole number of 32-bit words
pub fn xor_pad_32bit(input: &[u8], pad_byte: u8) -> Vec<u8> {
    assert!(
        input.len() % 4 == 0,
        "invariant broken: xor pad over a partial 32-bit word"
    );
    let word = u32::from_ne_bytes([pad_byte; 4]);
    input
        .chunks_exact(4)
        .flat_map(|c| (u32::from_ne_bytes([c[0], c[1], c[2], c[3]]) ^ word).to_ne_bytes())
        .collect()
}

fn digest_parts<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        Digest::update(&mut hasher, part);
    }
    hasher.finalize().to_vec()
}

/// Hash over the concatenation of `parts`, without materialising it.
pub(crate) fn hash_parts(alg: HashAlg, parts: &[&[u8]]) -> Vec<u8> {
    match alg {
        HashAlg::Blake2b => digest_parts::<Blake2b512>(parts),
        HashAlg::Blake2s => digest_parts::<Blake2s256>(parts),
        HashAlg::Sha256 => digest_parts::<Sha256>(parts),
        HashAlg::Sha512 => digest_parts::<Sha512>(parts),
    }
}

pub fn hash(alg: HashAlg, data: &[u8]) -> Vec<u8> {
    hash_parts(alg, &[data])
}

fn hmac_parts(alg: HashAlg, key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let block_len = alg.block_len();
    let key = if key.len() > block_len {
        Zeroizing::new(hash(alg, key))
    } else {
        Zeroizing::new(key.to_vec())
    };
    let key = Zeroizing::new(pad(&key, block_len, 0));
    let ipad = Zeroizing::new(xor_pad_32bit(&key, 0x36));
    let opad = Zeroizing::new(xor_pad_32bit(&key, 0x5c));

    let mut inner_parts = Vec::with_capacity(parts.len() + 1);
    inner_parts.push(ipad.as_slice());
    inner_parts.extend_from_slice(parts);
    let inner = Zeroizing::new(hash_parts(alg, &inner_parts));

    hash_parts(alg, &[opad.as_slice(), inner.as_slice()])
}

pub fn hmac(alg: HashAlg, key: &[u8], data: &[u8]) -> Vec<u8> {
    hmac_parts(alg, key, &[data])
}

/// Noise HKDF: three hash-length outputs chained off one temporary key.
pub fn hkdf(alg: HashAlg, key: &[u8], data: &[u8]) -> [Zeroizing<Vec<u8>>; 3] {
    let temp = Zeroizing::new(hmac(alg, key, data));
    let out1 = Zeroizing::new(hmac_parts(alg, &temp, &[&[1]]));
    let out2 = Zeroizing::new(hmac_parts(alg, &temp, &[out1.as_slice(), &[2]]));
    let out3 = Zeroizing::new(hmac_parts(alg, &temp, &[out2.as_slice(), &[3]]));
    [out1, out2, out3]
}

/// A Diffie-Hellman key pair. The private half is wiped on drop.
#[derive(Clone)]
pub struct KeyPair {
    alg: DhAlg,
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    pub fn generate(alg: DhAlg) -> Self {
        match alg {
            DhAlg::X25519 => Self::from_secret(alg, StaticSecret::random()),
        }
    }

    pub fn from_private(alg: DhAlg, private: [u8; 32]) -> Self {
        match alg {
            DhAlg::X25519 => Self::from_secret(alg, StaticSecret::from(private)),
        }
    }

    fn from_secret(alg: DhAlg, secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { alg, secret, public }
    }

    pub fn alg(&self) -> DhAlg {
        self.alg
    }

    pub fn public(&self) -> &[u8] {
        self.public.as_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("alg", &self.alg)
            .field("public", &self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

/// Scalar multiplication of our private key with `peer_public`.
///
/// Peer keys of the wrong length, and peer keys that force an all-zero shared secret,
/// are rejected with [`CryptoError::InvalidPublicKey`].
pub fn dh(
    alg: DhAlg,
    key_pair: &KeyPair,
    peer_public: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if key_pair.alg != alg {
        return Err(CryptoError::UnsupportedAlgorithm(format!(
            "{} key pair used for {} exchange",
            key_pair.alg, alg
        )));
    }
    match alg {
        DhAlg::X25519 => {
            let peer: [u8; 32] = peer_public
                .try_into()
                .map_err(|_| CryptoError::InvalidPublicKey)?;
            let shared = key_pair.secret.diffie_hellman(&PublicKey::from(peer));
            if !shared.was_contributory() {
                return Err(CryptoError::InvalidPublicKey);
            }
            Ok(Zeroizing::new(shared.as_bytes().to_vec()))
        }
    }
}

/// Returns `plaintext` encrypted, followed by the authentication tag.
pub fn aead_encrypt(
    alg: CipherAlg,
    key: &[u8; KEY_LEN],
    nonce: u64,
    ad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    match alg {
        CipherAlg::ChaChaPoly => {
            let aead = ChaCha20Poly1305::new(Key::from_slice(key));
            let mut text = Vec::with_capacity(plaintext.len() + TAG_LEN);
            text.extend_from_slice(plaintext);
            let tag = aead
                .encrypt_in_place_detached(&chacha_nonce(nonce).into(), ad, &mut text)
                .map_err(|_| CryptoError::EncryptionFailed)?;
            text.extend_from_slice(&tag);
            Ok(text)
        }
    }
}

/// Verifies and strips the trailing tag. Any mismatch is [`CryptoError::AuthenticationFailed`].
pub fn aead_decrypt(
    alg: CipherAlg,
    key: &[u8; KEY_LEN],
    nonce: u64,
    ad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    match alg {
        CipherAlg::ChaChaPoly => {
            if ciphertext.len() < TAG_LEN {
                return Err(CryptoError::AuthenticationFailed);
            }
            let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_LEN);
            let aead = ChaCha20Poly1305::new(Key::from_slice(key));
            let mut text = body.to_vec();
            aead.decrypt_in_place_detached(
                &chacha_nonce(nonce).into(),
                ad,
                &mut text,
                Tag::from_slice(tag),
            )
            .map_err(|_| CryptoError::AuthenticationFailed)?;
            Ok(text)
        }
    }
}
