//! Noise Protocol Framework handshakes and an encrypted, framed transport on top.
//!
//! Layering, bottom up:
//! - [`primitives`]: hash, HMAC, HKDF, X25519 and ChaCha20-Poly1305.
//! - [`cipher_state`]: one direction's key and nonce.
//! - [`symm_state`]: chaining key and transcript hash during a handshake.
//! - [`hs_state`]: pattern-driven message exchange, ending in a [`CipherPair`].
//! - [`connection`]: an actor that owns a stream plus both transport ciphers.
//!
//! [`establish`] glues a handshake and a connection together over one stream.
#![forbid(unsafe_code)]

/// One each during handshake. During transport, each side has one for sending, one for receiving.
pub mod cipher_state;
pub mod connection;
pub mod error;
pub mod establish;
/// Transport framing and reassembly.
pub mod framing;
/// Contains a symmetric state, plus the Diffie-Hellman variables.
/// Consumed once the handshake is complete.
pub mod hs_state;
pub mod nonce;
pub mod params;
pub mod pattern;
pub mod primitives;
/// Contains cipher_state + ck and h variables. Each party's sole symm_state encapsulates the
/// "symmetric cryptography" used by Noise.
pub mod symm_state;

pub use cipher_state::{CipherPair, CipherState};
pub use connection::{
    owner, start, ActiveMode, ConnId, ConnectionHandle, Mailbox, Notification, Owner, OwnerId,
    StartOptions,
};
pub use error::{ConnectionError, CryptoError, HandshakeError};
pub use establish::{handshake, upgrade, Established, Session};
pub use hs_state::{HandshakeKeys, HsState, Role, MAX_MESSAGE_LEN};
pub use params::NoiseParams;
pub use pattern::{HandshakePattern, Pattern};
pub use primitives::{CipherAlg, DhAlg, HashAlg, KeyPair};
