//! Error types, one enum per layer.
//!
//! Cryptographic failures are never retried by this crate: the caller gets the
//! error and decides whether a fresh handshake is warranted.

use thiserror::Error;

/// Failures of the stateless primitives and the cipher state built on them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    /// Every ordinary nonce for this key has been used; only rekey remains.
    #[error("nonce space exhausted")]
    NonceExhausted,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("handshake failed: {0}")]
    HandshakeFailed(&'static str),

    #[error("not this side's turn to {0} a message")]
    WrongTurn(&'static str),

    #[error("handshake pattern already exhausted")]
    Finished,

    #[error("handshake pattern not yet exhausted")]
    NotFinished,

    #[error("missing key: {0}")]
    MissingKey(&'static str),

    #[error("handshake message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// A previous step failed; the state must be discarded.
    #[error("handshake state poisoned by an earlier failure")]
    Poisoned,

    #[error("i/o error during handshake: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("decrypt error")]
    Decrypt,

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("caller is not the controlling owner")]
    NotOwner,

    #[error("connection closed")]
    Closed,

    #[error("control request timed out")]
    Timeout,

    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}
