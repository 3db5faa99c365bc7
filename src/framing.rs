//! Transport-phase wire framing.
//!
//! Every message is a 2-byte big-endian length followed by exactly that many bytes of AEAD
//! output, encrypted under empty associated data.

use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    cipher_state::CipherState, error::ConnectionError, hs_state::MAX_MESSAGE_LEN,
    primitives::TAG_LEN,
};

pub const LEN_PREFIX: usize = 2;
/// Largest plaintext whose ciphertext still fits the length prefix.
pub const MAX_PLAINTEXT: usize = MAX_MESSAGE_LEN - TAG_LEN;

/// Encrypts `plain_text` with `tx` and appends the framed result to `out`.
/// Oversized input is refused before the cipher is touched.
pub fn encode(tx: &mut CipherState, plain_text: &[u8], out: &mut BytesMut) -> Result<(), ConnectionError> {
    if plain_text.len() > MAX_PLAINTEXT {
        return Err(ConnectionError::MessageTooLarge(plain_text.len()));
    }
    let text = tx.encrypt_with_ad(&[], plain_text)?;
    out.reserve(LEN_PREFIX + text.len());
    out.put_u16(text.len() as u16);
    out.put_slice(&text);
    Ok(())
}

/// Receive side: raw bytes in, decrypted messages out, in arrival order.
pub struct Inbound {
    rx: CipherState,
    raw: BytesMut,
    pending: VecDeque<Bytes>,
}

impl Inbound {
    pub fn new(rx: CipherState) -> Self {
        Self {
            rx,
            raw: BytesMut::new(),
            pending: VecDeque::new(),
        }
    }

    /// The unframed byte buffer, for reading straight into.
    pub fn raw_mut(&mut self) -> &mut BytesMut {
        &mut self.raw
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.raw.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn pop(&mut self) -> Option<Bytes> {
        self.pending.pop_front()
    }

    pub fn absorb(&mut self, bytes: &[u8]) -> Result<usize, ConnectionError> {
        self.raw.extend_from_slice(bytes);
        self.drain_frames()
    }

    /// Decrypts every complete frame in the buffer and queues the plaintexts.
    /// Returns how many were queued. The first frame that fails to decrypt stops the scan;
    /// the receiver cannot be trusted after that.
    pub fn drain_frames(&mut self) -> Result<usize, ConnectionError> {
        let mut queued = 0;
        while self.raw.len() >= LEN_PREFIX {
            let len = u16::from_be_bytes([self.raw[0], self.raw[1]]) as usize;
            if self.raw.len() < LEN_PREFIX + len {
                break;
            }
            self.raw.advance(LEN_PREFIX);
            let frame = self.raw.split_to(len);
            let text = self
                .rx
                .decrypt_with_ad(&[], &frame)
                .map_err(|_| ConnectionError::Decrypt)?;
            self.pending.push_back(Bytes::from(text));
            queued += 1;
        }
        Ok(queued)
    }
}
