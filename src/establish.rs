//! Running a handshake over a byte stream and handing the stream to a connection.
//!
//! Handshake messages use the same framing as transport messages: a 2-byte big-endian
//! length, then the message. Payloads are empty.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{
    cipher_state::CipherPair,
    connection::{self, ConnectionHandle, Owner, StartOptions},
    error::{ConnectionError, HandshakeError},
    hs_state::HsState,
};

/// The outcome of a finished handshake.
pub struct Established {
    pub pair: CipherPair,
    pub remote_static: Option<Vec<u8>>,
    pub handshake_hash: Vec<u8>,
}

/// What is left to know about a session once its ciphers belong to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub remote_static: Option<Vec<u8>>,
    pub handshake_hash: Vec<u8>,
}

/// Drives `state` to completion over `stream`.
pub async fn handshake<S>(stream: &mut S, mut state: HsState) -> Result<Established, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while !state.is_finished() {
        if state.is_my_turn() {
            let message = state.write_message(&[])?;
            stream.write_u16(message.len() as u16).await?;
            stream.write_all(&message).await?;
            stream.flush().await?;
            debug!(role = ?state.role(), len = message.len(), "handshake message sent");
        } else {
            let len = stream.read_u16().await? as usize;
            let mut message = vec![0; len];
            stream.read_exact(&mut message).await?;
            state.read_message(&message)?;
            debug!(role = ?state.role(), len, "handshake message received");
        }
    }

    let remote_static = state.remote_static().map(<[u8]>::to_vec);
    let handshake_hash = state.handshake_hash().to_vec();
    let pair = state.split()?;
    Ok(Established {
        pair,
        remote_static,
        handshake_hash,
    })
}

/// Handshake, then start a connection on the same stream.
pub async fn upgrade<S>(
    mut stream: S,
    state: HsState,
    owner: Owner,
    opts: StartOptions,
) -> Result<(ConnectionHandle, Session), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Established {
        pair,
        remote_static,
        handshake_hash,
    } = handshake(&mut stream, state).await?;
    let handle = connection::start(stream, pair.reader, pair.writer, owner, opts)?;
    Ok((
        handle,
        Session {
            remote_static,
            handshake_hash,
        },
    ))
}
