#![allow(dead_code)]

use std::time::Duration;

use bytes::Bytes;
use noisewire::{
    owner, start, ActiveMode, CipherPair, ConnectionHandle, HandshakeKeys, HsState, Mailbox,
    NoiseParams, Notification, Owner, Role, StartOptions,
};
use tokio::io::{AsyncRead, AsyncWrite};

/// Runs an in-memory NN handshake and returns (initiator, responder) transport ciphers.
pub fn nn_pairs() -> (CipherPair, CipherPair) {
    let params: NoiseParams = "Noise_NN_25519_ChaChaPoly_BLAKE2s".parse().unwrap();
    let mut initiator =
        HsState::start(params, Role::Initiator, b"", HandshakeKeys::default()).unwrap();
    let mut responder =
        HsState::start(params, Role::Responder, b"", HandshakeKeys::default()).unwrap();

    let m1 = initiator.write_message(&[]).unwrap();
    responder.read_message(&m1).unwrap();
    let m2 = responder.write_message(&[]).unwrap();
    initiator.read_message(&m2).unwrap();

    (initiator.split().unwrap(), responder.split().unwrap())
}

pub struct Side {
    pub handle: ConnectionHandle,
    pub mailbox: Mailbox,
    pub owner: Owner,
}

pub fn side<T>(io: T, pair: CipherPair, opts: StartOptions) -> Side
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (owner, mailbox) = owner();
    let handle = start(io, pair.reader, pair.writer, owner.clone(), opts).unwrap();
    Side {
        handle,
        mailbox,
        owner,
    }
}

/// Two connections joined by an in-memory pipe.
pub fn connected(a_mode: ActiveMode, b_mode: ActiveMode) -> (Side, Side) {
    let (ip, rp) = nn_pairs();
    let (a_io, b_io) = tokio::io::duplex(64 * 1024);
    let opts = |mode| StartOptions {
        mode,
        ..Default::default()
    };
    (side(a_io, ip, opts(a_mode)), side(b_io, rp, opts(b_mode)))
}

pub async fn next(mailbox: &mut Mailbox) -> Notification {
    tokio::time::timeout(Duration::from_secs(5), mailbox.recv())
        .await
        .expect("no notification within 5s")
        .expect("mailbox closed")
}

/// True when nothing arrives for a little while.
pub async fn quiet(mailbox: &mut Mailbox) -> bool {
    tokio::time::timeout(Duration::from_millis(50), mailbox.recv())
        .await
        .is_err()
}

pub fn payload(event: Notification) -> Bytes {
    match event {
        Notification::Message { payload, .. } => payload,
        other => panic!("expected a message, got {other:?}"),
    }
}
