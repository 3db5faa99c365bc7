//! Transport-phase connection actor.
//!
//! One task owns the transport and both transport ciphers. Callers talk to it through a
//! [`ConnectionHandle`]; decrypted messages and lifecycle events reach the current owner's
//! [`Mailbox`]. All state changes happen inside the task loop, one event at a time.

use std::{
    collections::VecDeque,
    fmt, io,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use bytes::{Buf, Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{mpsc, oneshot},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    cipher_state::CipherState,
    error::ConnectionError,
    framing::{self, Inbound},
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// What the owner hears from a connection.
#[derive(Debug)]
pub enum Notification {
    Message { conn: ConnId, payload: Bytes },
    /// The peer closed the stream.
    Closed { conn: ConnId },
    /// A frame failed authentication. The connection is gone.
    DecryptError { conn: ConnId },
    TransportError { conn: ConnId, kind: io::ErrorKind },
}

/// The sending half of an owner. Hand a clone to each connection it should control.
#[derive(Debug, Clone)]
pub struct Owner {
    id: OwnerId,
    events: mpsc::UnboundedSender<Notification>,
}

impl Owner {
    pub fn id(&self) -> OwnerId {
        self.id
    }

    fn notify(&self, event: Notification) {
        // A vanished owner is noticed separately through `closed()`.
        let _ = self.events.send(event);
    }
}

/// The receiving half of an owner. Dropping it tells every owned connection to shut down.
#[derive(Debug)]
pub struct Mailbox {
    id: OwnerId,
    events: mpsc::UnboundedReceiver<Notification>,
}

impl Mailbox {
    pub fn id(&self) -> OwnerId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Notification> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Notification> {
        self.events.try_recv().ok()
    }
}

pub fn owner() -> (Owner, Mailbox) {
    let id = OwnerId(next_id());
    let (tx, rx) = mpsc::unbounded_channel();
    (Owner { id, events: tx }, Mailbox { id, events: rx })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveMode {
    /// Deliver every message as soon as it is decrypted.
    Active,
    /// Deliver one message, then stop reading until re-armed.
    Once,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Active,
    Once { delivered: bool },
}

impl From<ActiveMode> for Delivery {
    fn from(mode: ActiveMode) -> Self {
        match mode {
            ActiveMode::Active => Delivery::Active,
            ActiveMode::Once => Delivery::Once { delivered: false },
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartOptions {
    pub mode: ActiveMode,
    /// Transport bytes that arrived before the connection took over, e.g. read past the
    /// end of the handshake.
    pub buffer: Bytes,
    /// Deadline for `controlling_process`.
    pub control_timeout: Duration,
    pub command_capacity: usize,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            mode: ActiveMode::Active,
            buffer: Bytes::new(),
            control_timeout: Duration::from_millis(100),
            command_capacity: 32,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, ConnectionError>>;

enum Command {
    Send {
        data: Bytes,
        reply: Reply<()>,
    },
    SetActive {
        requester: OwnerId,
        mode: ActiveMode,
        reply: Reply<()>,
    },
    ControllingProcess {
        requester: OwnerId,
        new_owner: Owner,
        deadline: Instant,
        reply: Reply<()>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Cheap to clone. The connection closes once every handle is dropped.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnId,
    commands: mpsc::Sender<Command>,
    control_timeout: Duration,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ConnectionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ConnectionError::Closed)?;
        response.await.map_err(|_| ConnectionError::Closed)?
    }

    /// Encrypts, frames and writes `data`. Resolves once the bytes are flushed.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<(), ConnectionError> {
        let data = data.into();
        self.request(|reply| Command::Send { data, reply }).await
    }

    pub async fn set_active(&self, requester: OwnerId, mode: ActiveMode) -> Result<(), ConnectionError> {
        self.request(|reply| Command::SetActive {
            requester,
            mode,
            reply,
        })
        .await
    }

    /// Hands the connection to `new_owner`. Buffered bytes and undelivered messages move
    /// with it. On `Timeout` the previous owner keeps control.
    pub async fn controlling_process(
        &self,
        requester: OwnerId,
        new_owner: Owner,
    ) -> Result<(), ConnectionError> {
        let deadline = Instant::now() + self.control_timeout;
        let transfer = self.request(|reply| Command::ControllingProcess {
            requester,
            new_owner,
            deadline,
            reply,
        });
        tokio::time::timeout_at(deadline, transfer)
            .await
            .map_err(|_| ConnectionError::Timeout)?
    }

    /// Stops the actor and shuts the transport. Closing twice is fine.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Close { reply }).await.is_ok() {
            let _ = done.await;
        }
        Ok(())
    }
}

/// Takes over `transport` with the ciphers from a finished handshake.
///
/// `opts.buffer` is decrypted before this returns; a bad frame in it fails the start and
/// drops the transport.
pub fn start<T>(
    transport: T,
    rx_cipher: CipherState,
    tx_cipher: CipherState,
    owner: Owner,
    opts: StartOptions,
) -> Result<ConnectionHandle, ConnectionError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = ConnId(next_id());
    let mut inbound = Inbound::new(rx_cipher);
    if let Err(err) = inbound.absorb(&opts.buffer) {
        warn!(conn = %id, "initial buffer failed to decrypt");
        return Err(err);
    }

    let (reader, writer) = tokio::io::split(transport);
    let (commands_tx, commands) = mpsc::channel(opts.command_capacity.max(1));
    let mut actor = Actor {
        id,
        inbound,
        tx: tx_cipher,
        writer,
        outgoing: VecDeque::new(),
        owner,
        delivery: opts.mode.into(),
    };
    actor.deliver();
    debug!(conn = %id, owner = %actor.owner.id, mode = ?opts.mode, "connection started");
    tokio::spawn(actor.run(reader, commands));

    Ok(ConnectionHandle {
        id,
        commands: commands_tx,
        control_timeout: opts.control_timeout,
    })
}

enum Event {
    Command(Option<Command>),
    OwnerGone,
    Read(io::Result<usize>),
    Written(io::Result<()>),
}

/// An encrypted frame on its way out. `frame` shrinks as the transport accepts bytes.
struct Outgoing {
    frame: BytesMut,
    reply: Reply<()>,
}

/// Writes the front frame and flushes. Progress lives in the frame itself, so the future
/// can be dropped and recreated between `select!` rounds without losing or repeating bytes.
async fn write_front<W>(writer: &mut W, outgoing: &mut VecDeque<Outgoing>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Some(front) = outgoing.front_mut() else {
        return Ok(());
    };
    while front.frame.has_remaining() {
        if writer.write_buf(&mut front.frame).await? == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
    }
    writer.flush().await
}

enum Exit {
    Requested(oneshot::Sender<()>),
    HandlesDropped,
    OwnerGone,
    PeerClosed,
    Decrypt,
    Transport(io::ErrorKind),
}

impl Exit {
    fn reason(&self) -> &'static str {
        match self {
            Exit::Requested(_) => "closed by request",
            Exit::HandlesDropped => "all handles dropped",
            Exit::OwnerGone => "owner gone",
            Exit::PeerClosed => "peer closed",
            Exit::Decrypt => "decrypt error",
            Exit::Transport(_) => "transport error",
        }
    }
}

struct Actor<T> {
    id: ConnId,
    inbound: Inbound,
    tx: CipherState,
    writer: WriteHalf<T>,
    outgoing: VecDeque<Outgoing>,
    owner: Owner,
    delivery: Delivery,
}

impl<T> Actor<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self, mut reader: ReadHalf<T>, mut commands: mpsc::Receiver<Command>) {
        let exit = loop {
            let armed = self.read_armed();
            let writing = !self.outgoing.is_empty();
            let event = tokio::select! {
                biased;
                cmd = commands.recv() => Event::Command(cmd),
                _ = self.owner.events.closed() => Event::OwnerGone,
                written = write_front(&mut self.writer, &mut self.outgoing), if writing => {
                    Event::Written(written)
                }
                read = reader.read_buf(self.inbound.raw_mut()), if armed => Event::Read(read),
            };
            let step = match event {
                Event::Command(Some(cmd)) => self.handle(cmd),
                Event::Command(None) => Some(Exit::HandlesDropped),
                Event::OwnerGone => Some(Exit::OwnerGone),
                Event::Written(written) => self.on_written(written),
                Event::Read(read) => self.on_read(read),
            };
            if let Some(exit) = step {
                break exit;
            }
        };

        match exit {
            Exit::PeerClosed => self.owner.notify(Notification::Closed { conn: self.id }),
            Exit::Decrypt => self.owner.notify(Notification::DecryptError { conn: self.id }),
            Exit::Transport(kind) => self.owner.notify(Notification::TransportError {
                conn: self.id,
                kind,
            }),
            Exit::Requested(_) | Exit::HandlesDropped | Exit::OwnerGone => {}
        }
        // A stalled write would stall the shutdown too; dropping both halves releases the
        // transport either way. Senders still queued see `Closed`.
        if self.outgoing.is_empty() {
            if let Err(err) = self.writer.shutdown().await {
                debug!(conn = %self.id, %err, "shutdown after stop failed");
            }
        } else {
            debug!(conn = %self.id, queued = self.outgoing.len(), "dropping unsent frames");
        }
        info!(conn = %self.id, reason = exit.reason(), "connection stopped");
        if let Exit::Requested(reply) = exit {
            let _ = reply.send(());
        }
    }

    /// Reads stay off while a `Once` delivery is outstanding or messages are still queued.
    fn read_armed(&self) -> bool {
        match self.delivery {
            Delivery::Active => true,
            Delivery::Once { delivered } => !delivered && self.inbound.pending() == 0,
        }
    }

    fn on_read(&mut self, read: io::Result<usize>) -> Option<Exit> {
        match read {
            Ok(0) => Some(Exit::PeerClosed),
            Ok(_) => {
                let drained = self.inbound.drain_frames();
                self.deliver();
                match drained {
                    Ok(_) => None,
                    Err(_) => {
                        warn!(conn = %self.id, "frame failed to decrypt");
                        Some(Exit::Decrypt)
                    }
                }
            }
            Err(err) => {
                warn!(conn = %self.id, %err, "transport read failed");
                Some(Exit::Transport(err.kind()))
            }
        }
    }

    fn on_written(&mut self, written: io::Result<()>) -> Option<Exit> {
        let Outgoing { reply, .. } = self.outgoing.pop_front()?;
        match written {
            Ok(()) => {
                let _ = reply.send(Ok(()));
                None
            }
            Err(err) => {
                warn!(conn = %self.id, %err, "transport write failed");
                let kind = err.kind();
                let _ = reply.send(Err(ConnectionError::Transport(err)));
                Some(Exit::Transport(kind))
            }
        }
    }

    fn deliver(&mut self) {
        match self.delivery {
            Delivery::Active => {
                while let Some(payload) = self.inbound.pop() {
                    self.owner.notify(Notification::Message {
                        conn: self.id,
                        payload,
                    });
                }
            }
            Delivery::Once { delivered: false } => {
                if let Some(payload) = self.inbound.pop() {
                    self.owner.notify(Notification::Message {
                        conn: self.id,
                        payload,
                    });
                    self.delivery = Delivery::Once { delivered: true };
                }
            }
            Delivery::Once { delivered: true } => {}
        }
    }

    fn handle(&mut self, cmd: Command) -> Option<Exit> {
        match cmd {
            // Frames are encrypted in command order and written in the same order; the reply
            // waits until the transport has taken the whole frame.
            Command::Send { data, reply } => {
                let mut frame = BytesMut::new();
                match framing::encode(&mut self.tx, &data, &mut frame) {
                    Ok(()) => self.outgoing.push_back(Outgoing { frame, reply }),
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::SetActive {
                requester,
                mode,
                reply,
            } => {
                if requester != self.owner.id {
                    let _ = reply.send(Err(ConnectionError::NotOwner));
                    return None;
                }
                self.delivery = mode.into();
                self.deliver();
                let _ = reply.send(Ok(()));
            }
            Command::ControllingProcess {
                requester,
                new_owner,
                deadline,
                reply,
            } => {
                let res = if Instant::now() >= deadline {
                    Err(ConnectionError::Timeout)
                } else if requester != self.owner.id {
                    Err(ConnectionError::NotOwner)
                } else {
                    info!(conn = %self.id, from = %self.owner.id, to = %new_owner.id, "ownership transferred");
                    self.owner = new_owner;
                    Ok(())
                };
                let _ = reply.send(res);
            }
            Command::Close { reply } => return Some(Exit::Requested(reply)),
        }
        None
    }
}
