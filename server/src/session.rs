//! Server-side sessions: one per connected peer, whether remote or in-process.
//!
//! The loop only ever talks to a session through non-blocking channel operations.
//! Remote sessions exchange raw bytes with their socket tasks and do the framing here;
//! in-process sessions (embedded bots and a locally hosted player) exchange whole
//! messages and skip the codec entirely.

use crate::error::DisconnectCause;
use log::{debug, info, warn};
use shared::codec::{self, Decoded, FrameBuffer};
use shared::protocol::{Message, PeerRole};
use shared::{PlayerId, Tick};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TryRecvError};

/// What a connection's reader task reports.
#[derive(Debug, PartialEq)]
pub enum ReadEvent {
    Data(Vec<u8>),
    Closed,
    Error(String),
}

pub enum Transport {
    Remote {
        addr: SocketAddr,
        inbound: mpsc::UnboundedReceiver<ReadEvent>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    },
    InProcess {
        to_peer: mpsc::UnboundedSender<Message>,
        from_peer: mpsc::UnboundedReceiver<Message>,
    },
}

impl Transport {
    fn describe(&self) -> String {
        match self {
            Transport::Remote { addr, .. } => addr.to_string(),
            Transport::InProcess { .. } => "in-process".to_string(),
        }
    }
}

pub struct Session {
    pub player_id: PlayerId,
    pub role: PeerRole,
    /// Set once the peer's `Join` has been handled.
    pub joined: bool,
    /// The next broadcast to this session must be a `JoinAck`.
    pub awaiting_ack: bool,
    pub last_heard: Tick,
    transport: Transport,
    frames: FrameBuffer,
    outbound: Vec<Message>,
    closing: Option<DisconnectCause>,
}

impl Session {
    pub fn new(player_id: PlayerId, role: PeerRole, transport: Transport, now: Tick) -> Self {
        Self {
            player_id,
            role,
            joined: false,
            awaiting_ack: false,
            last_heard: now,
            transport,
            frames: FrameBuffer::new(),
            outbound: Vec::new(),
            closing: None,
        }
    }

    pub fn peer(&self) -> String {
        self.transport.describe()
    }

    /// Drains everything the peer has sent so far without blocking.
    ///
    /// Stops at the first malformed frame and marks the session for removal.
    pub fn poll_readable(&mut self, now: Tick) -> Vec<Message> {
        let mut messages = Vec::new();
        if self.closing.is_some() {
            return messages;
        }

        match &mut self.transport {
            Transport::Remote { inbound, .. } => loop {
                match inbound.try_recv() {
                    Ok(ReadEvent::Data(bytes)) => self.frames.extend(&bytes),
                    Ok(ReadEvent::Closed) => {
                        self.closing = Some(DisconnectCause::Requested("connection closed".into()));
                        break;
                    }
                    Ok(ReadEvent::Error(e)) => {
                        self.closing = Some(DisconnectCause::Transport(e));
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.closing = Some(DisconnectCause::Transport("reader stopped".into()));
                        break;
                    }
                }
            },
            Transport::InProcess { from_peer, .. } => loop {
                match from_peer.try_recv() {
                    Ok(message) => messages.push(message),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.closing = Some(DisconnectCause::Requested("peer dropped".into()));
                        break;
                    }
                }
            },
        }

        // Frames that arrived before a close are still delivered.
        loop {
            match self.frames.next_frame() {
                Decoded::Frame { message, .. } => messages.push(message),
                Decoded::NeedMoreData => break,
                Decoded::Malformed(e) => {
                    warn!("Malformed frame from player {}: {}", self.player_id, e);
                    self.closing = Some(DisconnectCause::Protocol(e));
                    break;
                }
            }
        }

        if !messages.is_empty() {
            self.last_heard = now;
        }
        messages
    }

    pub fn enqueue(&mut self, message: Message) {
        self.outbound.push(message);
    }

    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    /// Hands every queued message to the transport in one batch.
    pub fn flush(&mut self) -> Result<(), DisconnectCause> {
        if self.outbound.is_empty() {
            return Ok(());
        }
        let queued = std::mem::take(&mut self.outbound);

        match &self.transport {
            Transport::Remote { outbound, .. } => {
                let mut bytes = Vec::new();
                for message in &queued {
                    codec::encode_into(message, &mut bytes)?;
                }
                outbound
                    .send(bytes)
                    .map_err(|_| DisconnectCause::Transport("writer stopped".into()))
            }
            Transport::InProcess { to_peer, .. } => {
                for message in queued {
                    to_peer
                        .send(message)
                        .map_err(|_| DisconnectCause::Requested("peer dropped".into()))?;
                }
                Ok(())
            }
        }
    }

    pub fn mark_closed(&mut self, cause: DisconnectCause) {
        if self.closing.is_none() {
            debug!("Session {} closing: {}", self.player_id, cause);
            self.closing = Some(cause);
        }
    }

    pub fn close_cause(&self) -> Option<&DisconnectCause> {
        self.closing.as_ref()
    }

    pub fn is_alive(&self, now: Tick, timeout_ticks: u64) -> bool {
        self.closing.is_none() && now.saturating_sub(self.last_heard) <= timeout_ticks
    }

    /// Best-effort goodbye. Errors are ignored; the session is going away anyway.
    pub fn send_disconnect(&mut self, reason: &str) {
        self.outbound.clear();
        self.enqueue(Message::Disconnect {
            reason: reason.to_string(),
        });
        let _ = self.flush();
    }
}

/// Owns every session and hands out player ids, which are never reused.
pub struct SessionManager {
    sessions: BTreeMap<PlayerId, Session>,
    next_id: PlayerId,
    max_sessions: usize,
    timeout_ticks: u64,
}

impl SessionManager {
    pub fn new(max_sessions: usize, timeout_ticks: u64) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_id: 1,
            max_sessions,
            timeout_ticks,
        }
    }

    /// Registers a new session, or returns `None` when the server is full.
    pub fn add(&mut self, role: PeerRole, transport: Transport, now: Tick) -> Option<PlayerId> {
        if self.sessions.len() >= self.max_sessions {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        let session = Session::new(id, role, transport, now);
        info!("Session {} opened ({}, {:?})", id, session.peer(), role);
        self.sessions.insert(id, session);
        Some(id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.sessions.keys().copied().collect()
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Removes and returns every session that closed or went silent too long.
    pub fn reap(&mut self, now: Tick) -> Vec<(Session, DisconnectCause)> {
        let timeout = self.timeout_ticks;
        let dead: Vec<PlayerId> = self
            .sessions
            .values()
            .filter(|s| !s.is_alive(now, timeout))
            .map(|s| s.player_id)
            .collect();

        dead.into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .map(|session| {
                let cause = session
                    .close_cause()
                    .cloned()
                    .unwrap_or(DisconnectCause::Timeout(now.saturating_sub(session.last_heard)));
                (session, cause)
            })
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.max_sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
