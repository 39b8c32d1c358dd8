//! The tick pipeline, free of any socket or timer.
//!
//! [`GameLoop::run_tick`] is called once per tick by the network layer (or directly by
//! tests) and runs the same five phases every time:
//!
//! 1. accept connections handed over by the listener
//! 2. gather input: embedded bots decide, every session is drained, admin commands apply
//! 3. step the world
//! 4. broadcast a `JoinAck`, keyframe or delta to every joined session
//! 5. tear down sessions that closed or timed out
//!
//! Everything here uses non-blocking channel operations only, so a tick never waits on
//! a slow peer.

use crate::admin::{apply_admin, AdminEffect, AdminHandle, AdminRequest};
use crate::config::ServerConfig;
use crate::error::{CommandError, DisconnectCause};
use crate::game::{TickEvents, WorldState};
use crate::input::{InboundInput, InputBuffer};
use crate::persistence::Progress;
use crate::session::{ReadEvent, SessionManager, Transport};
use log::{debug, info, warn};
use shared::bot::BotController;
use shared::protocol::{Message, PeerRole, WorldSnapshot};
use shared::{PlayerId, TICK_RATE};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// A freshly accepted socket, already split into its reader and writer tasks.
pub struct Connection {
    pub addr: SocketAddr,
    pub inbound: mpsc::UnboundedReceiver<ReadEvent>,
    pub outbound: mpsc::UnboundedSender<Vec<u8>>,
}

/// A bot driven synchronously by the loop over an in-process transport.
struct EmbeddedBot {
    controller: BotController,
    to_server: mpsc::UnboundedSender<Message>,
    from_server: mpsc::UnboundedReceiver<Message>,
}

impl EmbeddedBot {
    fn think(&mut self) {
        while let Ok(message) = self.from_server.try_recv() {
            self.controller.observe(&message);
        }
        if let Some(input) = self.controller.decide() {
            let _ = self.to_server.send(input);
        }
    }
}

/// The host's own player, attached without a socket.
pub struct LocalClient {
    pub player_id: PlayerId,
    to_server: mpsc::UnboundedSender<Message>,
    from_server: mpsc::UnboundedReceiver<Message>,
}

impl LocalClient {
    /// Queues a message for the next tick. Returns false once the session is gone.
    pub fn send(&self, message: Message) -> bool {
        self.to_server.send(message).is_ok()
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.from_server.try_recv().ok()
    }

    pub fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(message) = self.try_recv() {
            messages.push(message);
        }
        messages
    }
}

pub struct GameLoop {
    config: ServerConfig,
    world: WorldState,
    sessions: SessionManager,
    inputs: InputBuffer,
    bots: BTreeMap<PlayerId, EmbeddedBot>,
    bots_spawned: u32,
    connection_tx: mpsc::UnboundedSender<Connection>,
    connection_rx: mpsc::UnboundedReceiver<Connection>,
    admin_tx: mpsc::UnboundedSender<AdminRequest>,
    admin_rx: mpsc::UnboundedReceiver<AdminRequest>,
    /// Admin commands that arrived over the wire this tick.
    wire_admin: Vec<AdminRequest>,
    last_broadcast: Option<WorldSnapshot>,
    local_player: Option<PlayerId>,
    progress: Progress,
}

impl GameLoop {
    pub fn new(config: ServerConfig, progress: Progress) -> Self {
        let level = config.level.unwrap_or(progress.max_level);
        let (connection_tx, connection_rx) = mpsc::unbounded_channel();
        let (admin_tx, admin_rx) = mpsc::unbounded_channel();

        let mut game_loop = Self {
            world: WorldState::new(level, config.seed),
            sessions: SessionManager::new(config.max_players, config.timeout_ticks),
            inputs: InputBuffer::new(),
            bots: BTreeMap::new(),
            bots_spawned: 0,
            connection_tx,
            connection_rx,
            admin_tx,
            admin_rx,
            wire_admin: Vec::new(),
            last_broadcast: None,
            local_player: None,
            progress,
            config,
        };

        for _ in 0..game_loop.config.bots {
            if let Err(e) = game_loop.spawn_bot(None) {
                warn!("Could not start bot: {}", e);
                break;
            }
        }
        game_loop
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn bot_ids(&self) -> Vec<PlayerId> {
        self.bots.keys().copied().collect()
    }

    /// Sender the listener uses to hand over accepted sockets.
    pub fn connection_sender(&self) -> mpsc::UnboundedSender<Connection> {
        self.connection_tx.clone()
    }

    pub fn admin_handle(&self) -> AdminHandle {
        AdminHandle::new(self.admin_tx.clone())
    }

    /// Attaches the host's player over an in-process transport. Its `Join` is queued
    /// immediately and handled on the next tick.
    pub fn connect_local(&mut self, name: &str) -> Option<LocalClient> {
        let (to_server, from_peer) = mpsc::unbounded_channel();
        let (to_peer, from_server) = mpsc::unbounded_channel();
        let player_id = self.sessions.add(
            PeerRole::Human,
            Transport::InProcess { to_peer, from_peer },
            self.world.tick,
        )?;
        let _ = to_server.send(Message::Join {
            name: name.to_string(),
        });
        self.local_player = Some(player_id);
        Some(LocalClient {
            player_id,
            to_server,
            from_server,
        })
    }

    /// Runs one full tick and reports what happened in the simulation.
    pub fn run_tick(&mut self) -> TickEvents {
        self.accept_connections();
        self.gather_input();
        self.apply_admin_commands();

        let inputs = self.inputs.drain();
        let events = self.world.step(&inputs);

        self.broadcast();
        self.reap_sessions();

        if self.world.tick % (TICK_RATE as u64 * 10) == 0 {
            debug!(
                "Tick {}: level {}, {} sessions, {} bots, {} projectiles, boss {:.0}/{:.0}",
                self.world.tick,
                self.world.level,
                self.sessions.len(),
                self.bots.len(),
                self.world.projectiles.len(),
                self.world.boss.health,
                self.world.boss.max_health
            );
        }
        events
    }

    fn accept_connections(&mut self) {
        while let Ok(connection) = self.connection_rx.try_recv() {
            let Connection {
                addr,
                inbound,
                outbound,
            } = connection;

            if self.sessions.is_full() {
                info!("Rejecting {}: server full", addr);
                let mut bytes = Vec::new();
                let goodbye = Message::Disconnect {
                    reason: DisconnectCause::ServerFull.to_string(),
                };
                if shared::codec::encode_into(&goodbye, &mut bytes).is_ok() {
                    let _ = outbound.send(bytes);
                }
                continue;
            }

            let transport = Transport::Remote {
                addr,
                inbound,
                outbound,
            };
            self.sessions.add(PeerRole::Human, transport, self.world.tick);
        }
    }

    fn gather_input(&mut self) {
        for bot in self.bots.values_mut() {
            bot.think();
        }

        let now = self.world.tick;
        for id in self.sessions.ids() {
            let Some(session) = self.sessions.get_mut(id) else {
                continue;
            };
            let role = session.role;
            let messages = session.poll_readable(now);

            for message in messages {
                match message {
                    Message::Join { name } => {
                        let Some(session) = self.sessions.get_mut(id) else {
                            break;
                        };
                        if session.joined {
                            warn!("Player {} sent a second Join, ignored", id);
                            continue;
                        }
                        session.joined = true;
                        session.awaiting_ack = true;
                        let coins = self.progress.coins;
                        let local = self.local_player == Some(id);
                        self.world.add_player(id, &name, role);
                        if local {
                            if let Some(player) = self.world.player_mut(id) {
                                player.coins = coins;
                            }
                        }
                    }
                    Message::Input {
                        seq,
                        move_dir,
                        actions,
                        client_time,
                    } => {
                        let joined = self.sessions.get(id).map_or(false, |s| s.joined);
                        if !joined {
                            debug!("Input from player {} before Join, ignored", id);
                            continue;
                        }
                        self.inputs.push(InboundInput {
                            player_id: id,
                            seq,
                            move_dir,
                            actions,
                            client_time,
                        });
                    }
                    Message::AdminCommand { target, verb } => {
                        self.wire_admin.push(AdminRequest {
                            issuer: Some(id),
                            target,
                            verb,
                        });
                    }
                    Message::Heartbeat => {}
                    Message::Disconnect { reason } => {
                        if let Some(session) = self.sessions.get_mut(id) {
                            session.mark_closed(DisconnectCause::Requested(reason));
                        }
                    }
                    other => {
                        warn!("Player {} sent server-only message {}, ignored", id, other.kind());
                    }
                }
            }
        }
    }

    fn apply_admin_commands(&mut self) {
        let mut requests = std::mem::take(&mut self.wire_admin);
        while let Ok(request) = self.admin_rx.try_recv() {
            requests.push(request);
        }

        for request in requests {
            let result = apply_admin(&mut self.world, &request).and_then(|effect| match effect {
                AdminEffect::Applied => Ok(()),
                AdminEffect::SpawnBot { name } => self.spawn_bot(name).map(|_| ()),
                AdminEffect::RemoveBot { id } => self.remove_bot(id),
            });
            if let Err(e) = result {
                warn!("Admin command {:?} rejected: {}", request.verb, e);
            }
        }
    }

    /// Starts an embedded bot. It joins on the next tick like any other peer.
    pub fn spawn_bot(&mut self, name: Option<String>) -> Result<PlayerId, CommandError> {
        let (bot_tx, from_peer) = mpsc::unbounded_channel();
        let (to_peer, bot_rx) = mpsc::unbounded_channel();
        let id = self
            .sessions
            .add(PeerRole::Bot, Transport::InProcess { to_peer, from_peer }, self.world.tick)
            .ok_or(CommandError::NoCapacity)?;

        self.bots_spawned += 1;
        let name = name.unwrap_or_else(|| format!("Bot_{}", self.bots_spawned));
        let seed = self
            .config
            .seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(id as u64);
        let controller = BotController::new(name, seed);
        let _ = bot_tx.send(controller.join_message());

        info!("Bot {} started as player {}", controller.name(), id);
        self.bots.insert(
            id,
            EmbeddedBot {
                controller,
                to_server: bot_tx,
                from_server: bot_rx,
            },
        );
        Ok(id)
    }

    /// Stops a bot, or the most recently started one when `id` is `None`.
    pub fn remove_bot(&mut self, id: Option<PlayerId>) -> Result<(), CommandError> {
        let id = match id {
            Some(id) if self.bots.contains_key(&id) => id,
            None => match self.bots.keys().next_back() {
                Some(&id) => id,
                None => return Err(CommandError::UnknownTarget(None)),
            },
            Some(id) => return Err(CommandError::UnknownTarget(Some(id))),
        };
        self.bots.remove(&id);
        if let Some(session) = self.sessions.get_mut(id) {
            session.mark_closed(DisconnectCause::Requested("removed by admin".into()));
        }
        Ok(())
    }

    fn broadcast(&mut self) {
        let snapshot = self.world.snapshot();
        let keyframe = self.last_broadcast.is_none()
            || snapshot.tick % self.config.snapshot_interval.max(1) == 0;
        let delta = match &self.last_broadcast {
            Some(previous) if !keyframe => previous.diff(&snapshot),
            _ => Vec::new(),
        };

        for session in self.sessions.iter_mut() {
            if !session.joined || session.close_cause().is_some() {
                continue;
            }
            if session.awaiting_ack {
                session.awaiting_ack = false;
                session.enqueue(Message::JoinAck {
                    player_id: session.player_id,
                    snapshot: snapshot.clone(),
                });
            } else if keyframe {
                session.enqueue(Message::WorldSnapshot(snapshot.clone()));
            } else {
                session.enqueue(Message::WorldDelta {
                    tick: snapshot.tick,
                    changed: delta.clone(),
                });
            }
            if let Err(cause) = session.flush() {
                session.mark_closed(cause);
            }
        }

        self.last_broadcast = Some(snapshot);
    }

    fn reap_sessions(&mut self) {
        for (mut session, cause) in self.sessions.reap(self.world.tick) {
            let id = session.player_id;
            info!("Player {} disconnected: {}", id, cause);
            if cause.can_notify() {
                session.send_disconnect(&cause.to_string());
            }
            let removed = self.world.remove_player(id);
            self.inputs.remove_player(id);
            self.bots.remove(&id);
            if self.local_player == Some(id) {
                // Keep the local balance for the final save.
                if let Some(player) = removed {
                    self.progress.coins = player.coins;
                }
                self.local_player = None;
            }
        }
    }

    /// Progress to persist: highest level ever reached and the local player's coins.
    pub fn current_progress(&self) -> Progress {
        let coins = self
            .local_player
            .and_then(|id| self.world.player(id))
            .map_or(self.progress.coins, |p| p.coins);
        Progress {
            coins,
            max_level: self.world.max_level.max(self.progress.max_level),
        }
    }

    /// Says goodbye to every peer and returns the progress to save.
    pub fn shutdown(&mut self) -> Progress {
        let progress = self.current_progress();
        for id in self.sessions.ids() {
            if let Some(mut session) = self.sessions.remove(id) {
                session.send_disconnect(&DisconnectCause::Shutdown.to_string());
            }
        }
        self.bots.clear();
        info!(
            "Game loop stopped at tick {} (level {}, {} coins saved)",
            self.world.tick, progress.max_level, progress.coins
        );
        progress
    }
}
