//! Server network layer: TCP listener, per-connection socket tasks and the tick timer.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::game_loop::{Connection, GameLoop};
use crate::persistence::{Progress, ProgressStore};
use crate::session::ReadEvent;
use log::{debug, error, info, warn};
use shared::TICK_RATE;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

const READ_BUFFER_SIZE: usize = 4096;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    /// The listener failed in a way it cannot recover from.
    AcceptFailed(std::io::Error),
}

/// Main server coordinating the listener, the socket tasks and the tick loop
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    game_loop: GameLoop,
    config: ServerConfig,
    store: Option<Arc<dyn ProgressStore>>,
    saves: Option<mpsc::UnboundedSender<Progress>>,
    writer: Option<JoinHandle<()>>,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the listener and builds the game loop, resuming from `store` if given.
    pub async fn new(
        config: ServerConfig,
        store: Option<Box<dyn ProgressStore>>,
    ) -> Result<Self, ServerError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        info!("Server listening on {}", local_addr);

        let progress = match &store {
            Some(store) => store.load()?,
            None => Default::default(),
        };
        let game_loop = GameLoop::new(config.clone(), progress);
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let store: Option<Arc<dyn ProgressStore>> = store.map(Arc::from);
        let (saves, writer) = match &store {
            Some(store) => {
                let (saves, writer) = spawn_progress_writer(Arc::clone(store));
                (Some(saves), Some(writer))
            }
            None => (None, None),
        };

        Ok(Server {
            listener: Some(listener),
            local_addr,
            game_loop,
            config,
            store,
            saves,
            writer,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn game_loop(&self) -> &GameLoop {
        &self.game_loop
    }

    /// Spawns task that accepts connections and hands them to the loop
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let connections = self.game_loop.connection_sender();
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let connection = spawn_connection(stream, addr);
                        if connections.send(connection).is_err() {
                            debug!("Game loop gone, acceptor stopping");
                            break;
                        }
                    }
                    Err(e) if is_transient(&e) => {
                        warn!("Transient accept error: {}", e);
                    }
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        let _ = server_tx.send(ServerMessage::AcceptFailed(e));
                        break;
                    }
                }
            }
        });
    }

    /// Queues a save if a store is configured. The tick loop never waits on the disk.
    fn save_progress(&self) {
        let Some(saves) = &self.saves else {
            return;
        };
        if saves.send(self.game_loop.current_progress()).is_err() {
            warn!("Progress writer gone, save dropped");
        }
    }

    /// Waits until every queued save has been written.
    async fn flush_progress(&mut self) {
        self.saves = None;
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                error!("Progress writer failed: {}", e);
            }
        }
    }

    /// Main server loop: one `run_tick` per interval until ctrl-c or a fatal error
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_acceptor();

        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_report = Instant::now();

        info!(
            "Server started: {} Hz, up to {} players, {} bots",
            TICK_RATE, self.config.max_players, self.config.bots
        );

        let result = loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::AcceptFailed(e)) => break Err(ServerError::Accept(e)),
                        None => {
                            info!("Server shutting down");
                            break Ok(());
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let started = Instant::now();
                    let events = self.game_loop.run_tick();
                    let elapsed = started.elapsed();
                    if elapsed > self.config.tick_duration() {
                        warn!("Tick {} overran: {:?}", self.game_loop.world().tick, elapsed);
                    }

                    if events.fight_ended.is_some() || events.level_started.is_some() {
                        self.save_progress();
                    }

                    if last_report.elapsed().as_secs() >= 10 {
                        last_report = Instant::now();
                        debug!(
                            "Tick {}: {} sessions, last tick took {:?}",
                            self.game_loop.world().tick,
                            self.game_loop.session_count(),
                            elapsed
                        );
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down gracefully");
                    break Ok(());
                }
            }
        };

        let progress = self.game_loop.shutdown();
        self.flush_progress().await;
        if let Some(store) = self.store.clone() {
            tokio::task::spawn_blocking(move || store.save(&progress)).await??;
        }
        result
    }
}

/// Writes queued progress on the blocking pool, one save at a time and in order.
fn spawn_progress_writer(
    store: Arc<dyn ProgressStore>,
) -> (mpsc::UnboundedSender<Progress>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
    let writer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            let store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || store.save(&progress)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Failed to save progress: {}", e),
                Err(e) => error!("Save task failed: {}", e),
            }
        }
        debug!("Progress writer finished");
    });
    (tx, writer)
}

/// Splits `stream` into reader and writer tasks joined to the loop by channels.
fn spawn_connection(stream: TcpStream, addr: SocketAddr) -> Connection {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
    }
    let (reader, writer) = stream.into_split();
    let (in_tx, inbound) = mpsc::unbounded_channel();
    let (outbound, out_rx) = mpsc::unbounded_channel();

    tokio::spawn(read_task(reader, addr, in_tx));
    tokio::spawn(write_task(writer, addr, out_rx));

    Connection {
        addr,
        inbound,
        outbound,
    }
}

async fn read_task(
    mut reader: OwnedReadHalf,
    addr: SocketAddr,
    tx: mpsc::UnboundedSender<ReadEvent>,
) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        let event = match reader.read(&mut buffer).await {
            Ok(0) => ReadEvent::Closed,
            Ok(n) => ReadEvent::Data(buffer[..n].to_vec()),
            Err(e) => ReadEvent::Error(e.to_string()),
        };
        let done = !matches!(event, ReadEvent::Data(_));
        if tx.send(event).is_err() || done {
            break;
        }
    }
    debug!("Reader for {} finished", addr);
}

async fn write_task(
    mut writer: OwnedWriteHalf,
    addr: SocketAddr,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            warn!("Write to {} failed: {}", addr, e);
            return;
        }
    }
    // Session dropped: whatever was queued has been written.
    let _ = writer.shutdown().await;
    debug!("Writer for {} finished", addr);
}

/// Errors after which the listener can keep accepting.
fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}
