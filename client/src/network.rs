use log::{debug, info, warn};
use shared::bot::BotController;
use shared::codec::{self, FrameBuffer};
use shared::protocol::Message;
use shared::TICK_DT;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const READ_BUFFER_SIZE: usize = 4096;

/// A framed TCP connection to the server.
pub struct WireClient {
    stream: TcpStream,
    frames: FrameBuffer,
    buffer: Vec<u8>,
}

impl WireClient {
    /// Connects and sends `Join{name}`. The `JoinAck` arrives through [`poll`](Self::poll).
    pub async fn connect(addr: &str, name: &str) -> Result<Self, BoxError> {
        info!("Connecting to {} as {}", addr, name);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let mut client = WireClient {
            stream,
            frames: FrameBuffer::new(),
            buffer: vec![0u8; READ_BUFFER_SIZE],
        };
        client
            .send(&Message::Join {
                name: name.to_string(),
            })
            .await?;
        Ok(client)
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), BoxError> {
        let frame = codec::encode(message)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    /// Waits for the next read and returns every complete frame it finished.
    ///
    /// Cancel safe: partial frames stay buffered until the next call.
    pub async fn poll(&mut self) -> Result<Vec<Message>, BoxError> {
        let n = self.stream.read(&mut self.buffer).await?;
        if n == 0 {
            return Err("server closed the connection".into());
        }
        self.frames.extend(&self.buffer[..n]);
        Ok(self.frames.drain_frames()?)
    }
}

/// How a bot's session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum BotExit {
    /// The server sent `Disconnect` with this reason.
    Disconnected(String),
    /// Local shutdown was requested.
    Stopped,
}

/// Drives one bot over the wire until the server drops it or `shutdown` fires.
///
/// The bot answers at the tick rate; ticks where it has nothing to say (not yet joined)
/// send a `Heartbeat` so the session does not time out.
pub async fn run_bot(
    addr: &str,
    name: &str,
    seed: u64,
    mut shutdown: watch::Receiver<bool>,
) -> Result<BotExit, BoxError> {
    let mut client = WireClient::connect(addr, name).await?;
    let mut bot = BotController::new(name, seed);
    info!(
        "Bot {} ready (aggression {:.2}, dodge {:.2})",
        name,
        bot.personality().aggression,
        bot.personality().dodge_skill
    );

    let mut ticker = interval(Duration::from_secs_f32(TICK_DT));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            result = client.poll() => {
                for message in result? {
                    if let Message::Disconnect { reason } = &message {
                        warn!("Bot {} disconnected: {}", name, reason);
                        return Ok(BotExit::Disconnected(reason.clone()));
                    }
                    if let Message::JoinAck { player_id, .. } = &message {
                        info!("Bot {} joined as player {}", name, player_id);
                    }
                    bot.observe(&message);
                }
            },

            _ = ticker.tick() => {
                let message = bot.decide().unwrap_or(Message::Heartbeat);
                client.send(&message).await?;
            },

            _ = shutdown.changed() => {
                debug!("Bot {} stopping", name);
                let _ = client
                    .send(&Message::Disconnect {
                        reason: "bot stopped".to_string(),
                    })
                    .await;
                return Ok(BotExit::Stopped);
            },
        }
    }
}

/// Names for a swarm: `name` alone for one bot, otherwise `name_1`, `name_2`, ...
pub fn bot_names(name: &str, count: usize) -> Vec<String> {
    match count {
        0 => Vec::new(),
        1 => vec![name.to_string()],
        _ => (1..=count).map(|i| format!("{}_{}", name, i)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_bot_names() {
        assert_eq!(bot_names("TestBot", 1), vec!["TestBot"]);
        assert_eq!(bot_names("TestBot", 3), vec!["TestBot_1", "TestBot_2", "TestBot_3"]);
        assert!(bot_names("TestBot", 0).is_empty());
    }

    #[tokio::test]
    async fn test_bot_joins_and_honours_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frames = FrameBuffer::new();
            let mut buffer = [0u8; 256];
            let first = loop {
                let n = stream.read(&mut buffer).await.unwrap();
                frames.extend(&buffer[..n]);
                if let Some(message) = frames.drain_frames().unwrap().into_iter().next() {
                    break message;
                }
            };
            let goodbye = codec::encode(&Message::Disconnect {
                reason: "server full".to_string(),
            })
            .unwrap();
            stream.write_all(&goodbye).await.unwrap();
            first
        });

        let (_tx, rx) = watch::channel(false);
        let exit = run_bot(&addr, "Scout", 1, rx).await.unwrap();
        assert_eq!(exit, BotExit::Disconnected("server full".to_string()));
        assert_eq!(
            server.await.unwrap(),
            Message::Join {
                name: "Scout".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_shutdown_sends_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = watch::channel(false);

        let bot = tokio::spawn(async move { run_bot(&addr, "Scout", 2, rx).await.unwrap() });
        let (mut stream, _) = listener.accept().await.unwrap();
        tx.send(true).unwrap();
        assert_eq!(bot.await.unwrap(), BotExit::Stopped);

        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await.unwrap();
        let mut frames = FrameBuffer::new();
        frames.extend(&bytes);
        let messages = frames.drain_frames().unwrap();
        assert!(matches!(messages.first(), Some(Message::Join { .. })));
        assert!(matches!(messages.last(), Some(Message::Disconnect { .. })));
    }
}
