//! Integration tests for the networked arena
//!
//! These tests run a real server on a loopback port and talk to it through the client
//! library, checking the protocol end to end.

use client::network::{run_bot, BotExit, WireClient};
use server::config::ServerConfig;
use server::game::WorldState;
use server::network::Server;
use shared::codec::{self, Decoded, FrameBuffer, ProtocolError, MAX_FRAME_SIZE};
use shared::protocol::{ActionFlags, AdminVerb, Message, PeerRole};
use shared::view::WorldView;
use shared::{PlayerId, Vec2, PLAYER_MAX_HEALTH};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(5);

/// Starts a server on an ephemeral port and returns its address.
async fn start_server(config: ServerConfig) -> SocketAddr {
    let config = ServerConfig {
        port: 0,
        level: Some(1),
        ..config
    };
    let mut server = assert_ok!(Server::new(config, None).await);
    let addr = server.local_addr();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

/// Feeds `client`'s messages into `view` until `done` holds or the wait runs out.
async fn poll_until(
    client: &mut WireClient,
    view: &mut WorldView,
    mut done: impl FnMut(&WorldView, &Message) -> bool,
) -> bool {
    let result = timeout(WAIT, async {
        loop {
            let messages = match client.poll().await {
                Ok(messages) => messages,
                Err(_) => return false,
            };
            // Observe the whole batch so nothing after the match is lost.
            let mut matched = false;
            for message in messages {
                view.observe(&message);
                matched |= done(view, &message);
            }
            if matched {
                return true;
            }
        }
    })
    .await;
    result.unwrap_or(false)
}

fn names(view: &WorldView) -> Vec<String> {
    view.snapshot
        .as_ref()
        .map(|s| s.players.iter().map(|p| p.name.clone()).collect())
        .unwrap_or_default()
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests that a stream of frames split at every byte decodes back in order
    #[test]
    fn byte_by_byte_stream_decodes_in_order() {
        let mut world = WorldState::new(2, 5);
        world.add_player(1, "Ann", PeerRole::Human);
        world.add_player(2, "Bot-1", PeerRole::Bot);
        world.step(&[]);
        let messages = vec![
            Message::Join {
                name: "Ann".to_string(),
            },
            Message::Input {
                seq: 7,
                move_dir: Vec2::new(0.6, -0.8),
                actions: ActionFlags {
                    fire: true,
                    timeshatter: true,
                    ..ActionFlags::default()
                },
                client_time: 99,
            },
            Message::WorldSnapshot(world.snapshot()),
            Message::Heartbeat,
            Message::AdminCommand {
                target: Some(3),
                verb: AdminVerb::SetMoney(500),
            },
        ];
        let mut stream = Vec::new();
        for message in &messages {
            codec::encode_into(message, &mut stream).unwrap();
        }

        let mut frames = FrameBuffer::new();
        let mut decoded = Vec::new();
        for byte in stream {
            frames.extend(&[byte]);
            decoded.extend(frames.drain_frames().unwrap());
        }
        assert_eq!(decoded, messages);
        assert!(frames.is_empty());
    }

    /// Tests that an oversized length prefix is rejected before any payload arrives
    #[test]
    fn oversized_frame_is_malformed() {
        let header = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        assert_eq!(
            codec::decode(&header),
            Decoded::Malformed(ProtocolError::FrameTooLarge(MAX_FRAME_SIZE + 1))
        );
    }
}

/// CLIENT-SERVER INTEGRATION TESTS
mod client_server_tests {
    use super::*;

    /// Tests the join handshake over TCP
    #[tokio::test]
    async fn join_returns_ack_with_full_snapshot() {
        let addr = start_server(ServerConfig::default()).await;
        let mut client = assert_ok!(WireClient::connect(&addr.to_string(), "Ann").await);
        let mut view = WorldView::new();

        let mut assigned: Option<PlayerId> = None;
        let acked = poll_until(&mut client, &mut view, |_, message| {
            if let Message::JoinAck { player_id, .. } = message {
                assigned = Some(*player_id);
                true
            } else {
                false
            }
        })
        .await;

        assert!(acked);
        assert_eq!(assigned, Some(1));
        let me = view.me().cloned().unwrap();
        assert_eq!(me.name, "Ann");
        assert_eq!(me.health, PLAYER_MAX_HEALTH);
        assert!(me.alive);
    }

    /// Tests that movement input is simulated and mirrored back through deltas
    #[tokio::test]
    async fn input_moves_player() {
        let addr = start_server(ServerConfig::default()).await;
        let mut client = assert_ok!(WireClient::connect(&addr.to_string(), "Ann").await);
        let mut view = WorldView::new();
        assert!(poll_until(&mut client, &mut view, |v, _| v.is_joined()).await);
        let start = view.me().map(|p| p.position).unwrap();

        assert_ok!(
            client
                .send(&Message::Input {
                    seq: 1,
                    move_dir: Vec2::new(0.0, 1.0),
                    actions: ActionFlags::default(),
                    client_time: 0,
                })
                .await
        );

        let moved = poll_until(&mut client, &mut view, |v, _| {
            v.me().map_or(false, |p| p.position.y > start.y + 20.0)
        })
        .await;
        assert!(moved);
    }

    /// Tests that an admin command sent over the wire lands before the next broadcast
    #[tokio::test]
    async fn admin_set_money_over_wire() {
        let addr = start_server(ServerConfig::default()).await;
        let mut client = assert_ok!(WireClient::connect(&addr.to_string(), "Ann").await);
        let mut view = WorldView::new();
        assert!(poll_until(&mut client, &mut view, |v, _| v.is_joined()).await);

        assert_ok!(
            client
                .send(&Message::AdminCommand {
                    target: None,
                    verb: AdminVerb::SetMoney(500),
                })
                .await
        );
        let paid = poll_until(&mut client, &mut view, |v, _| {
            v.me().map_or(false, |p| p.coins == 500)
        })
        .await;
        assert!(paid);
    }

    /// Tests that sessions beyond capacity are turned away with a reason
    #[tokio::test]
    async fn full_server_sends_disconnect() {
        let addr = start_server(ServerConfig {
            max_players: 1,
            ..ServerConfig::default()
        })
        .await;
        let mut first = assert_ok!(WireClient::connect(&addr.to_string(), "Ann").await);
        let mut first_view = WorldView::new();
        assert!(poll_until(&mut first, &mut first_view, |v, _| v.is_joined()).await);

        let mut second = assert_ok!(WireClient::connect(&addr.to_string(), "Bob").await);
        let mut second_view = WorldView::new();
        let rejected = poll_until(&mut second, &mut second_view, |_, message| {
            matches!(message, Message::Disconnect { reason } if reason == "server full")
        })
        .await;
        assert!(rejected);
        assert!(!second_view.is_joined());
    }
}

/// BOT INTEGRATION TESTS
mod bot_tests {
    use super::*;

    /// Tests that embedded bots are visible to a wire client
    #[tokio::test]
    async fn embedded_bots_appear_in_snapshots() {
        let addr = start_server(ServerConfig {
            bots: 2,
            ..ServerConfig::default()
        })
        .await;
        let mut client = assert_ok!(WireClient::connect(&addr.to_string(), "Ann").await);
        let mut view = WorldView::new();

        let seen = poll_until(&mut client, &mut view, |v, _| {
            let names = names(v);
            names.contains(&"Bot_1".to_string()) && names.contains(&"Bot_2".to_string())
        })
        .await;
        assert!(seen);
        assert_eq!(view.player_id, Some(3));
    }

    /// Tests a standalone bot joining over TCP and leaving cleanly
    #[tokio::test]
    async fn wire_bot_joins_and_leaves() {
        let addr = start_server(ServerConfig::default()).await;
        let mut observer = assert_ok!(WireClient::connect(&addr.to_string(), "Watcher").await);
        let mut view = WorldView::new();
        assert!(poll_until(&mut observer, &mut view, |v, _| v.is_joined()).await);

        let (stop_tx, stop_rx) = watch::channel(false);
        let bot_addr = addr.to_string();
        let bot = tokio::spawn(async move { run_bot(&bot_addr, "Scout", 11, stop_rx).await });

        let joined = poll_until(&mut observer, &mut view, |v, _| {
            names(v).contains(&"Scout".to_string())
        })
        .await;
        assert!(joined);

        // Keep the observer alive while the bot plays for a moment.
        assert_ok!(observer.send(&Message::Heartbeat).await);
        stop_tx.send(true).unwrap();
        let exit = bot.await.unwrap().unwrap();
        assert_eq!(exit, BotExit::Stopped);

        let left = poll_until(&mut observer, &mut view, |v, _| {
            !names(v).contains(&"Scout".to_string())
        })
        .await;
        assert!(left);
    }
}
