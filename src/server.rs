//! ChatServer Actor implementation
//!
//! The central actor that owns all realtime state: connected clients, the
//! presence registry and the typing registry. Sessions never touch this
//! state directly; they send `ServerCommand`s over an mpsc channel.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::message::ServerMessage;
use crate::presence::PresenceRegistry;
use crate::relay::ChatMessage;
use crate::store::ReadReceipt;
use crate::typing::TypingRegistry;
use crate::types::{ClientId, RoomName};

/// Default inactivity window after which a typing flag is cleared
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(5);

/// Lower bound for the typing sweep period
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(10);

/// Commands sent from sessions to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New client connected
    Connect {
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Client disconnected
    Disconnect { client_id: ClientId },
    /// Subscribe to a room under a username
    Join {
        client_id: ClientId,
        username: String,
        room: RoomName,
    },
    /// History for a fresh join; releases events held back since `Join`.
    /// None when loading failed.
    History {
        client_id: ClientId,
        history: Option<Vec<ChatMessage>>,
    },
    /// Leave the current room
    Leave { client_id: ClientId },
    /// Typing started or stopped
    Typing {
        client_id: ClientId,
        room: RoomName,
        is_typing: bool,
    },
    /// Broadcast a stored message to the room
    Publish { room: RoomName, message: ChatMessage },
    /// Relay a read receipt to the reporter's room
    Read {
        client_id: ClientId,
        receipt: ReadReceipt,
    },
}

/// The main ChatServer actor
///
/// Manages all state and processes commands from client sessions.
pub struct ChatServer {
    /// All connected clients: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Room membership and subscriptions
    presence: PresenceRegistry,
    /// Who is typing where
    typing: TypingRegistry,
    /// Events held back for joins still waiting on their history
    pending: HashMap<ClientId, Vec<ServerMessage>>,
    /// None disables server-side typing expiry
    typing_timeout: Option<Duration>,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            clients: HashMap::new(),
            presence: PresenceRegistry::new(),
            typing: TypingRegistry::new(),
            pending: HashMap::new(),
            typing_timeout: Some(DEFAULT_TYPING_TIMEOUT),
            receiver,
        }
    }

    pub fn with_typing_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.typing_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are
    /// dropped, sweeping expired typing flags in between.
    pub async fn run(mut self) {
        info!("ChatServer started");

        let period = self
            .typing_timeout
            .map(|t| (t / 4).max(MIN_SWEEP_PERIOD))
            .unwrap_or(Duration::from_secs(1));
        let mut sweep = tokio::time::interval(period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                _ = sweep.tick(), if self.typing_timeout.is_some() => {
                    self.expire_typing().await;
                }
            }
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { client_id, sender } => {
                self.handle_connect(client_id, sender);
            }
            ServerCommand::Disconnect { client_id } => {
                self.handle_disconnect(client_id).await;
            }
            ServerCommand::Join {
                client_id,
                username,
                room,
            } => {
                self.handle_join(client_id, username, room).await;
            }
            ServerCommand::History { client_id, history } => {
                self.handle_history(client_id, history).await;
            }
            ServerCommand::Leave { client_id } => {
                self.leave_current_room(client_id).await;
            }
            ServerCommand::Typing {
                client_id,
                room,
                is_typing,
            } => {
                self.handle_typing(client_id, room, is_typing).await;
            }
            ServerCommand::Publish { room, message } => {
                self.broadcast(&room, ServerMessage::Message(message), None)
                    .await;
            }
            ServerCommand::Read { client_id, receipt } => {
                self.handle_read(client_id, receipt).await;
            }
        }
    }

    /// Handle new client connection
    fn handle_connect(&mut self, client_id: ClientId, sender: mpsc::Sender<ServerMessage>) {
        self.clients.insert(client_id, Client::new(client_id, sender));
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.presence.room_count()
        );
    }

    /// Handle client disconnection
    async fn handle_disconnect(&mut self, client_id: ClientId) {
        self.leave_current_room(client_id).await;
        self.pending.remove(&client_id);
        self.clients.remove(&client_id);

        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.presence.room_count()
        );
    }

    /// Handle room joining
    async fn handle_join(&mut self, client_id: ClientId, username: String, room: RoomName) {
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };

        let rejoin = client.room.as_ref() == Some(&room)
            && client.username.as_deref() == Some(username.as_str());
        if client.room.is_some() && !rejoin {
            self.leave_current_room(client_id).await;
        }

        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };
        client.enter(username.clone(), room.clone());
        self.pending.insert(client_id, Vec::new());

        let members = self.presence.join(&room, client_id, &username);
        info!("{} ({}) joined room {}", username, client_id, room);

        self.broadcast(&room, ServerMessage::UserListUpdate(members), None)
            .await;
    }

    /// Send the join history, then whatever arrived while it was loading
    async fn handle_history(&mut self, client_id: ClientId, history: Option<Vec<ChatMessage>>) {
        let backlog = self.pending.remove(&client_id).unwrap_or_default();
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };

        let mut seen = HashSet::new();
        if let Some(history) = history {
            seen.extend(history.iter().map(|m| m.id));
            let _ = client.send(ServerMessage::History(history)).await;
        }

        for msg in backlog {
            if matches!(&msg, ServerMessage::Message(m) if seen.contains(&m.id)) {
                continue;
            }
            if client.send(msg).await.is_err() {
                debug!("Client {} channel closed, skipping", client.display_name());
                break;
            }
        }
    }

    /// Leave the client's room: clear typing, drop membership, notify the rest
    async fn leave_current_room(&mut self, client_id: ClientId) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };
        let Some((username, room)) = client.exit() else {
            return;
        };

        info!("{} ({}) left room {}", username, client_id, room);

        self.typing.clear(&room, &username);
        self.broadcast(&room, ServerMessage::typing(&username, false), Some(client_id))
            .await;

        if let Some(members) = self.presence.leave(&room, client_id, &username) {
            self.broadcast(&room, ServerMessage::UserListUpdate(members), None)
                .await;
        }
    }

    /// Handle a typing signal, relayed to everyone in the room but the sender
    async fn handle_typing(&mut self, client_id: ClientId, room: RoomName, is_typing: bool) {
        let Some(client) = self.clients.get(&client_id) else {
            return;
        };
        let Some(username) = client.username.clone().filter(|_| client.room.is_some()) else {
            debug!("Typing signal from {} outside a room, ignored", client_id);
            return;
        };
        if client.room.as_ref() != Some(&room) {
            warn!("{} sent typing for {} while in another room, dropped", username, room);
            return;
        }

        self.typing.set(&room, &username, is_typing, Instant::now());
        self.broadcast(&room, ServerMessage::typing(username, is_typing), Some(client_id))
            .await;
    }

    /// Relay a stored read receipt to the reporter's room
    async fn handle_read(&mut self, client_id: ClientId, receipt: ReadReceipt) {
        let Some(room) = self.clients.get(&client_id).and_then(|c| c.room.clone()) else {
            debug!("Read receipt from {} outside a room, not relayed", client_id);
            return;
        };

        self.broadcast(&room, receipt.into(), Some(client_id)).await;
    }

    /// Clear typing flags older than the timeout and tell their rooms
    async fn expire_typing(&mut self) {
        let Some(timeout) = self.typing_timeout else {
            return;
        };

        for (room, username) in self.typing.expire(Instant::now(), timeout) {
            debug!("Typing flag of {} in {} expired", username, room);
            let typer = self
                .presence
                .subscribers(&room)
                .into_iter()
                .find(|id| {
                    self.clients
                        .get(id)
                        .is_some_and(|c| c.username.as_deref() == Some(username.as_str()))
                });
            self.broadcast(&room, ServerMessage::typing(username, false), typer)
                .await;
        }
    }

    /// Helper: send a message to every subscriber of a room
    async fn broadcast(&mut self, room: &RoomName, msg: ServerMessage, except: Option<ClientId>) {
        for client_id in self.presence.subscribers(room) {
            if Some(client_id) == except {
                continue;
            }
            if let Some(backlog) = self.pending.get_mut(&client_id) {
                backlog.push(msg.clone());
                continue;
            }
            if let Some(client) = self.clients.get(&client_id) {
                if client.send(msg.clone()).await.is_err() {
                    debug!("Client {} channel closed, skipping", client.display_name());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        cmd_tx: mpsc::Sender<ServerCommand>,
    }

    impl Harness {
        fn start(typing_timeout: Option<Duration>) -> Self {
            let (cmd_tx, cmd_rx) = mpsc::channel(64);
            tokio::spawn(ChatServer::new(cmd_rx).with_typing_timeout(typing_timeout).run());
            Self { cmd_tx }
        }

        async fn connect(&self) -> (ClientId, mpsc::Receiver<ServerMessage>) {
            let client_id = ClientId::new();
            let (sender, rx) = mpsc::channel(64);
            self.send(ServerCommand::Connect { client_id, sender }).await;
            (client_id, rx)
        }

        async fn join(&self, client_id: ClientId, username: &str, room: &str) {
            self.join_pending(client_id, username, room).await;
            self.send(ServerCommand::History {
                client_id,
                history: None,
            })
            .await;
        }

        /// Join without releasing the history yet
        async fn join_pending(&self, client_id: ClientId, username: &str, room: &str) {
            self.send(ServerCommand::Join {
                client_id,
                username: username.to_string(),
                room: RoomName::from(room),
            })
            .await;
        }

        async fn send(&self, cmd: ServerCommand) {
            self.cmd_tx.send(cmd).await.unwrap();
        }
    }

    async fn next(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed")
    }

    fn users(names: &[&str]) -> ServerMessage {
        ServerMessage::UserListUpdate(names.iter().map(|n| n.to_string()).collect())
    }

    #[tokio::test]
    async fn test_join_broadcasts_member_list() {
        let server = Harness::start(None);
        let (a, mut a_rx) = server.connect().await;
        let (b, mut b_rx) = server.connect().await;

        server.join(a, "A", "r1").await;
        assert_eq!(next(&mut a_rx).await, users(&["A"]));

        server.join(b, "B", "r1").await;
        assert_eq!(next(&mut a_rx).await, users(&["A", "B"]));
        assert_eq!(next(&mut b_rx).await, users(&["A", "B"]));
    }

    #[tokio::test]
    async fn test_leave_notifies_remaining_members() {
        let server = Harness::start(None);
        let (a, mut a_rx) = server.connect().await;
        let (b, mut b_rx) = server.connect().await;
        server.join(a, "A", "r1").await;
        server.join(b, "B", "r1").await;
        next(&mut a_rx).await;
        next(&mut a_rx).await;
        next(&mut b_rx).await;

        server.send(ServerCommand::Leave { client_id: a }).await;
        assert_eq!(next(&mut b_rx).await, ServerMessage::typing("A", false));
        assert_eq!(next(&mut b_rx).await, users(&["B"]));

        // A no longer hears the room
        server.join(b, "B", "r1").await;
        assert_eq!(next(&mut b_rx).await, users(&["B"]));
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_behaves_like_leave() {
        let server = Harness::start(None);
        let (a, _a_rx) = server.connect().await;
        let (b, mut b_rx) = server.connect().await;
        server.join(b, "B", "r1").await;
        server.join(a, "A", "r1").await;
        next(&mut b_rx).await;
        next(&mut b_rx).await;

        server.send(ServerCommand::Disconnect { client_id: a }).await;
        assert_eq!(next(&mut b_rx).await, ServerMessage::typing("A", false));
        assert_eq!(next(&mut b_rx).await, users(&["B"]));
    }

    #[tokio::test]
    async fn test_joining_another_room_leaves_the_first() {
        let server = Harness::start(None);
        let (a, mut a_rx) = server.connect().await;
        let (b, mut b_rx) = server.connect().await;
        server.join(a, "A", "r1").await;
        server.join(b, "B", "r1").await;
        next(&mut a_rx).await;
        next(&mut a_rx).await;
        next(&mut b_rx).await;

        server.join(a, "A", "r2").await;
        assert_eq!(next(&mut b_rx).await, ServerMessage::typing("A", false));
        assert_eq!(next(&mut b_rx).await, users(&["B"]));
        assert_eq!(next(&mut a_rx).await, users(&["A"]));
    }

    #[tokio::test]
    async fn test_typing_excludes_sender() {
        let server = Harness::start(None);
        let (a, mut a_rx) = server.connect().await;
        let (b, mut b_rx) = server.connect().await;
        server.join(a, "A", "r1").await;
        server.join(b, "B", "r1").await;
        next(&mut a_rx).await;
        next(&mut a_rx).await;
        next(&mut b_rx).await;

        server
            .send(ServerCommand::Typing {
                client_id: a,
                room: RoomName::from("r1"),
                is_typing: true,
            })
            .await;
        assert_eq!(next(&mut b_rx).await, ServerMessage::typing("A", true));

        // flush the actor, then check A heard nothing
        server.join(b, "B", "r1").await;
        assert_eq!(next(&mut a_rx).await, users(&["A", "B"]));
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_typing_in_one_room_not_seen_in_another() {
        let server = Harness::start(None);
        let (a, mut a_rx) = server.connect().await;
        let (c, mut c_rx) = server.connect().await;
        server.join(a, "A", "r1").await;
        server.join(c, "C", "r2").await;
        next(&mut a_rx).await;
        next(&mut c_rx).await;

        server
            .send(ServerCommand::Typing {
                client_id: a,
                room: RoomName::from("r1"),
                is_typing: true,
            })
            .await;

        server.join(c, "C", "r2").await;
        assert_eq!(next(&mut c_rx).await, users(&["C"]));
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_typing_for_a_room_not_joined_is_dropped() {
        let server = Harness::start(None);
        let (a, mut a_rx) = server.connect().await;
        let (c, mut c_rx) = server.connect().await;
        server.join(a, "A", "r1").await;
        server.join(c, "C", "r2").await;
        next(&mut a_rx).await;
        next(&mut c_rx).await;

        server
            .send(ServerCommand::Typing {
                client_id: a,
                room: RoomName::from("r2"),
                is_typing: true,
            })
            .await;
        server.send(ServerCommand::Disconnect { client_id: a }).await;

        // flush the actor, then check r2 heard nothing from A
        server.join(c, "C", "r2").await;
        assert_eq!(next(&mut c_rx).await, users(&["C"]));
        assert!(c_rx.try_recv().is_err());
    }

    fn chat_message(id: i64, text: &str) -> ChatMessage {
        ChatMessage {
            id,
            user: "B".to_string(),
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
            read_by: vec![],
        }
    }

    #[tokio::test]
    async fn test_messages_during_join_follow_history() {
        let server = Harness::start(None);
        let (a, mut a_rx) = server.connect().await;
        server.join_pending(a, "A", "r1").await;

        let live = chat_message(7, "meanwhile");
        server
            .send(ServerCommand::Publish {
                room: RoomName::from("r1"),
                message: live.clone(),
            })
            .await;
        server
            .send(ServerCommand::History {
                client_id: a,
                history: Some(vec![]),
            })
            .await;

        assert_eq!(next(&mut a_rx).await, ServerMessage::History(vec![]));
        assert_eq!(next(&mut a_rx).await, users(&["A"]));
        assert_eq!(next(&mut a_rx).await, ServerMessage::Message(live));
    }

    #[tokio::test]
    async fn test_held_message_already_in_history_is_not_repeated() {
        let server = Harness::start(None);
        let (a, mut a_rx) = server.connect().await;
        server.join_pending(a, "A", "r1").await;

        let first = chat_message(1, "first");
        server
            .send(ServerCommand::Publish {
                room: RoomName::from("r1"),
                message: first.clone(),
            })
            .await;
        server
            .send(ServerCommand::History {
                client_id: a,
                history: Some(vec![first.clone()]),
            })
            .await;

        let second = chat_message(2, "second");
        server
            .send(ServerCommand::Publish {
                room: RoomName::from("r1"),
                message: second.clone(),
            })
            .await;

        assert_eq!(next(&mut a_rx).await, ServerMessage::History(vec![first]));
        assert_eq!(next(&mut a_rx).await, users(&["A"]));
        assert_eq!(next(&mut a_rx).await, ServerMessage::Message(second));
    }

    #[tokio::test]
    async fn test_typing_flag_expires() {
        let server = Harness::start(Some(Duration::from_millis(100)));
        let (a, mut a_rx) = server.connect().await;
        let (b, mut b_rx) = server.connect().await;
        server.join(a, "A", "r1").await;
        server.join(b, "B", "r1").await;
        next(&mut a_rx).await;
        next(&mut a_rx).await;
        next(&mut b_rx).await;

        server
            .send(ServerCommand::Typing {
                client_id: a,
                room: RoomName::from("r1"),
                is_typing: true,
            })
            .await;
        assert_eq!(next(&mut b_rx).await, ServerMessage::typing("A", true));
        assert_eq!(next(&mut b_rx).await, ServerMessage::typing("A", false));
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let server = Harness::start(None);
        let (a, mut a_rx) = server.connect().await;
        let (b, mut b_rx) = server.connect().await;
        server.join(a, "A", "r1").await;
        server.join(b, "B", "r1").await;
        next(&mut a_rx).await;
        next(&mut a_rx).await;
        next(&mut b_rx).await;

        let message = ChatMessage {
            id: 1,
            user: "A".to_string(),
            text: "hello".to_string(),
            timestamp: chrono::Utc::now(),
            read_by: vec![],
        };
        server
            .send(ServerCommand::Publish {
                room: RoomName::from("r1"),
                message: message.clone(),
            })
            .await;

        assert_eq!(next(&mut a_rx).await, ServerMessage::Message(message.clone()));
        assert_eq!(next(&mut b_rx).await, ServerMessage::Message(message));
    }

    #[tokio::test]
    async fn test_read_receipt_skips_reporter() {
        let server = Harness::start(None);
        let (a, mut a_rx) = server.connect().await;
        let (b, mut b_rx) = server.connect().await;
        server.join(a, "A", "r1").await;
        server.join(b, "B", "r1").await;
        next(&mut a_rx).await;
        next(&mut a_rx).await;
        next(&mut b_rx).await;

        let receipt = ReadReceipt {
            message_id: 1,
            username: "B".to_string(),
            read_at: chrono::Utc::now(),
        };
        server
            .send(ServerCommand::Read {
                client_id: b,
                receipt: receipt.clone(),
            })
            .await;

        assert_eq!(next(&mut a_rx).await, ServerMessage::from(receipt));
        server.join(a, "A", "r1").await;
        assert_eq!(next(&mut b_rx).await, users(&["A", "B"]));
        assert!(b_rx.try_recv().is_err());
    }
}
