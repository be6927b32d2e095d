//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, event
//! parsing, persistence calls and communication with the ChatServer.
//! Events of one connection are processed strictly in order; each one,
//! including its store call, completes before the next frame is read.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::receipts;
use crate::relay;
use crate::server::ServerCommand;
use crate::store::ChatStore;
use crate::types::{ClientId, RoomName};

/// Outbound queue size per connection
const CLIENT_BUFFER_SIZE: usize = 32;

/// Accept realtime connections until the listener fails
pub async fn serve(
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ServerCommand>,
    store: Arc<dyn ChatStore>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();
                let store = store.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, cmd_tx, store).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    store: Arc<dyn ChatStore>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    // Channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_BUFFER_SIZE);

    // Register with ChatServer
    if cmd_tx
        .send(ServerCommand::Connect {
            client_id,
            sender: msg_tx.clone(),
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - server closed", client_id);
        return Err(AppError::ChannelSend);
    }

    let mut session = Session::new(client_id, cmd_tx.clone(), msg_tx, store);

    // Read task (WebSocket -> Session)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        if let Err(e) = session.dispatch(client_msg).await {
                            debug!("Session for {} ended: {}", client_id, e);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Invalid event from {}: {}", client_id, e);
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", client_id);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pong replies are handled by tungstenite
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }

        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", client_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", client_id);
        }
    }

    let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Per-connection event processing
///
/// Mirrors the (username, room) pair the ChatServer holds for this
/// connection so that store calls can be made without a round trip.
pub struct Session {
    client_id: ClientId,
    cmd_tx: mpsc::Sender<ServerCommand>,
    msg_tx: mpsc::Sender<ServerMessage>,
    store: Arc<dyn ChatStore>,
    username: Option<String>,
    room: Option<RoomName>,
}

impl Session {
    pub fn new(
        client_id: ClientId,
        cmd_tx: mpsc::Sender<ServerCommand>,
        msg_tx: mpsc::Sender<ServerMessage>,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        Self {
            client_id,
            cmd_tx,
            msg_tx,
            store,
            username: None,
            room: None,
        }
    }

    /// Handle one inbound event
    ///
    /// Business errors are reported to the client as `error` events and
    /// store failures are logged; only a broken channel is returned.
    pub async fn dispatch(&mut self, msg: ClientMessage) -> Result<(), AppError> {
        let result = match msg {
            ClientMessage::Join { username, room } => self.join(username, RoomName(room)).await,
            ClientMessage::Leave => self.leave().await,
            ClientMessage::Typing { room, is_typing } => {
                self.command(ServerCommand::Typing {
                    client_id: self.client_id,
                    room,
                    is_typing,
                })
                .await
            }
            ClientMessage::Message { room, text } => self.message(room, text).await,
            ClientMessage::MarkAsRead {
                message_id,
                username,
            } => self.mark_as_read(message_id, username).await,
        };

        match result {
            Err(e) if e.is_client_facing() => {
                debug!("Rejected event from {}: {}", self.client_id, e);
                self.reply(e.into()).await
            }
            Err(AppError::Store(e)) => {
                error!("Store error for {}: {}", self.client_id, e);
                Ok(())
            }
            other => other,
        }
    }

    async fn join(&mut self, username: String, room: RoomName) -> Result<(), AppError> {
        let username = username.trim().to_string();
        if username.is_empty() || room.is_empty() {
            return Err(AppError::MissingJoinFields);
        }

        self.username = Some(username.clone());
        self.room = Some(room.clone());

        // Subscribed first; the server holds this connection's events
        // until the history below arrives.
        self.command(ServerCommand::Join {
            client_id: self.client_id,
            username,
            room: room.clone(),
        })
        .await?;

        let history = match relay::get_history(self.store.as_ref(), &room).await {
            Ok(history) => Some(history),
            Err(e) => {
                error!("Failed to load history of {}: {}", room, e);
                None
            }
        };

        self.command(ServerCommand::History {
            client_id: self.client_id,
            history,
        })
        .await
    }

    async fn leave(&mut self) -> Result<(), AppError> {
        self.room = None;
        self.command(ServerCommand::Leave {
            client_id: self.client_id,
        })
        .await
    }

    async fn message(&mut self, room: RoomName, text: String) -> Result<(), AppError> {
        let Some(author) = self.username.clone().filter(|_| self.room.as_ref() == Some(&room)) else {
            if self.room.is_some() {
                warn!("{} posted to {} without joining it", self.client_id, room);
            }
            return Err(AppError::JoinRequired);
        };

        let message = relay::create_message(self.store.as_ref(), &room, &text, &author).await?;
        debug!("Message {} stored in {}", message.id, room);

        self.command(ServerCommand::Publish { room, message }).await
    }

    async fn mark_as_read(&mut self, message_id: i64, username: String) -> Result<(), AppError> {
        let receipt = receipts::mark_as_read(self.store.as_ref(), message_id, &username).await?;

        self.command(ServerCommand::Read {
            client_id: self.client_id,
            receipt,
        })
        .await
    }

    async fn command(&self, cmd: ServerCommand) -> Result<(), AppError> {
        self.cmd_tx.send(cmd).await.map_err(|_| AppError::ChannelSend)
    }

    async fn reply(&self, msg: ServerMessage) -> Result<(), AppError> {
        self.msg_tx.send(msg).await.map_err(|_| AppError::ChannelSend)
    }
}
