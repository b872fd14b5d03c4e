//! WebSocket upgrade handler and per-connection session

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{GameError, GameServer};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Outbound queue depth per connection
const OUTBOUND_CAPACITY: usize = 128;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_CAPACITY);

    let mut session = Session::new(state.game.clone(), out_tx);
    let session_id = session.id;
    info!(session_id = %session_id, "New WebSocket connection");

    // Writer task: session queue -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    session
        .send(ServerMsg::Welcome {
            server_time: unix_millis(),
        })
        .await;

    let rate_limiter = ConnectionRateLimiter::new();

    // Reader loop: WebSocket -> game server
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check() {
                    warn!(session_id = %session_id, "Rate limited client message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => session.dispatch(client_msg).await,
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                        session
                            .send(ServerMsg::RoomError {
                                code: "invalid_request".to_string(),
                                message: format!("Malformed message: {}", e),
                            })
                            .await;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Players outlive their connection: the web client reconnects on every
    // page change and resumes with the same player id.
    drop(session);
    writer_handle.abort();

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

/// One client connection: routes requests to the game server and forwards the
/// lobby and followed rooms' broadcasts into the connection's outbound queue.
pub struct Session {
    id: Uuid,
    game: Arc<GameServer>,
    out: mpsc::Sender<ServerMsg>,
    lobby: JoinHandle<()>,
    rooms: HashMap<Uuid, JoinHandle<()>>,
}

impl Session {
    pub fn new(game: Arc<GameServer>, out: mpsc::Sender<ServerMsg>) -> Self {
        let id = Uuid::new_v4();
        let lobby = forward(id, game.subscribe_lobby(), out.clone());
        Self {
            id,
            game,
            out,
            lobby,
            rooms: HashMap::new(),
        }
    }

    pub async fn send(&self, msg: ServerMsg) {
        if self.out.send(msg).await.is_err() {
            debug!(session_id = %self.id, "Outbound queue closed");
        }
    }

    /// Handle one request; failures go back to this client only
    pub async fn dispatch(&mut self, msg: ClientMsg) {
        match self.handle(msg) {
            Ok(Some(reply)) => self.send(reply).await,
            Ok(None) => {}
            Err(e) => {
                debug!(session_id = %self.id, code = e.code(), error = %e, "Request rejected");
                self.send(ServerMsg::RoomError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                })
                .await;
            }
        }
    }

    fn handle(&mut self, msg: ClientMsg) -> Result<Option<ServerMsg>, GameError> {
        let game = self.game.clone();

        match msg {
            ClientMsg::CreatePlayer { name } => {
                let player = game.create_player(name.as_deref());
                Ok(Some(ServerMsg::PlayerCreated {
                    player_id: player.id,
                    name: player.name,
                }))
            }
            ClientMsg::GetPlayer { player_id } => Ok(Some(ServerMsg::PlayerDetails {
                player: game.player(player_id)?,
            })),
            ClientMsg::SetName { player_id, name } => Ok(Some(ServerMsg::PlayerUpdated {
                player: game.set_name(player_id, &name)?,
            })),
            ClientMsg::CreateRoom { name, mode } => {
                let room = game.create_room(&name, &mode)?;
                self.follow_room(room.id)?;
                Ok(Some(ServerMsg::RoomCreated { room }))
            }
            ClientMsg::GetRoom { room_id } => {
                let room = self.following(room_id, |g| g.room_snapshot(room_id))?;
                Ok(Some(ServerMsg::RoomDetails { room }))
            }
            ClientMsg::GetRooms => Ok(Some(ServerMsg::RoomList {
                rooms: game.list_rooms(),
            })),
            ClientMsg::JoinRoom { room_id, player_id } => {
                self.following(room_id, |g| g.join_room(room_id, player_id))?;
                Ok(None)
            }
            ClientMsg::SpectateRoom {
                room_id,
                spectator_id,
            } => {
                self.following(room_id, |g| g.spectate_room(room_id, spectator_id))?;
                Ok(None)
            }
            ClientMsg::LeaveRoom { room_id, player_id } => {
                game.leave_room(room_id, player_id)?;
                Ok(None)
            }
            ClientMsg::Ready { room_id, player_id } => {
                game.ready(room_id, player_id)?;
                Ok(None)
            }
            ClientMsg::Unready { room_id, player_id } => {
                game.unready(room_id, player_id)?;
                Ok(None)
            }
            ClientMsg::Hit {
                room_id,
                shooter_id,
                target_marker_id,
            } => {
                game.hit(room_id, shooter_id, target_marker_id)?;
                Ok(None)
            }
            ClientMsg::NukeRoom { room_id } => {
                game.nuke_room(room_id)?;
                self.unfollow_room(room_id);
                Ok(None)
            }
            ClientMsg::Ping { t } => Ok(Some(ServerMsg::Pong { t })),
        }
    }

    /// Run `op` with this session subscribed to the room, so the broadcast
    /// produced by `op` reaches this client too. A fresh subscription is
    /// dropped again when `op` fails.
    fn following<T>(
        &mut self,
        room_id: Uuid,
        op: impl FnOnce(&GameServer) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let fresh = self.follow_room(room_id)?;
        let result = op(self.game.as_ref());
        result.map_err(|e| {
            if fresh {
                self.unfollow_room(room_id);
            }
            e
        })
    }

    /// Subscribe to a room's broadcasts. Returns false if already following.
    fn follow_room(&mut self, room_id: Uuid) -> Result<bool, GameError> {
        if self.rooms.get(&room_id).is_some_and(|t| !t.is_finished()) {
            return Ok(false);
        }
        let rx = self.game.subscribe_room(room_id)?;
        self.rooms.insert(room_id, forward(self.id, rx, self.out.clone()));
        Ok(true)
    }

    fn unfollow_room(&mut self, room_id: Uuid) {
        if let Some(task) = self.rooms.remove(&room_id) {
            task.abort();
        }
    }

    #[cfg(test)]
    fn following_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.lobby.abort();
        for task in self.rooms.values() {
            task.abort();
        }
    }
}

/// Pump a broadcast receiver into a connection's outbound queue
fn forward(
    session_id: Uuid,
    mut rx: broadcast::Receiver<ServerMsg>,
    out: mpsc::Sender<ServerMsg>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if out.send(msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        session_id = %session_id,
                        lagged_count = n,
                        "Client lagged, skipping {} messages", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(session_id = %session_id, "Broadcast channel closed");
                    break;
                }
            }
        }
    })
}
