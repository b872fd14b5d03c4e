//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::combat::MysteryEffect;
use crate::game::player::PlayerView;
use crate::game::snapshot::RoomSnapshot;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Request a new player identity
    CreatePlayer {
        #[serde(default)]
        name: Option<String>,
    },

    /// Resume an identity after reconnecting
    GetPlayer { player_id: Uuid },

    /// Rename an existing player
    SetName { player_id: Uuid, name: String },

    CreateRoom {
        #[serde(default)]
        name: String,
        #[serde(default)]
        mode: String,
    },

    /// Fetch one room and follow its broadcasts
    GetRoom { room_id: Uuid },

    GetRooms,

    JoinRoom { room_id: Uuid, player_id: Uuid },

    SpectateRoom { room_id: Uuid, spectator_id: Uuid },

    LeaveRoom { room_id: Uuid, player_id: Uuid },

    Ready { room_id: Uuid, player_id: Uuid },

    Unready { room_id: Uuid, player_id: Uuid },

    /// Shooter claims `target_marker_id` is centred in its crosshair
    Hit {
        room_id: Uuid,
        shooter_id: Uuid,
        target_marker_id: u16,
    },

    /// Delete a room and every player in it
    NukeRoom { room_id: Uuid },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { server_time: u64 },

    PlayerCreated { player_id: Uuid, name: String },

    /// Reply to `getPlayer`
    PlayerDetails { player: PlayerView },

    PlayerUpdated { player: PlayerView },

    RoomCreated { room: RoomSnapshot },

    /// Reply to `getRoom`
    RoomDetails { room: RoomSnapshot },

    RoomList { rooms: Vec<RoomSnapshot> },

    /// Authoritative room state after any change
    RoomUpdated { room: RoomSnapshot },

    ReadyChanged {
        room_id: Uuid,
        player_id: Uuid,
        ready: bool,
        ready_count: usize,
        player_count: usize,
    },

    AllReady { room_id: Uuid },

    PlayerHit {
        room_id: Uuid,
        shooter_id: Uuid,
        target_id: Uuid,
        damage: f32,
        target_health: f32,
        eliminated: bool,
    },

    Respawned { room_id: Uuid, player_id: Uuid },

    /// Addressed to `player_id`; everyone else in the room sees it as a notice
    MysteryBoxEffect {
        room_id: Uuid,
        player_id: Uuid,
        effect: MysteryEffect,
    },

    GameOver { room_id: Uuid, winner: PlayerView },

    RoomNuked { room_id: Uuid },

    /// Rejected request, sent only to the originating client
    RoomError { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}
