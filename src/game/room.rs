//! Room state, the room registry and the ready sub-protocol

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

use super::error::GameError;
use super::player::{PlayerHandle, PlayerId, PlayerRegistry};

/// Capacity of each room's broadcast channel
const ROOM_CHANNEL_CAPACITY: usize = 128;

/// A single game session (owned behind its room lock)
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub mode: String,
    pub created_at: DateTime<Utc>,
    pub players: HashMap<PlayerId, PlayerHandle>,
    pub spectators: HashMap<PlayerId, PlayerHandle>,
    /// Markers ever handed out in this room
    pub used_markers: BTreeSet<u16>,
    /// Marker id -> current wearer, used to resolve hit targets
    pub marker_owners: HashMap<u16, PlayerId>,
    pub ready: HashSet<PlayerId>,
    /// Terminal once set
    pub ended: bool,
    pub winner: Option<PlayerId>,
    /// Set when the room is deleted so late requests holding a handle bail out
    pub closed: bool,
    pub rng: ChaCha8Rng,
}

/// Result of a ready/unready transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyChange {
    pub ready_count: usize,
    pub player_count: usize,
    /// True only on the transition that made every player ready
    pub all_ready: bool,
}

impl Room {
    pub fn new(id: Uuid, name: String, mode: String, seed: u64) -> Self {
        Self {
            id,
            name,
            mode,
            created_at: Utc::now(),
            players: HashMap::new(),
            spectators: HashMap::new(),
            used_markers: BTreeSet::new(),
            marker_owners: HashMap::new(),
            ready: HashSet::new(),
            ended: false,
            winner: None,
            closed: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Fail unless the room is still live
    pub fn ensure_open(&self) -> Result<(), GameError> {
        if self.closed {
            return Err(GameError::room_not_found(self.id));
        }
        Ok(())
    }

    pub fn mark_ready(&mut self, player_id: PlayerId) -> Result<ReadyChange, GameError> {
        if !self.players.contains_key(&player_id) {
            return Err(GameError::player_not_found(player_id));
        }

        let newly_ready = self.ready.insert(player_id);
        let ready_count = self.ready.len();
        let player_count = self.players.len();

        Ok(ReadyChange {
            ready_count,
            player_count,
            all_ready: newly_ready && ready_count == player_count,
        })
    }

    /// Withdraw a ready flag. Unready without a prior ready is rejected, so
    /// the count can never drop below zero.
    pub fn mark_unready(&mut self, player_id: PlayerId) -> Result<ReadyChange, GameError> {
        if !self.players.contains_key(&player_id) {
            return Err(GameError::player_not_found(player_id));
        }
        if !self.ready.remove(&player_id) {
            return Err(GameError::Conflict(format!(
                "Player {} is not ready",
                player_id
            )));
        }

        Ok(ReadyChange {
            ready_count: self.ready.len(),
            player_count: self.players.len(),
            all_ready: false,
        })
    }

    /// True when `player_id` is the only player not ready and others remain,
    /// so its departure leaves everyone ready.
    pub fn departure_completes_ready(&self, player_id: PlayerId) -> bool {
        self.players.contains_key(&player_id)
            && !self.ready.contains(&player_id)
            && !self.ready.is_empty()
            && self.ready.len() == self.players.len() - 1
    }

    /// Drop a participant and every per-room binding it owns.
    /// The marker id itself stays in `used_markers`.
    pub fn remove_member(&mut self, player_id: PlayerId) -> Option<PlayerHandle> {
        if let Some(handle) = self.players.remove(&player_id) {
            self.ready.remove(&player_id);
            self.marker_owners.retain(|_, owner| *owner != player_id);
            return Some(handle);
        }
        self.spectators.remove(&player_id)
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Self::new(Uuid::new_v4(), "test".into(), "ffa".into(), 7)
    }
}

/// Handle to a live room: its state lock and its broadcast fan-out
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Uuid,
    pub room: Arc<Mutex<Room>>,
    pub events: broadcast::Sender<ServerMsg>,
}

impl RoomHandle {
    fn new(room: Room) -> Self {
        let (events, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        Self {
            id: room.id,
            room: Arc::new(Mutex::new(room)),
            events,
        }
    }
}

/// Registry of all rooms on this server
pub struct RoomRegistry {
    rooms: DashMap<Uuid, RoomHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn create(&self, name: &str, mode: &str, seed: u64) -> Result<RoomHandle, GameError> {
        let name = name.trim();
        let mode = mode.trim();
        if name.is_empty() || mode.is_empty() {
            return Err(GameError::InvalidRequest(
                "Room name and mode are required.".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let handle = RoomHandle::new(Room::new(id, name.to_string(), mode.to_string(), seed));
        self.rooms.insert(id, handle.clone());

        info!(room_id = %id, name, mode, "Room created");
        Ok(handle)
    }

    pub fn get(&self, id: &Uuid) -> Result<RoomHandle, GameError> {
        self.rooms
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| GameError::room_not_found(*id))
    }

    pub fn list(&self) -> Vec<RoomHandle> {
        self.rooms.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove a room and delete every player whose back-reference points at it.
    pub fn delete(
        &self,
        id: &Uuid,
        players: &PlayerRegistry,
    ) -> Result<(RoomHandle, Vec<PlayerId>), GameError> {
        let (_, handle) = self
            .rooms
            .remove(id)
            .ok_or_else(|| GameError::room_not_found(*id))?;

        handle.room.lock().closed = true;
        let removed = players.remove_in_room(*id);

        info!(room_id = %id, removed_players = removed.len(), "Room deleted");
        Ok((handle, removed))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
