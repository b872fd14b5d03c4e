//! Room snapshots for network transmission

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::player::{PlayerHandle, PlayerId, PlayerView};
use super::room::Room;

/// Full, self-contained view of a room.
///
/// Every combat action re-broadcasts one of these to the whole room instead of
/// a per-client diff.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: Uuid,
    pub name: String,
    pub mode: String,
    pub created_at: DateTime<Utc>,
    /// Keyed by player id so clients can index their own record
    pub players: BTreeMap<PlayerId, PlayerView>,
    pub spectators: BTreeMap<PlayerId, PlayerView>,
    pub used_markers: Vec<u16>,
    pub ready_count: usize,
    pub ended: bool,
    pub winner: Option<PlayerId>,
}

impl RoomSnapshot {
    /// Capture the room as it is now. Caller holds the room lock.
    pub fn capture(room: &Room) -> Self {
        Self {
            id: room.id,
            name: room.name.clone(),
            mode: room.mode.clone(),
            created_at: room.created_at,
            players: views(&room.players),
            spectators: views(&room.spectators),
            used_markers: room.used_markers.iter().copied().collect(),
            ready_count: room.ready_count(),
            ended: room.ended,
            winner: room.winner,
        }
    }

    #[cfg(test)]
    pub fn player(&self, id: &PlayerId) -> Option<&PlayerView> {
        self.players.get(id)
    }
}

fn views(members: &HashMap<PlayerId, PlayerHandle>) -> BTreeMap<PlayerId, PlayerView> {
    members
        .iter()
        .map(|(id, handle)| (*id, handle.lock().view()))
        .collect()
}
