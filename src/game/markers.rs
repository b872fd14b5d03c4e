//! Physical marker bookkeeping: reserved stations and per-room allocation

use serde::{Deserialize, Serialize};

use crate::config::GameRules;

use super::error::GameError;
use super::player::Player;
use super::room::Room;

/// Behaviour attached to a marker that is not worn by a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NonPlayerMarker {
    Respawn,
    MysteryBox,
}

/// Static table of reserved markers
#[derive(Debug, Clone)]
pub struct MarkerTable {
    respawn: u16,
    mystery_box: u16,
}

impl MarkerTable {
    pub fn from_rules(rules: &GameRules) -> Self {
        Self {
            respawn: rules.respawn_marker,
            mystery_box: rules.mystery_box_marker,
        }
    }

    pub fn classify(&self, marker: u16) -> Option<NonPlayerMarker> {
        if marker == self.respawn {
            Some(NonPlayerMarker::Respawn)
        } else if marker == self.mystery_box {
            Some(NonPlayerMarker::MysteryBox)
        } else {
            None
        }
    }

    pub fn is_reserved(&self, marker: u16) -> bool {
        self.classify(marker).is_some()
    }
}

/// Binds joining players to free markers within a room.
///
/// Marker ids are never handed back to the pool while the room exists, even
/// after the wearer leaves. A fresh joiner can therefore never be mistaken for
/// a departed player whose printed tag is still in circulation.
#[derive(Debug, Clone)]
pub struct MarkerAllocator {
    pool_size: u16,
    table: MarkerTable,
}

impl MarkerAllocator {
    pub fn new(pool_size: u16, table: MarkerTable) -> Self {
        Self { pool_size, table }
    }

    #[cfg(test)]
    pub fn table(&self) -> &MarkerTable {
        &self.table
    }

    /// Lowest marker id that is neither used in the room nor reserved
    pub fn next_free(&self, room: &Room) -> Option<u16> {
        (0..self.pool_size)
            .find(|id| !room.used_markers.contains(id) && !self.table.is_reserved(*id))
    }

    /// Reserve a marker for `player` in `room`.
    ///
    /// Must run under the room lock: the scan and the insert form one step.
    pub fn allocate(&self, room: &mut Room, player: &mut Player) -> Result<u16, GameError> {
        let marker = self.next_free(room).ok_or(GameError::Exhausted(room.id))?;
        room.used_markers.insert(marker);
        room.marker_owners.insert(marker, player.id);
        player.qr_id = Some(marker);
        Ok(marker)
    }
}
