//! Player identities, independent of room membership

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::error::GameError;

pub type PlayerId = Uuid;

/// Shared handle to a player record.
///
/// The registry and every room the player belongs to hold clones of the same
/// handle, so a lookup through either sees the same state.
pub type PlayerHandle = Arc<Mutex<Player>>;

/// Authoritative player record
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Hit points, `0.0` means eliminated
    pub health: f32,
    /// Multiplier applied to outgoing hits
    pub damage: f32,
    pub kills: u32,
    pub deaths: u32,
    /// Physical marker bound at join time
    pub qr_id: Option<u16>,
    pub room_id: Option<Uuid>,
}

impl Player {
    pub fn new(id: PlayerId, name: String, start_health: u32) -> Self {
        Self {
            id,
            name,
            health: start_health as f32,
            damage: 1.0,
            kills: 0,
            deaths: 0,
            qr_id: None,
            room_id: None,
        }
    }

    /// Bind to `room_id` with a fresh combat record. Health, damage and
    /// scores belong to one room and never carry over from the last one.
    pub fn enter_room(&mut self, room_id: Uuid, start_health: u32) {
        self.room_id = Some(room_id);
        self.health = start_health as f32;
        self.damage = 1.0;
        self.kills = 0;
        self.deaths = 0;
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            health: self.health,
            damage: self.damage,
            kills: self.kills,
            deaths: self.deaths,
            qr_id: self.qr_id,
            room_id: self.room_id,
        }
    }
}

/// Wire representation of a player
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub health: f32,
    pub damage: f32,
    pub kills: u32,
    pub deaths: u32,
    pub qr_id: Option<u16>,
    pub room_id: Option<Uuid>,
}

/// Identity registry keyed by player id
pub struct PlayerRegistry {
    players: DashMap<PlayerId, PlayerHandle>,
    start_health: u32,
}

impl PlayerRegistry {
    pub fn new(start_health: u32) -> Self {
        Self {
            players: DashMap::new(),
            start_health,
        }
    }

    /// Create a fresh player, defaulting the name when it is blank.
    ///
    /// Ids are random v4 UUIDs, so concurrent requests never collide.
    pub fn create(&self, name: Option<&str>) -> PlayerHandle {
        let id = Uuid::new_v4();
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("Player {}", self.players.len() + 1),
        };

        let handle = Arc::new(Mutex::new(Player::new(id, name, self.start_health)));
        self.players.insert(id, handle.clone());

        info!(player_id = %id, "Player created");
        handle
    }

    pub fn get(&self, id: &PlayerId) -> Result<PlayerHandle, GameError> {
        self.players
            .get(id)
            .map(|p| p.value().clone())
            .ok_or_else(|| GameError::player_not_found(*id))
    }

    /// Delete every player whose room back-reference matches `room_id`.
    /// Returns the ids that were removed.
    pub fn remove_in_room(&self, room_id: Uuid) -> Vec<PlayerId> {
        let mut removed = Vec::new();
        self.players.retain(|id, handle| {
            let keep = handle.lock().room_id != Some(room_id);
            if !keep {
                removed.push(*id);
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_player_starts_fresh() {
        let registry = PlayerRegistry::new(5);
        let handle = registry.create(Some("Alice"));
        let player = handle.lock();

        assert_eq!(player.name, "Alice");
        assert_eq!(player.health, 5.0);
        assert_eq!(player.damage, 1.0);
        assert_eq!(player.kills, 0);
        assert_eq!(player.deaths, 0);
        assert_eq!(player.qr_id, None);
        assert_eq!(player.room_id, None);
    }

    #[test]
    fn blank_name_gets_default() {
        let registry = PlayerRegistry::new(5);
        let first = registry.create(None);
        let second = registry.create(Some("   "));

        assert_eq!(first.lock().name, "Player 1");
        assert_eq!(second.lock().name, "Player 2");
    }

    #[test]
    fn lookup_returns_shared_record() {
        let registry = PlayerRegistry::new(5);
        let id = registry.create(Some("Bob")).lock().id;

        let a = registry.get(&id).unwrap();
        let b = registry.get(&id).unwrap();
        a.lock().kills = 2;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.lock().kills, 2);
    }

    #[test]
    fn entering_a_room_resets_combat_record() {
        let mut player = Player::new(Uuid::new_v4(), "Vet".into(), 5);
        player.health = 0.0;
        player.damage = 4.0;
        player.kills = 3;
        player.deaths = 2;
        let room_id = Uuid::new_v4();

        player.enter_room(room_id, 5);

        assert_eq!(player.room_id, Some(room_id));
        assert_eq!(player.health, 5.0);
        assert_eq!(player.damage, 1.0);
        assert_eq!((player.kills, player.deaths), (0, 0));
    }

    #[test]
    fn unknown_player_is_not_found() {
        let registry = PlayerRegistry::new(5);
        assert!(matches!(
            registry.get(&Uuid::new_v4()),
            Err(GameError::NotFound(_))
        ));
    }

    #[test]
    fn ids_are_unique() {
        let registry = PlayerRegistry::new(5);
        let ids: std::collections::HashSet<_> =
            (0..500).map(|_| registry.create(None).lock().id).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn remove_in_room_only_touches_that_room() {
        let registry = PlayerRegistry::new(5);
        let room = Uuid::new_v4();
        let inside = registry.create(Some("in"));
        let outside = registry.create(Some("out"));
        inside.lock().room_id = Some(room);
        outside.lock().room_id = Some(Uuid::new_v4());

        let removed = registry.remove_in_room(room);

        assert_eq!(removed, vec![inside.lock().id]);
        assert!(registry.get(&inside.lock().id).is_err());
        assert!(registry.get(&outside.lock().id).is_ok());
    }
}
