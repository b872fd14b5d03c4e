//! Server context: registries, rule engine and broadcast fan-out

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::GameRules;
use crate::ws::protocol::ServerMsg;

use super::combat::{CombatEngine, CombatEvent};
use super::error::GameError;
use super::markers::{MarkerAllocator, MarkerTable};
use super::player::{PlayerId, PlayerRegistry, PlayerView};
use super::room::{ReadyChange, RoomHandle, RoomRegistry};
use super::snapshot::RoomSnapshot;

/// Capacity of the lobby broadcast channel
const LOBBY_CHANNEL_CAPACITY: usize = 64;

/// The one authoritative game context of a server process.
///
/// Room-scoped operations run entirely under that room's lock, and publish
/// their broadcasts before releasing it so every subscriber sees room
/// updates in the order they were applied.
pub struct GameServer {
    players: PlayerRegistry,
    rooms: RoomRegistry,
    allocator: MarkerAllocator,
    engine: CombatEngine,
    /// Room list and nuke notices for every connected client
    lobby: broadcast::Sender<ServerMsg>,
    /// Seeds each new room's generator
    rng: Mutex<ChaCha8Rng>,
}

impl GameServer {
    pub fn new(rules: GameRules, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let (lobby, _) = broadcast::channel(LOBBY_CHANNEL_CAPACITY);

        Self {
            players: PlayerRegistry::new(rules.start_health),
            rooms: RoomRegistry::new(),
            allocator: MarkerAllocator::new(rules.marker_pool_size, MarkerTable::from_rules(&rules)),
            engine: CombatEngine::new(rules),
            lobby,
            rng: Mutex::new(rng),
        }
    }

    pub fn rules(&self) -> &GameRules {
        self.engine.rules()
    }

    pub fn subscribe_lobby(&self) -> broadcast::Receiver<ServerMsg> {
        self.lobby.subscribe()
    }

    pub fn subscribe_room(&self, room_id: Uuid) -> Result<broadcast::Receiver<ServerMsg>, GameError> {
        Ok(self.rooms.get(&room_id)?.events.subscribe())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    pub fn create_player(&self, name: Option<&str>) -> PlayerView {
        self.players.create(name).lock().view()
    }

    pub fn player(&self, player_id: PlayerId) -> Result<PlayerView, GameError> {
        Ok(self.players.get(&player_id)?.lock().view())
    }

    pub fn set_name(&self, player_id: PlayerId, name: &str) -> Result<PlayerView, GameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::InvalidRequest("Name must not be empty.".to_string()));
        }

        let handle = self.players.get(&player_id)?;
        let room_id = handle.lock().room_id;

        let Some(room_id) = room_id else {
            let mut player = handle.lock();
            player.name = name.to_string();
            return Ok(player.view());
        };

        let room = self.rooms.get(&room_id)?;
        let guard = room.room.lock();
        let view = {
            let mut player = handle.lock();
            player.name = name.to_string();
            player.view()
        };
        publish(&room, ServerMsg::RoomUpdated {
            room: RoomSnapshot::capture(&guard),
        });
        Ok(view)
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    pub fn create_room(&self, name: &str, mode: &str) -> Result<RoomSnapshot, GameError> {
        let seed = self.rng.lock().gen();
        let handle = self.rooms.create(name, mode, seed)?;
        let snapshot = RoomSnapshot::capture(&handle.room.lock());
        self.publish_room_list();
        Ok(snapshot)
    }

    pub fn room_snapshot(&self, room_id: Uuid) -> Result<RoomSnapshot, GameError> {
        let handle = self.rooms.get(&room_id)?;
        let room = handle.room.lock();
        room.ensure_open()?;
        Ok(RoomSnapshot::capture(&room))
    }

    pub fn list_rooms(&self) -> Vec<RoomSnapshot> {
        self.rooms
            .list()
            .iter()
            .map(|h| RoomSnapshot::capture(&h.room.lock()))
            .collect()
    }

    /// Delete a room together with every player bound to it
    pub fn nuke_room(&self, room_id: Uuid) -> Result<Vec<PlayerId>, GameError> {
        let (handle, removed) = self.rooms.delete(&room_id, &self.players)?;

        publish(&handle, ServerMsg::RoomNuked { room_id });
        let _ = self.lobby.send(ServerMsg::RoomNuked { room_id });
        self.publish_room_list();

        info!(room_id = %room_id, removed_players = removed.len(), "Room nuked");
        Ok(removed)
    }

    pub fn join_room(&self, room_id: Uuid, player_id: PlayerId) -> Result<RoomSnapshot, GameError> {
        let handle = self.rooms.get(&room_id)?;
        let player = self.players.get(&player_id)?;

        let snapshot = {
            let mut room = handle.room.lock();
            room.ensure_open()?;
            if room.ended {
                return Err(GameError::GameOver(room_id));
            }

            if !room.players.contains_key(&player_id) {
                let mut p = player.lock();
                if let Some(other) = p.room_id.filter(|r| *r != room_id) {
                    return Err(GameError::Conflict(format!(
                        "Player {} is already in room {}",
                        player_id, other
                    )));
                }

                let marker = self.allocator.allocate(&mut room, &mut p)?;
                p.enter_room(room_id, self.rules().start_health);
                drop(p);

                room.spectators.remove(&player_id);
                room.players.insert(player_id, player.clone());
                info!(room_id = %room_id, player_id = %player_id, marker, "Player joined room");
            }

            let snapshot = RoomSnapshot::capture(&room);
            publish(&handle, ServerMsg::RoomUpdated {
                room: snapshot.clone(),
            });
            snapshot
        };

        self.publish_room_list();
        Ok(snapshot)
    }

    pub fn spectate_room(
        &self,
        room_id: Uuid,
        spectator_id: PlayerId,
    ) -> Result<RoomSnapshot, GameError> {
        let handle = self.rooms.get(&room_id)?;
        let spectator = self.players.get(&spectator_id)?;

        let mut room = handle.room.lock();
        room.ensure_open()?;
        if room.players.contains_key(&spectator_id) {
            return Err(GameError::Conflict(format!(
                "Player {} is already playing in room {}",
                spectator_id, room_id
            )));
        }

        if !room.spectators.contains_key(&spectator_id) {
            let mut s = spectator.lock();
            if let Some(other) = s.room_id.filter(|r| *r != room_id) {
                return Err(GameError::Conflict(format!(
                    "Player {} is already in room {}",
                    spectator_id, other
                )));
            }
            s.room_id = Some(room_id);
            drop(s);

            room.spectators.insert(spectator_id, spectator.clone());
            info!(room_id = %room_id, player_id = %spectator_id, "Spectator joined room");
        }

        let snapshot = RoomSnapshot::capture(&room);
        publish(&handle, ServerMsg::RoomUpdated {
            room: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// Remove a player or spectator. Its marker id is not recycled.
    pub fn leave_room(&self, room_id: Uuid, player_id: PlayerId) -> Result<RoomSnapshot, GameError> {
        let handle = self.rooms.get(&room_id)?;

        let snapshot = {
            let mut room = handle.room.lock();
            room.ensure_open()?;
            let completes_ready = room.departure_completes_ready(player_id);
            let member = room
                .remove_member(player_id)
                .ok_or_else(|| GameError::player_not_found(player_id))?;
            {
                let mut p = member.lock();
                p.room_id = None;
                p.qr_id = None;
            }
            info!(room_id = %room_id, player_id = %player_id, "Player left room");

            if completes_ready {
                info!(room_id = %room_id, players = room.players.len(), "All players ready");
                publish(&handle, ServerMsg::AllReady { room_id });
            }

            let snapshot = RoomSnapshot::capture(&room);
            publish(&handle, ServerMsg::RoomUpdated {
                room: snapshot.clone(),
            });
            snapshot
        };

        self.publish_room_list();
        Ok(snapshot)
    }

    // ------------------------------------------------------------------
    // Ready sub-protocol
    // ------------------------------------------------------------------

    pub fn ready(&self, room_id: Uuid, player_id: PlayerId) -> Result<ReadyChange, GameError> {
        self.set_ready(room_id, player_id, true)
    }

    pub fn unready(&self, room_id: Uuid, player_id: PlayerId) -> Result<ReadyChange, GameError> {
        self.set_ready(room_id, player_id, false)
    }

    fn set_ready(
        &self,
        room_id: Uuid,
        player_id: PlayerId,
        ready: bool,
    ) -> Result<ReadyChange, GameError> {
        let handle = self.rooms.get(&room_id)?;
        let mut room = handle.room.lock();
        room.ensure_open()?;

        let change = if ready {
            room.mark_ready(player_id)?
        } else {
            room.mark_unready(player_id)?
        };

        publish(&handle, ServerMsg::ReadyChanged {
            room_id,
            player_id,
            ready,
            ready_count: change.ready_count,
            player_count: change.player_count,
        });
        if change.all_ready {
            info!(room_id = %room_id, players = change.player_count, "All players ready");
            publish(&handle, ServerMsg::AllReady { room_id });
        }

        Ok(change)
    }

    // ------------------------------------------------------------------
    // Combat
    // ------------------------------------------------------------------

    /// Resolve a shot and broadcast the outcome to the whole room
    pub fn hit(
        &self,
        room_id: Uuid,
        shooter_id: PlayerId,
        target_marker_id: u16,
    ) -> Result<RoomSnapshot, GameError> {
        let handle = self.rooms.get(&room_id)?;
        let mut room = handle.room.lock();

        let events = self
            .engine
            .resolve_hit(&mut room, shooter_id, target_marker_id)?;

        for event in events {
            let msg = match event {
                CombatEvent::Respawned { player_id } => {
                    debug!(room_id = %room_id, player_id = %player_id, "Player respawned");
                    ServerMsg::Respawned { room_id, player_id }
                }
                CombatEvent::MysteryBox { player_id, effect } => {
                    debug!(room_id = %room_id, player_id = %player_id, ?effect, "Mystery box opened");
                    ServerMsg::MysteryBoxEffect {
                        room_id,
                        player_id,
                        effect,
                    }
                }
                CombatEvent::Hit {
                    shooter_id,
                    target_id,
                    damage,
                    target_health,
                    eliminated,
                } => {
                    if eliminated {
                        info!(room_id = %room_id, killer = %shooter_id, victim = %target_id, "Player eliminated");
                    }
                    ServerMsg::PlayerHit {
                        room_id,
                        shooter_id,
                        target_id,
                        damage,
                        target_health,
                        eliminated,
                    }
                }
                CombatEvent::GameOver { winner_id } => {
                    let winner = room
                        .players
                        .get(&winner_id)
                        .map(|p| p.lock().view())
                        .ok_or_else(|| GameError::player_not_found(winner_id))?;
                    info!(room_id = %room_id, winner = %winner_id, kills = winner.kills, "Game over");
                    ServerMsg::GameOver { room_id, winner }
                }
            };
            publish(&handle, msg);
        }

        let snapshot = RoomSnapshot::capture(&room);
        publish(&handle, ServerMsg::RoomUpdated {
            room: snapshot.clone(),
        });
        Ok(snapshot)
    }

    fn publish_room_list(&self) {
        let _ = self.lobby.send(ServerMsg::RoomList {
            rooms: self.list_rooms(),
        });
    }
}

/// Fan a message out to a room's subscribers.
/// A room with nobody listening is not an error.
fn publish(handle: &RoomHandle, msg: ServerMsg) {
    if handle.events.send(msg).is_err() {
        debug!(room_id = %handle.id, "No subscribers for room broadcast");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn server() -> GameServer {
        GameServer::new(GameRules::default(), Some(1))
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    fn joined(server: &GameServer, room_id: Uuid, name: &str) -> PlayerView {
        let id = server.create_player(Some(name)).id;
        let snap = server.join_room(room_id, id).unwrap();
        snap.player(&id).cloned().unwrap()
    }

    #[test]
    fn create_room_broadcasts_room_list() {
        let server = server();
        let mut lobby = server.subscribe_lobby();

        let room = server.create_room("Arena", "ffa").unwrap();

        let msgs = drain(&mut lobby);
        assert!(matches!(&msgs[..], [ServerMsg::RoomList { rooms }] if rooms[0].id == room.id));
    }

    #[test]
    fn create_room_error_leaves_no_room() {
        let server = server();
        assert!(matches!(
            server.create_room("", "ffa"),
            Err(GameError::InvalidRequest(_))
        ));
        assert_eq!(server.room_count(), 0);
    }

    #[test]
    fn join_binds_marker_and_room() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();

        let a = joined(&server, room.id, "a");
        let b = joined(&server, room.id, "b");

        assert_eq!(a.qr_id, Some(0));
        assert_eq!(b.qr_id, Some(1));
        assert_eq!(a.room_id, Some(room.id));
        assert_eq!(server.player(a.id).unwrap().qr_id, Some(0));
    }

    #[test]
    fn rejoin_keeps_marker() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");

        let again = server.join_room(room.id, a.id).unwrap();

        assert_eq!(again.player(&a.id).unwrap().qr_id, a.qr_id);
        assert_eq!(again.used_markers, vec![0]);
    }

    #[test]
    fn player_cannot_join_two_rooms() {
        let server = server();
        let first = server.create_room("One", "ffa").unwrap();
        let second = server.create_room("Two", "ffa").unwrap();
        let a = joined(&server, first.id, "a");

        assert!(matches!(
            server.join_room(second.id, a.id),
            Err(GameError::Conflict(_))
        ));
        assert!(server.room_snapshot(second.id).unwrap().players.is_empty());
    }

    #[test]
    fn join_unknown_room_or_player_is_not_found() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = server.create_player(None);

        assert!(matches!(
            server.join_room(Uuid::new_v4(), a.id),
            Err(GameError::NotFound(_))
        ));
        assert!(matches!(
            server.join_room(room.id, Uuid::new_v4()),
            Err(GameError::NotFound(_))
        ));
    }

    #[test]
    fn exhausted_pool_is_reported() {
        let rules = GameRules {
            marker_pool_size: 13,
            ..GameRules::default()
        };
        let server = GameServer::new(rules, Some(1));
        let room = server.create_room("Tiny", "ffa").unwrap();
        for i in 0..11 {
            joined(&server, room.id, &format!("p{}", i));
        }

        let late = server.create_player(Some("late"));
        assert_eq!(
            server.join_room(room.id, late.id),
            Err(GameError::Exhausted(room.id))
        );
        assert_eq!(server.player(late.id).unwrap().room_id, None);
    }

    #[test]
    fn spectator_becomes_player_on_join() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let s = server.create_player(Some("watcher"));

        let snap = server.spectate_room(room.id, s.id).unwrap();
        assert!(snap.spectators.contains_key(&s.id));
        assert_eq!(snap.spectators[&s.id].qr_id, None);

        let snap = server.join_room(room.id, s.id).unwrap();
        assert!(snap.spectators.is_empty());
        assert!(snap.players.contains_key(&s.id));
    }

    #[test]
    fn player_cannot_spectate_own_room() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");

        assert!(matches!(
            server.spectate_room(room.id, a.id),
            Err(GameError::Conflict(_))
        ));
    }

    #[test]
    fn leave_frees_player_but_not_marker() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");

        let snap = server.leave_room(room.id, a.id).unwrap();
        assert!(snap.players.is_empty());
        assert_eq!(snap.used_markers, vec![0]);

        let left = server.player(a.id).unwrap();
        assert_eq!(left.room_id, None);
        assert_eq!(left.qr_id, None);

        let b = joined(&server, room.id, "b");
        assert_eq!(b.qr_id, Some(1));
    }

    #[test]
    fn winner_starts_over_in_next_room() {
        let server = server();
        let first = server.create_room("One", "ffa").unwrap();
        let a = joined(&server, first.id, "a");
        let victims: Vec<PlayerView> = (0..3)
            .map(|i| joined(&server, first.id, &format!("v{}", i)))
            .collect();
        for v in &victims {
            for _ in 0..5 {
                server.hit(first.id, a.id, v.qr_id.unwrap()).unwrap();
            }
        }
        assert!(server.room_snapshot(first.id).unwrap().ended);

        server.leave_room(first.id, a.id).unwrap();
        let second = server.create_room("Two", "ffa").unwrap();
        let a = server
            .join_room(second.id, a.id)
            .unwrap()
            .player(&a.id)
            .cloned()
            .unwrap();
        let b = joined(&server, second.id, "b");
        assert_eq!((a.kills, a.deaths), (0, 0));

        let mut rx = server.subscribe_room(second.id).unwrap();
        let snap = server.hit(second.id, a.id, b.qr_id.unwrap()).unwrap();

        assert!(!snap.ended);
        assert_eq!(snap.winner, None);
        assert_eq!(snap.players[&b.id].health, 4.0);
        assert!(!drain(&mut rx)
            .iter()
            .any(|m| matches!(m, ServerMsg::GameOver { .. })));
    }

    #[test]
    fn eliminated_player_rejoins_alive_elsewhere() {
        let server = server();
        let first = server.create_room("One", "ffa").unwrap();
        let a = joined(&server, first.id, "a");
        let b = joined(&server, first.id, "b");
        server.hit(first.id, b.id, 11).unwrap();
        for _ in 0..5 {
            server.hit(first.id, a.id, b.qr_id.unwrap()).unwrap();
        }
        assert_eq!(server.player(b.id).unwrap().health, 0.0);

        server.leave_room(first.id, b.id).unwrap();
        let second = server.create_room("Two", "ffa").unwrap();
        let snap = server.join_room(second.id, b.id).unwrap();

        let rejoined = &snap.players[&b.id];
        assert_eq!(rejoined.health, 5.0);
        assert_eq!(rejoined.damage, 1.0);
        assert_eq!((rejoined.kills, rejoined.deaths), (0, 0));
        assert_eq!(rejoined.room_id, Some(second.id));
    }

    #[test]
    fn unready_leaver_completes_ready() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");
        let b = joined(&server, room.id, "b");
        server.ready(room.id, a.id).unwrap();
        let mut rx = server.subscribe_room(room.id).unwrap();

        server.leave_room(room.id, b.id).unwrap();

        let msgs = drain(&mut rx);
        assert!(matches!(&msgs[0], ServerMsg::AllReady { room_id } if *room_id == room.id));
        assert_eq!(server.room_snapshot(room.id).unwrap().ready_count, 1);
    }

    #[test]
    fn ready_flow_emits_all_ready() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");
        let b = joined(&server, room.id, "b");
        let mut rx = server.subscribe_room(room.id).unwrap();

        server.ready(room.id, a.id).unwrap();
        let change = server.ready(room.id, b.id).unwrap();
        assert!(change.all_ready);

        let msgs = drain(&mut rx);
        let all_ready = msgs
            .iter()
            .filter(|m| matches!(m, ServerMsg::AllReady { .. }))
            .count();
        assert_eq!(all_ready, 1);

        server.unready(room.id, a.id).unwrap();
        assert!(matches!(
            server.unready(room.id, a.id),
            Err(GameError::Conflict(_))
        ));
        assert_eq!(server.room_snapshot(room.id).unwrap().ready_count, 1);
    }

    #[test]
    fn full_game_reaches_game_over_once() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");
        let victims: Vec<PlayerView> = (0..3)
            .map(|i| joined(&server, room.id, &format!("v{}", i)))
            .collect();
        let mut rx = server.subscribe_room(room.id).unwrap();

        for v in &victims {
            for _ in 0..5 {
                server.hit(room.id, a.id, v.qr_id.unwrap()).unwrap();
            }
        }

        let msgs = drain(&mut rx);
        let game_overs: Vec<&ServerMsg> = msgs
            .iter()
            .filter(|m| matches!(m, ServerMsg::GameOver { .. }))
            .collect();
        assert_eq!(game_overs.len(), 1);
        assert!(matches!(game_overs[0], ServerMsg::GameOver { winner, .. } if winner.id == a.id && winner.kills == 3));

        let updates = msgs
            .iter()
            .filter(|m| matches!(m, ServerMsg::RoomUpdated { .. }))
            .count();
        assert_eq!(updates, 15);

        let snap = server.room_snapshot(room.id).unwrap();
        assert!(snap.ended);
        assert_eq!(snap.winner, Some(a.id));

        // terminal: further hits are rejected and change nothing
        let survivor = joined_after_end(&server, room.id);
        assert!(survivor.is_err());
        assert_eq!(
            server.hit(room.id, victims[0].id, a.qr_id.unwrap()),
            Err(GameError::GameOver(room.id))
        );
        assert_eq!(server.player(a.id).unwrap().health, 5.0);
    }

    fn joined_after_end(server: &GameServer, room_id: Uuid) -> Result<RoomSnapshot, GameError> {
        let id = server.create_player(None).id;
        server.join_room(room_id, id)
    }

    #[test]
    fn mystery_box_notifies_room() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");
        let mut rx = server.subscribe_room(room.id).unwrap();

        server.hit(room.id, a.id, 11).unwrap();

        let msgs = drain(&mut rx);
        assert!(matches!(&msgs[0], ServerMsg::MysteryBoxEffect { player_id, .. } if *player_id == a.id));
        assert!(matches!(&msgs[1], ServerMsg::RoomUpdated { .. }));
    }

    #[test]
    fn hit_on_unassigned_marker_is_not_found() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");

        assert!(matches!(
            server.hit(room.id, a.id, 99),
            Err(GameError::NotFound(_))
        ));
    }

    #[test]
    fn hit_from_non_member_is_rejected() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");
        let outsider = server.create_player(Some("outsider"));

        assert!(matches!(
            server.hit(room.id, outsider.id, a.qr_id.unwrap()),
            Err(GameError::NotFound(_))
        ));
        assert_eq!(server.player(a.id).unwrap().health, 5.0);
    }

    #[test]
    fn nuke_deletes_room_and_members() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");
        let s = server.create_player(Some("s"));
        server.spectate_room(room.id, s.id).unwrap();
        let bystander = server.create_player(Some("bystander"));
        let mut room_rx = server.subscribe_room(room.id).unwrap();
        let mut lobby = server.subscribe_lobby();

        let mut removed = server.nuke_room(room.id).unwrap();
        removed.sort();
        let mut expected = vec![a.id, s.id];
        expected.sort();

        assert_eq!(removed, expected);
        assert!(server.player(a.id).is_err());
        assert!(server.player(bystander.id).is_ok());
        assert!(server.room_snapshot(room.id).is_err());
        assert!(matches!(&drain(&mut room_rx)[..], [ServerMsg::RoomNuked { .. }]));
        assert!(matches!(&drain(&mut lobby)[0], ServerMsg::RoomNuked { room_id } if *room_id == room.id));
    }

    #[test]
    fn set_name_updates_shared_record() {
        let server = server();
        let room = server.create_room("Arena", "ffa").unwrap();
        let a = joined(&server, room.id, "a");

        server.set_name(a.id, "Ace").unwrap();

        assert_eq!(server.room_snapshot(room.id).unwrap().players[&a.id].name, "Ace");
        assert!(matches!(
            server.set_name(a.id, " "),
            Err(GameError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_joins_get_distinct_markers() {
        let server = std::sync::Arc::new(server());
        let room = server.create_room("Arena", "ffa").unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let server = server.clone();
                tokio::spawn(async move {
                    let id = server.create_player(Some(&format!("p{}", i))).id;
                    server.join_room(room.id, id).map(|_| id)
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }

        let snap = server.room_snapshot(room.id).unwrap();
        let markers: std::collections::HashSet<u16> =
            snap.players.values().filter_map(|p| p.qr_id).collect();
        assert_eq!(snap.players.len(), 50);
        assert_eq!(markers.len(), 50);
    }
}
