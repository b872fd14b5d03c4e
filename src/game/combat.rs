//! Combat system - hits, respawn stations, mystery boxes and the win check

use rand::distributions::{Distribution, Standard};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::GameRules;

use super::error::GameError;
use super::markers::{MarkerTable, NonPlayerMarker};
use super::player::{Player, PlayerId};
use super::room::Room;

/// Lowest damage multiplier a mystery box can leave behind
pub const MIN_DAMAGE: f32 = 0.25;
/// Highest damage multiplier a mystery box can leave behind
pub const MAX_DAMAGE: f32 = 8.0;

/// Outcome of a mystery box draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MysteryEffect {
    HealthLoss,
    HealthGain,
    DamageHalved,
    DamageDoubled,
}

impl MysteryEffect {
    pub const ALL: [MysteryEffect; 4] = [
        MysteryEffect::HealthLoss,
        MysteryEffect::HealthGain,
        MysteryEffect::DamageHalved,
        MysteryEffect::DamageDoubled,
    ];

    /// Apply to a living player. Health loss never kills.
    pub fn apply(self, player: &mut Player, start_health: u32) {
        match self {
            MysteryEffect::HealthLoss => {
                player.health = (player.health - 1.0).max(1.0).min(player.health);
            }
            MysteryEffect::HealthGain => {
                player.health = (player.health + 1.0).min(start_health as f32);
            }
            MysteryEffect::DamageHalved => {
                player.damage = (player.damage / 2.0).max(MIN_DAMAGE);
            }
            MysteryEffect::DamageDoubled => {
                player.damage = (player.damage * 2.0).min(MAX_DAMAGE);
            }
        }
    }
}

impl Distribution<MysteryEffect> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> MysteryEffect {
        MysteryEffect::ALL[rng.gen_range(0..MysteryEffect::ALL.len())]
    }
}

/// Things that happened while resolving one shot
#[derive(Debug, Clone, PartialEq)]
pub enum CombatEvent {
    Respawned {
        player_id: PlayerId,
    },
    MysteryBox {
        player_id: PlayerId,
        effect: MysteryEffect,
    },
    Hit {
        shooter_id: PlayerId,
        target_id: PlayerId,
        damage: f32,
        target_health: f32,
        eliminated: bool,
    },
    GameOver {
        winner_id: PlayerId,
    },
}

/// Server-side resolution of shoot events
#[derive(Debug, Clone)]
pub struct CombatEngine {
    rules: GameRules,
    markers: MarkerTable,
}

impl CombatEngine {
    pub fn new(rules: GameRules) -> Self {
        let markers = MarkerTable::from_rules(&rules);
        Self { rules, markers }
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Resolve a shot by `shooter_id` at the marker it claims is centred.
    ///
    /// The target player is looked up through the room's marker table, never
    /// taken from the client. Every check runs before the first write, so an
    /// error leaves the room untouched.
    pub fn resolve_hit(
        &self,
        room: &mut Room,
        shooter_id: PlayerId,
        marker: u16,
    ) -> Result<Vec<CombatEvent>, GameError> {
        room.ensure_open()?;
        if room.ended {
            return Err(GameError::GameOver(room.id));
        }

        let shooter = room
            .players
            .get(&shooter_id)
            .cloned()
            .ok_or_else(|| GameError::player_not_found(shooter_id))?;

        match self.markers.classify(marker) {
            Some(NonPlayerMarker::Respawn) => {
                let mut shooter = shooter.lock();
                if shooter.is_alive() {
                    return Ok(Vec::new());
                }
                shooter.health = self.rules.start_health as f32;
                shooter.damage = 1.0;
                Ok(vec![CombatEvent::Respawned {
                    player_id: shooter_id,
                }])
            }
            Some(NonPlayerMarker::MysteryBox) => {
                let mut shooter = shooter.lock();
                if !shooter.is_alive() {
                    return Ok(Vec::new());
                }
                let effect: MysteryEffect = room.rng.gen();
                effect.apply(&mut shooter, self.rules.start_health);
                Ok(vec![CombatEvent::MysteryBox {
                    player_id: shooter_id,
                    effect,
                }])
            }
            None => self.resolve_player_hit(room, shooter_id, marker),
        }
    }

    fn resolve_player_hit(
        &self,
        room: &mut Room,
        shooter_id: PlayerId,
        marker: u16,
    ) -> Result<Vec<CombatEvent>, GameError> {
        let target_id = *room
            .marker_owners
            .get(&marker)
            .ok_or_else(|| GameError::NotFound(format!("Marker {}", marker)))?;
        let target = room
            .players
            .get(&target_id)
            .cloned()
            .ok_or_else(|| GameError::player_not_found(target_id))?;
        let shooter = room
            .players
            .get(&shooter_id)
            .cloned()
            .ok_or_else(|| GameError::player_not_found(shooter_id))?;

        // Copy what we need so no two player locks are ever held together
        let (shooter_alive, damage) = {
            let s = shooter.lock();
            (s.is_alive(), s.damage)
        };
        if !shooter_alive {
            return Ok(Vec::new());
        }

        let (eliminated, target_health) = {
            let mut t = target.lock();
            if !t.is_alive() {
                t.health = 0.0;
                return Ok(Vec::new());
            }
            t.health -= damage;
            let eliminated = t.health <= 0.0;
            if eliminated {
                t.health = 0.0;
                t.deaths += 1;
            }
            (eliminated, t.health)
        };

        let mut events = vec![CombatEvent::Hit {
            shooter_id,
            target_id,
            damage,
            target_health,
            eliminated,
        }];

        if !eliminated || shooter_id == target_id {
            return Ok(events);
        }

        let kills = {
            let mut s = shooter.lock();
            s.kills += 1;
            s.kills
        };

        // Only the kill scored by this shot can end the game
        if kills >= self.rules.kills_for_win {
            room.ended = true;
            room.winner = Some(shooter_id);
            events.push(CombatEvent::GameOver {
                winner_id: shooter_id,
            });
        }

        Ok(events)
    }
}
