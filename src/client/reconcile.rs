//! Merges relay messages into this client's view of the world.
//!
//! Remote vehicles are mirrors: their fields snap to whatever the relay
//! reports and are never simulated locally. Each mirror also keeps a short
//! [`RemoteBuffer`] so the presentation layer can render a time-shifted,
//! interpolated pose instead of the raw snapped one.

use std::collections::BTreeMap;

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::game::round::{next_spectate_target, rank, RankEntry};
use crate::game::PlayerId;
use crate::ws::protocol::{PlayerPose, Position, Rotation, ServerMsg};

use super::buffer::{RemoteBuffer, RemoteEntitySnapshot};

/// Weight of a new round-trip sample in the smoothed estimate
const LATENCY_SMOOTHING: f32 = 0.2;

/// Read-only mirror of another player's vehicle
#[derive(Debug, Clone)]
pub struct RemoteVehicle {
    pub id: PlayerId,
    pub position: Vec3,
    pub heading: f32,
    pub color_id: u32,
    pub eliminated: bool,
    /// Known once the relay reports the elimination
    pub survival_time: Option<f32>,
    pub buffer: RemoteBuffer,
}

impl RemoteVehicle {
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            position: Vec3::ZERO,
            heading: 0.0,
            color_id: 0,
            eliminated: false,
            survival_time: None,
            buffer: RemoteBuffer::new(),
        }
    }

    fn snap_to(&mut self, position: Position, rotation: Rotation, color_id: u32, now: u64) {
        self.position = Vec3::new(position.x, 0.0, position.z);
        self.heading = rotation.y;
        self.color_id = color_id;
        self.buffer.push(RemoteEntitySnapshot {
            owner_id: self.id,
            position: self.position,
            heading: self.heading,
            color_id,
            timestamp_received: now,
        });
    }
}

/// Smoothed round-trip estimate from ping probes
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyEstimate {
    rtt_ms: Option<f32>,
}

impl LatencyEstimate {
    pub fn sample(&mut self, rtt_ms: f32) {
        self.rtt_ms = Some(match self.rtt_ms {
            Some(prev) => prev + (rtt_ms - prev) * LATENCY_SMOOTHING,
            None => rtt_ms,
        });
    }

    pub fn rtt_ms(&self) -> Option<f32> {
        self.rtt_ms
    }

    pub fn one_way_ms(&self) -> Option<f32> {
        self.rtt_ms.map(|rtt| rtt / 2.0)
    }
}

/// What the tick loop has to act on after a message was applied
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEffect {
    Welcomed(PlayerId),
    /// Overwrite the local vehicle position
    Correction(Vec3),
    RemoteEliminated { id: PlayerId, survival_time: f32 },
    RoundOver { winner: Option<PlayerId> },
    SpectateChanged(Option<PlayerId>),
    /// Admission refused; terminal for this connection attempt
    Rejected(String),
}

#[derive(Debug, Default)]
pub struct Reconciler {
    local_id: Option<PlayerId>,
    remotes: BTreeMap<PlayerId, RemoteVehicle>,
    spectating: Option<PlayerId>,
    latency: LatencyEstimate,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local_id
    }

    /// Remote mirrors in ascending id order
    pub fn remotes(&self) -> impl Iterator<Item = &RemoteVehicle> {
        self.remotes.values()
    }

    pub fn remote(&self, id: &PlayerId) -> Option<&RemoteVehicle> {
        self.remotes.get(id)
    }

    /// True while at least one remote vehicle is still in play
    pub fn has_live_remotes(&self) -> bool {
        self.remotes.values().any(|r| !r.eliminated)
    }

    pub fn spectating(&self) -> Option<PlayerId> {
        self.spectating
    }

    pub fn latency(&self) -> LatencyEstimate {
        self.latency
    }

    /// Apply one relay message received at `now` (Unix ms)
    pub fn apply(&mut self, msg: ServerMsg, now: u64) -> Vec<ReconcileEffect> {
        let mut effects = Vec::new();

        match msg {
            ServerMsg::Welcome { id, .. } => {
                info!(player_id = %id, "Admitted by relay");
                self.local_id = Some(id);
                self.remotes.remove(&id);
                effects.push(ReconcileEffect::Welcomed(id));
            }
            ServerMsg::CurrentPlayers { players } => {
                self.replace_remotes(players, now);
            }
            ServerMsg::PlayerJoined {
                id,
                position,
                rotation,
            } => {
                if !self.is_local(&id) {
                    debug!(player_id = %id, "Remote player joined");
                    self.remotes
                        .entry(id)
                        .or_insert_with(|| RemoteVehicle::new(id))
                        .snap_to(position, rotation, 0, now);
                }
            }
            ServerMsg::PlayerMoved {
                id,
                position,
                rotation,
                color_id,
            } => {
                if !self.is_local(&id) {
                    self.remotes
                        .entry(id)
                        .or_insert_with(|| RemoteVehicle::new(id))
                        .snap_to(position, rotation, color_id, now);
                }
            }
            ServerMsg::PlayerLeft { id } => {
                if self.remotes.remove(&id).is_some() {
                    debug!(player_id = %id, "Remote player left");
                }
                if self.spectating == Some(id) {
                    effects.extend(self.retarget_spectating());
                }
            }
            ServerMsg::Pong { t } => {
                self.latency.sample(now.saturating_sub(t) as f32);
            }
            ServerMsg::ServerFull { message } => {
                warn!(%message, "Relay refused admission");
                effects.push(ReconcileEffect::Rejected(message));
            }
            ServerMsg::InvalidMovement { position } => {
                warn!(x = position.x, z = position.z, "Relay corrected local position");
                effects.push(ReconcileEffect::Correction(Vec3::new(
                    position.x, 0.0, position.z,
                )));
            }
            ServerMsg::PlayerEliminated { id, .. } if self.is_local(&id) => {
                debug!("Relay confirmed local elimination");
            }
            ServerMsg::PlayerEliminated { id, survival_time } => {
                if let Some(remote) = self.remotes.get_mut(&id) {
                    remote.eliminated = true;
                    remote.survival_time = Some(survival_time);
                }
                effects.push(ReconcileEffect::RemoteEliminated { id, survival_time });
                if self.spectating == Some(id) {
                    effects.extend(self.retarget_spectating());
                }
            }
            ServerMsg::GameOver { winner } => {
                info!(winner = ?winner, "Relay declared round over");
                effects.push(ReconcileEffect::RoundOver { winner });
            }
        }

        effects
    }

    /// Start following a live remote vehicle, e.g. after the local one was eliminated
    pub fn begin_spectating(&mut self) -> Option<PlayerId> {
        self.spectating = next_spectate_target(None, self.alive_ids());
        self.spectating
    }

    /// Move to the next live remote vehicle in id order
    pub fn cycle_spectating(&mut self) -> Option<PlayerId> {
        self.spectating = next_spectate_target(self.spectating, self.alive_ids());
        self.spectating
    }

    pub fn stop_spectating(&mut self) {
        self.spectating = None;
    }

    /// End-of-round ranking. Remotes still in play are credited with the
    /// round's elapsed playing time.
    pub fn ranking(&self, local_survival: f32, round_elapsed: f32) -> Vec<RankEntry> {
        let local = (self.local_id.unwrap_or_default(), local_survival);
        let remotes = self
            .remotes
            .values()
            .map(|r| (r.id, r.survival_time.unwrap_or(round_elapsed)));
        rank(local, remotes)
    }

    /// Forget per-round state on every mirror
    pub fn reset_round(&mut self) {
        for remote in self.remotes.values_mut() {
            remote.eliminated = false;
            remote.survival_time = None;
        }
        self.spectating = None;
    }

    fn is_local(&self, id: &PlayerId) -> bool {
        self.local_id.as_ref() == Some(id)
    }

    fn alive_ids(&self) -> Vec<PlayerId> {
        self.remotes
            .values()
            .filter(|r| !r.eliminated)
            .map(|r| r.id)
            .collect()
    }

    fn replace_remotes(&mut self, players: std::collections::HashMap<PlayerId, PlayerPose>, now: u64) {
        self.remotes.clear();
        for (id, pose) in players {
            if self.is_local(&id) {
                continue;
            }
            let mut remote = RemoteVehicle::new(id);
            remote.snap_to(pose.position, pose.rotation, pose.color_id, now);
            self.remotes.insert(id, remote);
        }
        if let Some(current) = self.spectating {
            if !self.remotes.contains_key(&current) {
                self.spectating = None;
            }
        }
    }

    fn retarget_spectating(&mut self) -> Option<ReconcileEffect> {
        let next = next_spectate_target(self.spectating, self.alive_ids());
        if next == self.spectating {
            return None;
        }
        self.spectating = next;
        Some(ReconcileEffect::SpectateChanged(next))
    }
}
