//! Local simulation step.
//!
//! [`SimulationContext`] owns every entity this client simulates: its own
//! vehicle, the autonomous vehicles and all live projectiles. One call to
//! [`SimulationContext::step`] is one tick: round bookkeeping, intents,
//! integration, projectile lifetime, then collisions.

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::util::time::tick_delta;

use super::autonomous::{AutonomousController, AUTONOMOUS_STAGGER};
use super::projectile::{Projectile, PROJECTILE_RADIUS};
use super::round::{RoundPhase, RoundState};
use super::vehicle::{HumanIntent, Vehicle, VehicleKind};
use super::{vehicle_limit, PlayerId, VehicleRef};

/// Ticks between two shots of the human vehicle
pub const HUMAN_FIRE_COOLDOWN: u32 = 15;

/// Something observable that happened during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    PhaseChanged(RoundPhase),
    Fired {
        by: VehicleRef,
    },
    Eliminated {
        vehicle: VehicleRef,
        by: VehicleRef,
        survival_time: f32,
    },
}

/// Autonomous vehicle together with its controller
#[derive(Debug, Clone)]
pub struct AutonomousSlot {
    pub vehicle: Vehicle,
    pub controller: AutonomousController,
}

pub struct SimulationContext {
    local_id: PlayerId,
    local: Vehicle,
    local_fire_cooldown: u32,
    autonomous: Vec<AutonomousSlot>,
    projectiles: Vec<Projectile>,
    round: RoundState,
    rng: ChaCha8Rng,
    autonomous_count: usize,
    tick: u64,
}

impl SimulationContext {
    /// Build a fresh context with `autonomous_count` staggered autonomous vehicles.
    pub fn new(rng: ChaCha8Rng, autonomous_count: usize) -> Self {
        let mut ctx = Self {
            local_id: PlayerId::nil(),
            local: Vehicle::new(VehicleKind::Human, Vec3::ZERO, 0.0, 0),
            local_fire_cooldown: 0,
            autonomous: Vec::new(),
            projectiles: Vec::new(),
            round: RoundState::new(),
            rng,
            autonomous_count,
            tick: 0,
        };
        ctx.setup_entities();
        ctx
    }

    pub fn from_seed(seed: u64, autonomous_count: usize) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed), autonomous_count)
    }

    pub fn local_id(&self) -> PlayerId {
        self.local_id
    }

    /// Adopt the id the relay assigned to this client
    pub fn set_local_id(&mut self, id: PlayerId) {
        self.local_id = id;
    }

    pub fn local(&self) -> &Vehicle {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut Vehicle {
        &mut self.local
    }

    pub fn autonomous(&self) -> &[AutonomousSlot] {
        &self.autonomous
    }

    pub fn autonomous_mut(&mut self) -> &mut [AutonomousSlot] {
        &mut self.autonomous
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn round_mut(&mut self) -> &mut RoundState {
        &mut self.round
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Look up any vehicle this context simulates
    pub fn vehicle(&self, which: VehicleRef) -> Option<&Vehicle> {
        match which {
            VehicleRef::Local => Some(&self.local),
            VehicleRef::Autonomous(i) => self.autonomous.get(i).map(|s| &s.vehicle),
        }
    }

    /// Inject a projectile, e.g. a shot replayed from elsewhere
    pub fn spawn_projectile(&mut self, projectile: Projectile) {
        self.projectiles.push(projectile);
    }

    /// Waiting -> Countdown
    pub fn start_round(&mut self) -> bool {
        self.round.start()
    }

    /// Finished -> Waiting with freshly placed entities
    pub fn reset_round(&mut self) -> bool {
        if !self.round.reset() {
            return false;
        }
        self.setup_entities();
        info!(round = self.round.round_number(), "Round reset");
        true
    }

    /// End the round from outside, e.g. on a game-over broadcast
    pub fn finish_round(&mut self) -> bool {
        self.round.finish()
    }

    /// Server override of the local vehicle position
    pub fn apply_correction(&mut self, position: Vec3) {
        self.local.position = Vec3::new(position.x, self.local.position.y, position.z);
    }

    /// Run one tick
    pub fn step(&mut self, intent: &HumanIntent) -> Vec<SimEvent> {
        let mut events = Vec::new();
        self.tick += 1;

        if let Some(phase) = self.round.tick() {
            events.push(SimEvent::PhaseChanged(phase));
        }
        let accepting = self.round.accepts_intents();

        self.step_local(intent, accepting, &mut events);
        self.step_autonomous(accepting, &mut events);

        let rng = &mut self.rng;
        self.projectiles.retain_mut(|p| p.update(&mut *rng));

        self.resolve_hits(&mut events);

        if self.round.phase() == RoundPhase::Playing {
            let dt = tick_delta();
            if !self.local.eliminated {
                self.local.survival_time += dt;
            }
            for slot in self.autonomous.iter_mut().filter(|s| !s.vehicle.eliminated) {
                slot.vehicle.survival_time += dt;
            }
        }

        if self.local.eliminated && self.round.finish() {
            events.push(SimEvent::PhaseChanged(RoundPhase::Finished));
        }

        events
    }

    fn step_local(&mut self, intent: &HumanIntent, accepting: bool, events: &mut Vec<SimEvent>) {
        self.local_fire_cooldown = self.local_fire_cooldown.saturating_sub(1);
        if self.local.eliminated {
            return;
        }

        self.local.apply_intent(accepting.then_some(intent));
        self.local.integrate();

        if accepting && intent.fire && self.local_fire_cooldown == 0 {
            let origin = muzzle(&self.local, self.local.heading);
            if let Some(p) = Projectile::fire(VehicleRef::Local, origin, self.local.heading) {
                self.projectiles.push(p);
                self.local_fire_cooldown = HUMAN_FIRE_COOLDOWN;
                events.push(SimEvent::Fired {
                    by: VehicleRef::Local,
                });
            }
        }
    }

    fn step_autonomous(&mut self, accepting: bool, events: &mut Vec<SimEvent>) {
        if !accepting {
            return;
        }

        for (idx, slot) in self.autonomous.iter_mut().enumerate() {
            if slot.vehicle.eliminated {
                continue;
            }

            let action = slot.controller.tick(&mut slot.vehicle, &mut self.rng);
            if !action.active {
                continue;
            }
            slot.vehicle.integrate();

            if action.fire {
                let v = slot.vehicle.velocity;
                let aim = v.z.atan2(v.x);
                let origin = muzzle(&slot.vehicle, aim);
                match Projectile::fire(VehicleRef::Autonomous(idx), origin, aim) {
                    Some(p) => {
                        self.projectiles.push(p);
                        events.push(SimEvent::Fired {
                            by: VehicleRef::Autonomous(idx),
                        });
                    }
                    None => debug!(slot = idx, "Discarded directionless shot"),
                }
            }
        }
    }

    fn resolve_hits(&mut self, events: &mut Vec<SimEvent>) {
        let mut idx = 0;
        while idx < self.projectiles.len() {
            let projectile = &self.projectiles[idx];
            let hit = self.find_target(projectile);

            match hit {
                Some(target) => {
                    let by = projectile.owner;
                    self.projectiles.swap_remove(idx);
                    let vehicle = match target {
                        VehicleRef::Local => &mut self.local,
                        VehicleRef::Autonomous(i) => &mut self.autonomous[i].vehicle,
                    };
                    vehicle.eliminated = true;
                    vehicle.velocity = Vec3::ZERO;
                    let survival_time = vehicle.survival_time;

                    if target == VehicleRef::Local {
                        self.round.eliminate(self.local_id);
                    }
                    info!(?target, ?by, survival_time, "Vehicle eliminated");
                    events.push(SimEvent::Eliminated {
                        vehicle: target,
                        by,
                        survival_time,
                    });
                }
                None => idx += 1,
            }
        }
    }

    fn find_target(&self, projectile: &Projectile) -> Option<VehicleRef> {
        let candidates = std::iter::once((VehicleRef::Local, &self.local)).chain(
            self.autonomous
                .iter()
                .enumerate()
                .map(|(i, s)| (VehicleRef::Autonomous(i), &s.vehicle)),
        );

        candidates
            .filter(|(which, v)| !v.eliminated && *which != projectile.owner)
            .find(|(_, v)| v.overlaps(projectile.position, projectile.radius))
            .map(|(which, _)| which)
    }

    fn setup_entities(&mut self) {
        self.local = Vehicle::new(VehicleKind::Human, Vec3::ZERO, 0.0, self.local.color_id);
        self.local_fire_cooldown = 0;
        self.projectiles.clear();

        let spread = vehicle_limit() * 0.8;
        self.autonomous = (0..self.autonomous_count)
            .map(|i| {
                let position = Vec3::new(
                    self.rng.gen_range(-spread..spread),
                    0.0,
                    self.rng.gen_range(-spread..spread),
                );
                let heading = self.rng.gen_range(0.0..std::f32::consts::TAU);
                let delay = i as u32 * AUTONOMOUS_STAGGER;
                AutonomousSlot {
                    vehicle: Vehicle::new(VehicleKind::Autonomous, position, heading, i as u32 + 1),
                    controller: AutonomousController::new(delay, &mut self.rng),
                }
            })
            .collect();
    }
}

/// Spawn point just outside the firer's collision sphere
fn muzzle(vehicle: &Vehicle, aim: f32) -> Vec3 {
    let dir = super::vehicle::heading_vector(aim);
    vehicle.position + dir * (vehicle.stats.radius + PROJECTILE_RADIUS)
}
