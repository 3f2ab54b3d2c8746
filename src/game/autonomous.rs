//! Patrol-and-fire behaviour for vehicles without a human driver.
//!
//! The controller is a function of its own counters and the vehicle state:
//! no look-ahead, no pathfinding. Motion is a constant patrol velocity that
//! only changes when [`Vehicle::resolve_bounds`] bounces it off a wall.

use rand::Rng;

use super::vehicle::Vehicle;

/// Ticks between the activation of consecutive autonomous vehicles
pub const AUTONOMOUS_STAGGER: u32 = 60;
/// Fire interval range in ticks (inclusive start, exclusive end)
pub const FIRE_INTERVAL_MIN: u32 = 90;
pub const FIRE_INTERVAL_MAX: u32 = 240;
/// Per-tick chance of an idle heading twitch
pub const HEADING_JITTER_CHANCE: f64 = 0.01;
pub const HEADING_JITTER_MAX: f32 = 0.5;

/// What the controller wants this tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutonomousAction {
    /// Vehicle moves this tick
    pub active: bool,
    /// Spawn a projectile along the patrol direction
    pub fire: bool,
}

#[derive(Debug, Clone)]
pub struct AutonomousController {
    activation_delay: u32,
    ticks_alive: u32,
    fire_cooldown: u32,
}

impl AutonomousController {
    pub fn new<R: Rng + ?Sized>(activation_delay: u32, rng: &mut R) -> Self {
        Self {
            activation_delay,
            ticks_alive: 0,
            fire_cooldown: random_interval(rng),
        }
    }

    pub fn activation_delay(&self) -> u32 {
        self.activation_delay
    }

    pub fn fire_cooldown(&self) -> u32 {
        self.fire_cooldown
    }

    pub fn is_active(&self) -> bool {
        self.ticks_alive > self.activation_delay
    }

    /// Decide this tick's action and update the vehicle's patrol velocity/facing.
    pub fn tick<R: Rng + ?Sized>(&mut self, vehicle: &mut Vehicle, rng: &mut R) -> AutonomousAction {
        self.ticks_alive = self.ticks_alive.saturating_add(1);
        if !self.is_active() {
            return AutonomousAction::default();
        }

        if self.ticks_alive == self.activation_delay + 1 {
            vehicle.velocity = vehicle.forward() * vehicle.stats.max_speed;
        }

        if rng.gen_bool(HEADING_JITTER_CHANCE) {
            vehicle.heading += rng.gen_range(-HEADING_JITTER_MAX..=HEADING_JITTER_MAX);
        }

        self.fire_cooldown = self.fire_cooldown.saturating_sub(1);
        let fire = self.fire_cooldown == 0;
        if fire {
            self.fire_cooldown = random_interval(rng);
        }

        AutonomousAction { active: true, fire }
    }
}

fn random_interval<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(FIRE_INTERVAL_MIN..FIRE_INTERVAL_MAX)
}
