//! Built-in [`IntentSource`]s for headless clients

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::game::{vehicle_limit, HumanIntent, SimulationContext};

use super::game_loop::IntentSource;

/// Never presses anything
#[derive(Debug, Default, Clone, Copy)]
pub struct Idle;

impl IntentSource for Idle {
    fn next_intent(&mut self, _sim: &SimulationContext) -> HumanIntent {
        HumanIntent::default()
    }
}

/// Wanders between random waypoints and fires now and then
pub struct Autopilot {
    rng: ChaCha8Rng,
    waypoint: (f32, f32),
    ticks_to_retarget: u32,
}

impl Autopilot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            waypoint: (0.0, 0.0),
            ticks_to_retarget: 0,
        }
    }
}

impl IntentSource for Autopilot {
    fn next_intent(&mut self, sim: &SimulationContext) -> HumanIntent {
        let limit = vehicle_limit();
        if self.ticks_to_retarget == 0 {
            self.waypoint = (
                self.rng.gen_range(-limit..limit),
                self.rng.gen_range(-limit..limit),
            );
            self.ticks_to_retarget = self.rng.gen_range(60..240);
        }
        self.ticks_to_retarget -= 1;

        let local = sim.local();
        let desired = (self.waypoint.1 - local.position.z).atan2(self.waypoint.0 - local.position.x);
        let diff = (desired - local.heading + std::f32::consts::PI)
            .rem_euclid(std::f32::consts::TAU)
            - std::f32::consts::PI;

        HumanIntent {
            forward: true,
            backward: false,
            turn_left: diff > local.stats.turn_rate,
            turn_right: diff < -local.stats.turn_rate,
            fire: self.rng.gen_bool(0.02),
        }
    }
}
