//! Vehicle entity and per-tick motion rules

use glam::Vec3;

use super::vehicle_limit;

/// Motion constants for a vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleStats {
    /// Speed cap in arena units per tick
    pub max_speed: f32,
    /// Acceleration (thrust re-aims instantly, so only carried for presentation)
    pub accel: f32,
    /// Fraction of velocity lost per tick without thrust
    pub decel: f32,
    /// Radians turned per tick
    pub turn_rate: f32,
    /// Collision sphere radius
    pub radius: f32,
}

impl VehicleStats {
    pub const fn human() -> Self {
        Self {
            max_speed: 0.625,
            accel: 0.05,
            decel: 0.05,
            turn_rate: 0.05,
            radius: 2.0,
        }
    }

    pub const fn autonomous() -> Self {
        Self {
            max_speed: 0.3,
            accel: 0.0,
            decel: 0.0,
            turn_rate: 0.0,
            radius: 2.0,
        }
    }
}

/// Who drives a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleKind {
    Human,
    Autonomous,
}

/// Directional intent for one tick from the input collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HumanIntent {
    pub forward: bool,
    pub backward: bool,
    pub turn_left: bool,
    pub turn_right: bool,
    pub fire: bool,
}

impl HumanIntent {
    /// -1, 0 or 1. Pressing both directions turns nowhere.
    pub fn turn_direction(&self) -> f32 {
        let mut dir = 0.0;
        if self.turn_left {
            dir += 1.0;
        }
        if self.turn_right {
            dir -= 1.0;
        }
        dir
    }

    /// -1, 0 or 1 thrust sign
    pub fn thrust(&self) -> f32 {
        match (self.forward, self.backward) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        }
    }
}

/// A vehicle in the arena
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub position: Vec3,
    /// Facing in radians, measured from +x towards +z
    pub heading: f32,
    pub velocity: Vec3,
    pub stats: VehicleStats,
    pub color_id: u32,
    pub kind: VehicleKind,
    /// Seconds survived in the current round
    pub survival_time: f32,
    pub eliminated: bool,
}

impl Vehicle {
    pub fn new(kind: VehicleKind, position: Vec3, heading: f32, color_id: u32) -> Self {
        let stats = match kind {
            VehicleKind::Human => VehicleStats::human(),
            VehicleKind::Autonomous => VehicleStats::autonomous(),
        };
        Self {
            position,
            heading,
            velocity: Vec3::ZERO,
            stats,
            color_id,
            kind,
            survival_time: 0.0,
            eliminated: false,
        }
    }

    /// Unit vector the vehicle faces
    pub fn forward(&self) -> Vec3 {
        heading_vector(self.heading)
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Apply a human intent: turn, then re-aim or decay velocity.
    /// `None` means intents are not accepted this tick and the vehicle only decays.
    pub fn apply_intent(&mut self, intent: Option<&HumanIntent>) {
        let (turn, thrust) = intent
            .map(|i| (i.turn_direction(), i.thrust()))
            .unwrap_or((0.0, 0.0));

        self.heading += turn * self.stats.turn_rate;

        if thrust != 0.0 {
            self.velocity = self.forward() * self.stats.max_speed * thrust;
        } else {
            self.velocity *= 1.0 - self.stats.decel;
        }
    }

    /// Move by one tick of velocity and resolve the arena walls
    pub fn integrate(&mut self) {
        self.position += self.velocity;
        self.resolve_bounds();
    }

    /// Humans are walled in; autonomous vehicles bounce off.
    pub fn resolve_bounds(&mut self) {
        let limit = vehicle_limit();
        match self.kind {
            VehicleKind::Human => {
                clamp_axis(&mut self.position.x, &mut self.velocity.x, limit);
                clamp_axis(&mut self.position.z, &mut self.velocity.z, limit);
            }
            VehicleKind::Autonomous => {
                reflect_axis(&mut self.position.x, &mut self.velocity.x, limit);
                reflect_axis(&mut self.position.z, &mut self.velocity.z, limit);
            }
        }
    }

    /// Sphere test against another body
    pub fn overlaps(&self, point: Vec3, radius: f32) -> bool {
        self.position.distance(point) < self.stats.radius + radius
    }
}

/// `(cos h, 0, sin h)`
pub fn heading_vector(heading: f32) -> Vec3 {
    Vec3::new(heading.cos(), 0.0, heading.sin())
}

fn clamp_axis(pos: &mut f32, vel: &mut f32, limit: f32) {
    if *pos > limit {
        *pos = limit;
        *vel = 0.0;
    } else if *pos < -limit {
        *pos = -limit;
        *vel = 0.0;
    }
}

fn reflect_axis(pos: &mut f32, vel: &mut f32, limit: f32) {
    if *pos > limit {
        *pos = limit;
        *vel = -vel.abs();
    } else if *pos < -limit {
        *pos = -limit;
        *vel = vel.abs();
    }
}
