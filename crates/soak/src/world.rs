use glam::{Vec2, Vec3};
use rand::Rng;
use rand::rngs::StdRng;

use snapnet::EntityState;
use snapnet::msg::{angle_to_wire, coord_to_wire};

const EVENT_FOOTSTEP: u8 = 2;

/// Snaps a position to what the wire can carry.
fn snap_coord(value: f32) -> f32 {
    f32::from(coord_to_wire(value)) * (1.0 / 8.0)
}

fn snap_angle(degrees: f32) -> f32 {
    f32::from(angle_to_wire(degrees) as i8) * (360.0 / 256.0)
}

fn snap_vec(v: Vec3, snap: fn(f32) -> f32) -> Vec3 {
    Vec3::new(snap(v.x), snap(v.y), snap(v.z))
}

#[derive(Debug, Clone)]
struct Mover {
    number: u16,
    center: Vec2,
    radius: f32,
    speed: f32,
    phase: f32,
    height: f32,
    model: u8,
    /// Entities with a period blink in and out of the snapshot.
    period: Option<u32>,
}

/// A toy scene of entities orbiting fixed points, kept on the wire
/// quantization grid so a decoded frame compares exactly.
pub struct World {
    movers: Vec<Mover>,
    tick: u32,
    states: Vec<EntityState>,
}

impl World {
    pub fn new(count: u16, rng: &mut StdRng) -> Self {
        let movers = (1..=count)
            .map(|number| Mover {
                number,
                center: Vec2::new(rng.gen_range(-2000.0..2000.0), rng.gen_range(-2000.0..2000.0)),
                radius: rng.gen_range(16.0..256.0),
                speed: rng.gen_range(0.2..2.0),
                phase: rng.gen_range(0.0..std::f32::consts::TAU),
                height: rng.gen_range(0.0..512.0),
                model: 1 + (number % 5) as u8,
                period: (number % 7 == 0).then(|| rng.gen_range(20..60)),
            })
            .collect();

        let mut world = Self {
            movers,
            tick: 0,
            states: Vec::new(),
        };
        world.rebuild();
        world
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn advance(&mut self) {
        self.tick += 1;
        self.rebuild();
    }

    /// Visible entities sorted by number.
    pub fn snapshot(&self) -> &[EntityState] {
        &self.states
    }

    fn rebuild(&mut self) {
        let tick = self.tick;
        let previous = std::mem::take(&mut self.states);
        let mut prev = previous.iter().peekable();

        for mover in &self.movers {
            let old = prev.next_if(|e| e.number <= mover.number).filter(|e| e.number == mover.number);

            if let Some(period) = mover.period {
                if (tick / period) % 2 == 1 {
                    continue;
                }
            }

            let t = tick as f32 * 0.05 * mover.speed + mover.phase;
            let origin = Vec3::new(
                mover.center.x + mover.radius * t.cos(),
                mover.center.y + mover.radius * t.sin(),
                mover.height,
            );
            let yaw = (t.to_degrees() + 90.0).rem_euclid(360.0) - 180.0;

            let mut state = EntityState::new(mover.number);
            state.origin = snap_vec(origin, snap_coord);
            state.angles = Vec3::new(0.0, snap_angle(yaw), 0.0);
            state.old_origin = old.map_or(state.origin, |o| o.origin);
            state.modelindex[0] = mover.model;
            state.frame = (tick / 2 % 40) as u16;
            state.skinnum = u32::from(mover.number % 3);
            if tick % 30 == u32::from(mover.number) % 30 {
                state.event = EVENT_FOOTSTEP;
            }

            self.states.push(state);
        }
    }
}
