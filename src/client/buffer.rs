//! Bounded history of remote snapshots used for time-shifted interpolation

use std::collections::VecDeque;

use glam::Vec3;

use crate::game::PlayerId;

/// Snapshots kept per remote vehicle
pub const REMOTE_BUFFER_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntitySnapshot {
    pub owner_id: PlayerId,
    pub position: Vec3,
    pub heading: f32,
    pub color_id: u32,
    /// Local receive time in Unix milliseconds
    pub timestamp_received: u64,
}

/// FIFO of the most recent snapshots, oldest evicted first
#[derive(Debug, Clone)]
pub struct RemoteBuffer {
    entries: VecDeque<RemoteEntitySnapshot>,
    capacity: usize,
}

impl RemoteBuffer {
    pub fn new() -> Self {
        Self::with_capacity(REMOTE_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, snapshot: RemoteEntitySnapshot) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn oldest(&self) -> Option<&RemoteEntitySnapshot> {
        self.entries.front()
    }

    pub fn latest(&self) -> Option<&RemoteEntitySnapshot> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pose at `render_time` (ms), blended between the two snapshots that
    /// bracket it. Before the oldest or after the newest snapshot the nearest
    /// one is returned unchanged.
    pub fn interpolate(&self, render_time: u64) -> Option<(Vec3, f32)> {
        let latest = self.entries.back()?;
        if render_time >= latest.timestamp_received {
            return Some((latest.position, latest.heading));
        }

        let mut iter = self.entries.iter();
        let mut prev = iter.next()?;
        if render_time <= prev.timestamp_received {
            return Some((prev.position, prev.heading));
        }

        for next in iter {
            if render_time <= next.timestamp_received {
                let span = (next.timestamp_received - prev.timestamp_received) as f32;
                let t = if span > 0.0 {
                    (render_time - prev.timestamp_received) as f32 / span
                } else {
                    1.0
                };
                let position = prev.position.lerp(next.position, t);
                let heading = lerp_angle(prev.heading, next.heading, t);
                return Some((position, heading));
            }
            prev = next;
        }

        Some((latest.position, latest.heading))
    }
}

impl Default for RemoteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpolate along the shorter arc
fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let delta = (to - from + PI).rem_euclid(TAU) - PI;
    from + delta * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn snap(x: f32, heading: f32, at: u64) -> RemoteEntitySnapshot {
        RemoteEntitySnapshot {
            owner_id: Uuid::nil(),
            position: Vec3::new(x, 0.0, 0.0),
            heading,
            color_id: 0,
            timestamp_received: at,
        }
    }

    #[test]
    fn eleventh_insert_evicts_oldest() {
        let mut buffer = RemoteBuffer::new();
        for i in 0..10 {
            buffer.push(snap(i as f32, 0.0, i));
        }
        assert_eq!(buffer.len(), 10);

        buffer.push(snap(10.0, 0.0, 10));
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.oldest().unwrap().timestamp_received, 1);
        assert_eq!(buffer.latest().unwrap().timestamp_received, 10);
    }

    #[test]
    fn interpolates_between_bracketing_snapshots() {
        let mut buffer = RemoteBuffer::new();
        buffer.push(snap(0.0, 0.0, 100));
        buffer.push(snap(10.0, 1.0, 200));

        let (pos, heading) = buffer.interpolate(150).unwrap();
        assert!((pos.x - 5.0).abs() < 1e-5);
        assert!((heading - 0.5).abs() < 1e-5);
    }

    #[test]
    fn clamps_outside_the_buffered_window() {
        let mut buffer = RemoteBuffer::new();
        assert!(buffer.interpolate(0).is_none());
        buffer.push(snap(1.0, 0.0, 100));
        buffer.push(snap(2.0, 0.0, 200));
        assert_eq!(buffer.interpolate(50).unwrap().0.x, 1.0);
        assert_eq!(buffer.interpolate(500).unwrap().0.x, 2.0);
    }

    #[test]
    fn heading_takes_the_short_way_round() {
        use std::f32::consts::PI;
        let mid = lerp_angle(PI - 0.1, -PI + 0.1, 0.5);
        assert!((mid.abs() - PI).abs() < 1e-4);
    }
}
