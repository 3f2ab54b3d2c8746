//! Capacity-bounded registry of connected players and their last reported pose.
//!
//! Entries are keyed by session id in a [`DashMap`], so a session updating its
//! own entry never contends with another session. Only admission, which must
//! check the size and insert atomically, takes the registry-wide lock.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::game::PlayerId;
use crate::ws::protocol::PlayerPose;

/// Registry row
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerEntry {
    pub pose: PlayerPose,
    pub eliminated: bool,
}

pub struct Registry {
    entries: DashMap<PlayerId, PlayerEntry>,
    admission: Mutex<()>,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            admission: Mutex::new(()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert a new entry unless the registry is full. Returns false when full.
    pub fn admit(&self, id: PlayerId, pose: PlayerPose) -> bool {
        self.admit_with(id, pose, |_| ()).is_some()
    }

    /// Admit `id` and run `on_admitted` with a snapshot that already contains it.
    ///
    /// The callback runs under the admission lock: no other session joins or
    /// leaves between the insert, the snapshot and whatever the callback
    /// publishes. Returns `None` when full, without calling `on_admitted`.
    pub fn admit_with<R>(
        &self,
        id: PlayerId,
        pose: PlayerPose,
        on_admitted: impl FnOnce(HashMap<PlayerId, PlayerPose>) -> R,
    ) -> Option<R> {
        let _guard = self.admission.lock();
        if self.entries.len() >= self.capacity {
            return None;
        }
        self.entries.insert(
            id,
            PlayerEntry {
                pose,
                eliminated: false,
            },
        );
        Some(on_admitted(self.collect_poses()))
    }

    /// Update the pose of an existing entry. Returns false for unknown ids.
    pub fn upsert(&self, id: PlayerId, pose: PlayerPose) -> bool {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.pose = pose;
                true
            }
            None => false,
        }
    }

    /// Mark an entry eliminated. Returns false if unknown or already eliminated.
    pub fn set_eliminated(&self, id: PlayerId) -> bool {
        match self.entries.get_mut(&id) {
            Some(mut entry) if !entry.eliminated => {
                entry.eliminated = true;
                true
            }
            _ => false,
        }
    }

    /// Clear every elimination flag for a new round
    pub fn clear_eliminations(&self) {
        for mut entry in self.entries.iter_mut() {
            entry.eliminated = false;
        }
    }

    pub fn remove(&self, id: &PlayerId) -> Option<PlayerEntry> {
        self.remove_with(id, |entry| entry)
    }

    /// Remove `id` and run `on_removed` under the admission lock, ordered
    /// against every [`Registry::admit_with`] callback.
    pub fn remove_with<R>(
        &self,
        id: &PlayerId,
        on_removed: impl FnOnce(PlayerEntry) -> R,
    ) -> Option<R> {
        let _guard = self.admission.lock();
        self.entries.remove(id).map(|(_, entry)| on_removed(entry))
    }

    pub fn get(&self, id: &PlayerId) -> Option<PlayerEntry> {
        self.entries.get(id).map(|e| *e.value())
    }

    /// Copy of every pose, taken under the admission lock so no session
    /// joins or leaves halfway through.
    pub fn snapshot(&self) -> HashMap<PlayerId, PlayerPose> {
        let _guard = self.admission.lock();
        self.collect_poses()
    }

    /// Ids whose vehicle is still in play
    pub fn survivors(&self) -> Vec<PlayerId> {
        self.entries
            .iter()
            .filter(|e| !e.value().eliminated)
            .map(|e| *e.key())
            .collect()
    }

    fn collect_poses(&self) -> HashMap<PlayerId, PlayerPose> {
        self.entries
            .iter()
            .map(|e| (*e.key(), e.value().pose))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::Position;
    use uuid::Uuid;

    #[test]
    fn admit_rejects_beyond_capacity() {
        let registry = Registry::new(2);
        assert!(registry.admit(Uuid::new_v4(), PlayerPose::default()));
        assert!(registry.admit(Uuid::new_v4(), PlayerPose::default()));

        let late = Uuid::new_v4();
        assert!(!registry.admit(late, PlayerPose::default()));
        assert!(!registry.contains(&late));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn upsert_only_touches_known_entries() {
        let registry = Registry::new(4);
        let id = Uuid::new_v4();
        let pose = PlayerPose {
            position: Position { x: 3.0, z: 4.0 },
            ..Default::default()
        };
        assert!(!registry.upsert(id, pose));

        registry.admit(id, PlayerPose::default());
        assert!(registry.upsert(id, pose));
        assert_eq!(registry.get(&id).unwrap().pose, pose);
        assert_eq!(registry.snapshot()[&id], pose);
    }

    #[test]
    fn remove_frees_a_slot() {
        let registry = Registry::new(1);
        let id = Uuid::new_v4();
        registry.admit(id, PlayerPose::default());
        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.admit(Uuid::new_v4(), PlayerPose::default()));
    }

    #[test]
    fn admit_with_snapshot_includes_newcomer() {
        let registry = Registry::new(2);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        registry.admit(a, PlayerPose::default());

        let seen = registry.admit_with(b, PlayerPose::default(), |players| {
            let mut ids: Vec<_> = players.into_keys().collect();
            ids.sort();
            ids
        });
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(seen, Some(expected));

        let mut called = false;
        let full = registry.admit_with(Uuid::new_v4(), PlayerPose::default(), |_| called = true);
        assert!(full.is_none());
        assert!(!called);
    }

    #[test]
    fn remove_with_runs_only_for_known_ids() {
        let registry = Registry::new(2);
        let id = Uuid::new_v4();
        registry.admit(id, PlayerPose::default());

        assert_eq!(registry.remove_with(&id, |entry| entry.eliminated), Some(false));
        assert_eq!(registry.remove_with(&id, |_| ()), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn eliminations_and_survivors() {
        let registry = Registry::new(3);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        registry.admit(a, PlayerPose::default());
        registry.admit(b, PlayerPose::default());

        assert!(registry.set_eliminated(a));
        assert!(!registry.set_eliminated(a));
        assert_eq!(registry.survivors(), vec![b]);

        registry.clear_eliminations();
        assert_eq!(registry.survivors().len(), 2);
    }

    #[test]
    fn concurrent_admission_never_overfills() {
        let registry = std::sync::Arc::new(Registry::new(10));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = std::sync::Arc::clone(&registry);
                std::thread::spawn(move || registry.admit(Uuid::new_v4(), PlayerPose::default()))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 10);
        assert_eq!(registry.len(), 10);
    }
}
