//! Session relay: admission gate and rebroadcast of client-reported state.
//!
//! The relay never simulates. It stores what clients report and forwards it
//! to everyone else. The one check it performs is the arena bounds: a pose
//! outside the legal area is clamped and the sender gets `InvalidMovement`.
//! Reported motion is otherwise trusted as-is.

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::{vehicle_limit, PlayerId};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, PlayerPose, Position, Rotation, ServerMsg};

use super::registry::Registry;

/// Outcome of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted(PlayerId),
    Rejected,
}

pub struct SessionRelay {
    registry: Registry,
    outbound: DashMap<PlayerId, mpsc::Sender<ServerMsg>>,
}

impl SessionRelay {
    pub fn new(max_players: usize) -> Self {
        Self {
            registry: Registry::new(max_players),
            outbound: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn player_count(&self) -> usize {
        self.registry.len()
    }

    /// Admit a new session or reject it when the arena is full.
    ///
    /// On rejection `ServerFull` is queued on `tx` and nothing is registered;
    /// the caller is expected to close the connection. The welcome, the
    /// snapshot, the outbound registration and the join notice all happen
    /// under the registry's admission lock, so a concurrent join or leave is
    /// either in the snapshot or announced afterwards, never lost in between.
    pub fn connect(&self, tx: mpsc::Sender<ServerMsg>) -> Admission {
        let id = Uuid::new_v4();
        let pose = PlayerPose::default();

        let admitted = self.registry.admit_with(id, pose, |players| {
            deliver(
                &tx,
                ServerMsg::Welcome {
                    id,
                    server_time: unix_millis(),
                },
            );
            deliver(&tx, ServerMsg::CurrentPlayers { players });
            self.broadcast_except(
                id,
                ServerMsg::PlayerJoined {
                    id,
                    position: pose.position,
                    rotation: pose.rotation,
                },
            );
            self.outbound.insert(id, tx.clone());
        });

        if admitted.is_none() {
            warn!(
                capacity = self.registry.capacity(),
                "Arena full, rejecting connection"
            );
            deliver(
                &tx,
                ServerMsg::ServerFull {
                    message: format!("Arena is full ({} players)", self.registry.capacity()),
                },
            );
            return Admission::Rejected;
        }

        info!(session_id = %id, players = self.registry.len(), "Session joined");
        Admission::Admitted(id)
    }

    /// Dispatch one decoded client message
    pub fn handle(&self, id: PlayerId, msg: ClientMsg) {
        match msg {
            ClientMsg::Move {
                position,
                rotation,
                color_id,
            } => self.move_player(id, position, rotation, color_id),
            ClientMsg::Ping { t } => self.send_to(id, ServerMsg::Pong { t }),
            ClientMsg::Eliminated { survival_time } => self.eliminate(id, survival_time),
        }
    }

    /// Store the reported pose and forward it to every other session
    pub fn move_player(&self, id: PlayerId, position: Position, rotation: Rotation, color_id: u32) {
        let clamped = clamp_to_arena(position);
        let pose = PlayerPose {
            position: clamped,
            rotation,
            color_id,
        };

        if !self.registry.upsert(id, pose) {
            debug!(session_id = %id, "Move from unregistered session ignored");
            return;
        }

        if clamped != position {
            warn!(
                session_id = %id,
                x = position.x,
                z = position.z,
                "Reported position outside arena, correcting"
            );
            self.send_to(id, ServerMsg::InvalidMovement { position: clamped });
        }

        self.broadcast_except(
            id,
            ServerMsg::PlayerMoved {
                id,
                position: clamped,
                rotation,
                color_id,
            },
        );
    }

    /// Record an elimination, tell every session, and end the round when one
    /// survivor is left.
    pub fn eliminate(&self, id: PlayerId, survival_time: f32) {
        if !self.registry.set_eliminated(id) {
            debug!(session_id = %id, "Duplicate or unknown elimination ignored");
            return;
        }

        info!(session_id = %id, survival_time, "Player eliminated");
        self.broadcast(ServerMsg::PlayerEliminated { id, survival_time });
        self.check_round_over();
    }

    /// Drop the session and announce its departure
    pub fn disconnect(&self, id: PlayerId) -> bool {
        let removed = self.registry.remove_with(&id, |_| {
            self.outbound.remove(&id);
            self.broadcast(ServerMsg::PlayerLeft { id });
        });
        if removed.is_none() {
            self.outbound.remove(&id);
            return false;
        }

        info!(session_id = %id, players = self.registry.len(), "Session left");
        self.check_round_over();
        true
    }

    fn check_round_over(&self) {
        if self.registry.len() < 2 {
            // nobody to announce a winner to; a lone session starts its next round clean
            self.registry.clear_eliminations();
            return;
        }
        let survivors = self.registry.survivors();
        if survivors.len() > 1 {
            return;
        }

        let winner = survivors.first().copied();
        info!(winner = ?winner, "Round over");
        self.broadcast(ServerMsg::GameOver { winner });
        self.registry.clear_eliminations();
    }

    pub fn send_to(&self, id: PlayerId, msg: ServerMsg) {
        if let Some(tx) = self.outbound.get(&id) {
            deliver(tx.value(), msg);
        }
    }

    pub fn broadcast(&self, msg: ServerMsg) {
        for entry in self.outbound.iter() {
            deliver(entry.value(), msg.clone());
        }
    }

    pub fn broadcast_except(&self, sender: PlayerId, msg: ServerMsg) {
        for entry in self.outbound.iter().filter(|e| *e.key() != sender) {
            deliver(entry.value(), msg.clone());
        }
    }
}

/// Queue without waiting. A full queue drops the message rather than stall the relay.
fn deliver(tx: &mpsc::Sender<ServerMsg>, msg: ServerMsg) {
    match tx.try_send(msg) {
        Ok(()) => {}
        Err(TrySendError::Full(msg)) => {
            warn!(?msg, "Session outbound queue full, dropping message");
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Session outbound queue closed");
        }
    }
}

fn clamp_to_arena(position: Position) -> Position {
    let limit = vehicle_limit();
    Position {
        x: clamp_finite(position.x, limit),
        z: clamp_finite(position.z, limit),
    }
}

fn clamp_finite(value: f32, limit: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-limit, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(relay: &SessionRelay) -> (PlayerId, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(64);
        match relay.connect(tx) {
            Admission::Admitted(id) => (id, rx),
            Admission::Rejected => panic!("unexpected rejection"),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn new_session_gets_welcome_and_snapshot_others_get_join() {
        let relay = SessionRelay::new(10);
        let (first, mut first_rx) = session(&relay);
        drain(&mut first_rx);

        let (second, mut second_rx) = session(&relay);
        let msgs = drain(&mut second_rx);
        assert!(matches!(msgs[0], ServerMsg::Welcome { id, .. } if id == second));
        match &msgs[1] {
            ServerMsg::CurrentPlayers { players } => {
                assert_eq!(players.len(), 2);
                assert!(players.contains_key(&first));
            }
            other => panic!("expected current_players, got {other:?}"),
        }

        assert_eq!(
            drain(&mut first_rx),
            vec![ServerMsg::PlayerJoined {
                id: second,
                position: Position::default(),
                rotation: Rotation::default(),
            }]
        );
    }

    #[test]
    fn eleventh_connection_is_rejected() {
        let relay = SessionRelay::new(10);
        let _sessions: Vec<_> = (0..10).map(|_| session(&relay)).collect();

        let (tx, mut rx) = mpsc::channel(4);
        assert_eq!(relay.connect(tx), Admission::Rejected);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMsg::ServerFull { .. }]
        ));
        assert_eq!(relay.player_count(), 10);
    }

    #[test]
    fn move_goes_to_everyone_but_sender() {
        let relay = SessionRelay::new(10);
        let (a, mut a_rx) = session(&relay);
        let (_b, mut b_rx) = session(&relay);
        let (_c, mut c_rx) = session(&relay);
        drain(&mut a_rx);
        drain(&mut b_rx);
        drain(&mut c_rx);

        let position = Position { x: 5.0, z: -3.0 };
        relay.handle(
            a,
            ClientMsg::Move {
                position,
                rotation: Rotation { y: 1.0 },
                color_id: 2,
            },
        );

        assert!(drain(&mut a_rx).is_empty());
        for rx in [&mut b_rx, &mut c_rx] {
            assert_eq!(
                drain(rx),
                vec![ServerMsg::PlayerMoved {
                    id: a,
                    position,
                    rotation: Rotation { y: 1.0 },
                    color_id: 2,
                }]
            );
        }
        assert_eq!(relay.registry().get(&a).unwrap().pose.position, position);
    }

    #[test]
    fn out_of_bounds_move_is_corrected() {
        let relay = SessionRelay::new(10);
        let (a, mut a_rx) = session(&relay);
        drain(&mut a_rx);

        relay.move_player(a, Position { x: 55.0, z: -1.0 }, Rotation::default(), 0);

        let corrected = Position { x: 38.0, z: -1.0 };
        assert_eq!(
            drain(&mut a_rx),
            vec![ServerMsg::InvalidMovement {
                position: corrected
            }]
        );
        assert_eq!(relay.registry().get(&a).unwrap().pose.position, corrected);
    }

    #[test]
    fn disconnect_announces_leave_exactly_once() {
        let relay = SessionRelay::new(10);
        let mut sessions: Vec<_> = (0..4).map(|_| session(&relay)).collect();
        for (_, rx) in sessions.iter_mut() {
            drain(rx);
        }

        let (p3, _p3_rx) = sessions.remove(2);
        assert!(relay.disconnect(p3));
        assert!(!relay.disconnect(p3));
        assert!(!relay.registry().contains(&p3));

        for (_, rx) in sessions.iter_mut() {
            assert_eq!(drain(rx), vec![ServerMsg::PlayerLeft { id: p3 }]);
        }
    }

    #[test]
    fn ping_answers_sender_only() {
        let relay = SessionRelay::new(10);
        let (a, mut a_rx) = session(&relay);
        let (_b, mut b_rx) = session(&relay);
        drain(&mut a_rx);
        drain(&mut b_rx);

        relay.handle(a, ClientMsg::Ping { t: 77 });
        assert_eq!(drain(&mut a_rx), vec![ServerMsg::Pong { t: 77 }]);
        assert!(drain(&mut b_rx).is_empty());
    }

    #[test]
    fn last_survivor_wins() {
        let relay = SessionRelay::new(10);
        let (a, mut a_rx) = session(&relay);
        let (b, mut b_rx) = session(&relay);
        let (c, mut c_rx) = session(&relay);
        for rx in [&mut a_rx, &mut b_rx, &mut c_rx] {
            drain(rx);
        }

        relay.handle(a, ClientMsg::Eliminated { survival_time: 3.0 });
        let notice = ServerMsg::PlayerEliminated {
            id: a,
            survival_time: 3.0,
        };
        for rx in [&mut a_rx, &mut b_rx, &mut c_rx] {
            assert_eq!(drain(rx), vec![notice.clone()]);
        }

        relay.handle(c, ClientMsg::Eliminated { survival_time: 8.0 });
        let over = ServerMsg::GameOver { winner: Some(b) };
        assert_eq!(drain(&mut a_rx).last(), Some(&over));
        assert_eq!(drain(&mut b_rx).last(), Some(&over));
        assert_eq!(drain(&mut c_rx).last(), Some(&over));
        assert_eq!(relay.registry().survivors().len(), 3);
    }

    #[test]
    fn eliminations_count_again_after_game_over() {
        let relay = SessionRelay::new(10);
        let (a, mut a_rx) = session(&relay);
        let (b, mut b_rx) = session(&relay);
        let (c, mut c_rx) = session(&relay);

        relay.eliminate(a, 1.0);
        relay.eliminate(b, 2.0);
        for rx in [&mut a_rx, &mut b_rx, &mut c_rx] {
            assert_eq!(drain(rx).last(), Some(&ServerMsg::GameOver { winner: Some(c) }));
        }

        relay.eliminate(a, 4.0);
        assert_eq!(
            drain(&mut c_rx),
            vec![ServerMsg::PlayerEliminated {
                id: a,
                survival_time: 4.0
            }]
        );
    }

    #[test]
    fn duplicate_elimination_within_a_round_is_ignored() {
        let relay = SessionRelay::new(10);
        let (a, _a_rx) = session(&relay);
        let (_b, _b_rx) = session(&relay);
        let (_c, mut c_rx) = session(&relay);
        drain(&mut c_rx);

        relay.eliminate(a, 1.0);
        relay.eliminate(a, 1.5);
        assert_eq!(drain(&mut c_rx).len(), 1);
    }

    #[test]
    fn lone_session_elimination_does_not_stick() {
        let relay = SessionRelay::new(10);
        let (a, mut a_rx) = session(&relay);
        drain(&mut a_rx);

        relay.eliminate(a, 2.0);
        assert_eq!(relay.registry().survivors(), vec![a]);
        assert!(!drain(&mut a_rx)
            .iter()
            .any(|m| matches!(m, ServerMsg::GameOver { .. })));

        let (_b, mut b_rx) = session(&relay);
        drain(&mut b_rx);
        relay.eliminate(a, 3.0);
        assert_eq!(
            drain(&mut b_rx).first(),
            Some(&ServerMsg::PlayerEliminated {
                id: a,
                survival_time: 3.0
            })
        );
    }

    #[test]
    fn concurrent_joins_and_leaves_leave_no_ghosts() {
        use std::collections::{BTreeSet, HashSet};
        use std::sync::Arc;

        let relay = Arc::new(SessionRelay::new(64));
        let leaving: Vec<_> = (0..16).map(|_| session(&relay)).collect();

        let joiners: Vec<_> = (0..16)
            .map(|_| {
                let relay = Arc::clone(&relay);
                std::thread::spawn(move || {
                    let (tx, rx) = mpsc::channel(256);
                    match relay.connect(tx) {
                        Admission::Admitted(id) => (id, rx),
                        Admission::Rejected => panic!("unexpected rejection"),
                    }
                })
            })
            .collect();
        let leavers: Vec<_> = leaving
            .iter()
            .map(|(id, _)| {
                let relay = Arc::clone(&relay);
                let id = *id;
                std::thread::spawn(move || assert!(relay.disconnect(id)))
            })
            .collect();

        for handle in leavers {
            handle.join().unwrap();
        }
        let mut joined: Vec<_> = joiners.into_iter().map(|h| h.join().unwrap()).collect();

        let present: BTreeSet<_> = relay.registry().snapshot().into_keys().collect();
        assert_eq!(present.len(), 16);

        for (id, rx) in joined.iter_mut() {
            let mut view = HashSet::new();
            for msg in drain(rx) {
                match msg {
                    ServerMsg::CurrentPlayers { players } => view = players.into_keys().collect(),
                    ServerMsg::PlayerJoined { id, .. } => {
                        view.insert(id);
                    }
                    ServerMsg::PlayerLeft { id } => {
                        view.remove(&id);
                    }
                    _ => {}
                }
            }
            let view: BTreeSet<_> = view.into_iter().collect();
            assert_eq!(view, present, "session {id} diverged from the registry");
        }
    }

    #[test]
    fn full_outbound_queue_drops_instead_of_blocking() {
        let relay = SessionRelay::new(10);
        let (tx, mut slow_rx) = mpsc::channel(2);
        assert!(matches!(relay.connect(tx), Admission::Admitted(_)));
        let (fast, _fast_rx) = session(&relay);

        for i in 0..10 {
            relay.move_player(fast, Position { x: i as f32, z: 0.0 }, Rotation::default(), 0);
        }
        // welcome + current_players filled the queue
        assert_eq!(drain(&mut slow_rx).len(), 2);
    }
}
