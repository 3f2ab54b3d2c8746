//! Fixed-rate client tick loop.
//!
//! Each tick drains whatever the transport delivered, asks the
//! [`IntentSource`] for input, advances the [`SimulationContext`] and queues
//! outbound messages. The loop never awaits the network: the transport task
//! lives on the other side of unbounded channels.

use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::game::round::RankEntry;
use crate::game::{HumanIntent, RoundPhase, SimEvent, SimulationContext, VehicleRef};
use crate::util::time::{tick_duration, unix_millis, SIMULATION_TPS};
use crate::ws::protocol::{ClientMsg, PlayerPose, Position, Rotation, ServerMsg};

use super::connection::{self, ClientError, ConnectionEvent, ConnectionHandle, ReconnectPolicy};
use super::reconcile::{ReconcileEffect, Reconciler};

/// Ticks between latency probes
pub const PING_INTERVAL_TICKS: u64 = 2 * SIMULATION_TPS as u64;
/// Ticks spent on the results screen before the next round
pub const RESTART_DELAY_TICKS: u64 = 5 * SIMULATION_TPS as u64;

/// Source of per-tick input for the local vehicle (keyboard, joystick, bot)
pub trait IntentSource {
    fn next_intent(&mut self, sim: &SimulationContext) -> HumanIntent;
}

/// Everything one client owns: its simulation, its view of the others, its input
pub struct GameClient<I: IntentSource> {
    sim: SimulationContext,
    reconciler: Reconciler,
    intents: I,
    last_sent: Option<PlayerPose>,
    finished_at: Option<u64>,
    /// Relay declared the current round over
    round_over: bool,
    /// Welcomed by the relay and not disconnected since
    connected: bool,
    rejected: Option<String>,
}

impl<I: IntentSource> GameClient<I> {
    pub fn new(sim: SimulationContext, intents: I) -> Self {
        Self {
            sim,
            reconciler: Reconciler::new(),
            intents,
            last_sent: None,
            finished_at: None,
            round_over: false,
            connected: false,
            rejected: None,
        }
    }

    pub fn sim(&self) -> &SimulationContext {
        &self.sim
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn rejection(&self) -> Option<&str> {
        self.rejected.as_deref()
    }

    /// Apply one relay message
    pub fn handle_message(&mut self, msg: ServerMsg, now: u64) {
        for effect in self.reconciler.apply(msg, now) {
            match effect {
                ReconcileEffect::Welcomed(id) => {
                    self.sim.set_local_id(id);
                    self.connected = true;
                    self.last_sent = None;
                }
                ReconcileEffect::Correction(position) => {
                    self.sim.apply_correction(position);
                    self.last_sent = None;
                }
                ReconcileEffect::RemoteEliminated { id, .. } => {
                    self.sim.round_mut().eliminate(id);
                }
                ReconcileEffect::RoundOver { winner } => {
                    self.round_over = true;
                    if self.sim.finish_round() || self.sim.round().phase() == RoundPhase::Finished {
                        info!(winner = ?winner, "Round finished by relay");
                        self.on_finished();
                    }
                }
                ReconcileEffect::SpectateChanged(target) => {
                    info!(target = ?target, "Spectate target changed");
                }
                ReconcileEffect::Rejected(message) => {
                    self.rejected = Some(message);
                }
            }
        }
    }

    /// Apply one transport event
    pub fn handle_event(&mut self, event: ConnectionEvent, now: u64) {
        match event {
            ConnectionEvent::Message(msg) => self.handle_message(msg, now),
            ConnectionEvent::Connected => debug!("Transport connected"),
            ConnectionEvent::Disconnected => {
                warn!("Transport disconnected, simulating offline");
                self.connected = false;
            }
        }
    }

    /// Run one simulation tick and return the messages to send
    pub fn tick(&mut self, now: u64) -> Vec<ClientMsg> {
        let mut outbound = Vec::new();

        if self.sim.round().phase() == RoundPhase::Waiting && self.reconciler.local_id().is_some() {
            self.sim.start_round();
        }

        let intent = self.intents.next_intent(&self.sim);
        for event in self.sim.step(&intent) {
            match event {
                SimEvent::Eliminated {
                    vehicle: VehicleRef::Local,
                    survival_time,
                    ..
                } => {
                    outbound.push(ClientMsg::Eliminated { survival_time });
                    if let Some(target) = self.reconciler.begin_spectating() {
                        info!(target = %target, "Spectating");
                    }
                }
                SimEvent::PhaseChanged(RoundPhase::Finished) => self.on_finished(),
                SimEvent::PhaseChanged(phase) => debug!(?phase, "Round phase changed"),
                SimEvent::Eliminated { .. } | SimEvent::Fired { .. } => {}
            }
        }

        if !self.sim.local().eliminated {
            let pose = self.local_pose();
            if self.last_sent != Some(pose) {
                outbound.push(ClientMsg::Move {
                    position: pose.position,
                    rotation: pose.rotation,
                    color_id: pose.color_id,
                });
                self.last_sent = Some(pose);
            }
        }

        let tick = self.sim.tick_count();
        if tick % PING_INTERVAL_TICKS == 0 {
            outbound.push(ClientMsg::Ping { t: now });
        }

        if let Some(finished) = self.finished_at {
            if tick.saturating_sub(finished) >= RESTART_DELAY_TICKS
                && self.may_restart()
                && self.sim.reset_round()
            {
                self.reconciler.reset_round();
                self.finished_at = None;
                self.round_over = false;
                self.last_sent = None;
            }
        }

        outbound
    }

    /// Ranking for the end-of-round display
    pub fn ranking(&self) -> Vec<RankEntry> {
        self.reconciler.ranking(
            self.sim.local().survival_time,
            self.sim.round().elapsed_secs(),
        )
    }

    /// An eliminated client keeps spectating until the relay ends the round,
    /// unless there is nobody left to watch or no relay to wait for.
    fn may_restart(&self) -> bool {
        self.round_over || !self.connected || !self.reconciler.has_live_remotes()
    }

    fn local_pose(&self) -> PlayerPose {
        let local = self.sim.local();
        PlayerPose {
            position: Position {
                x: local.position.x,
                z: local.position.z,
            },
            rotation: Rotation { y: local.heading },
            color_id: local.color_id,
        }
    }

    fn on_finished(&mut self) {
        self.finished_at = Some(self.sim.tick_count());
        for (place, entry) in self.ranking().iter().enumerate() {
            info!(
                place = place + 1,
                player_id = %entry.id,
                survival_time = entry.survival_time,
                local = entry.is_local,
                "Round ranking"
            );
        }
    }

    /// Drive the client until the transport fails for good
    pub async fn run(mut self, mut conn: ConnectionHandle) -> Result<(), ClientError> {
        let mut ticker = interval(tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = unix_millis();
                    loop {
                        match conn.inbound.try_recv() {
                            Ok(event) => self.handle_event(event, now),
                            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                        }
                    }

                    if let Some(message) = self.rejected.take() {
                        return Err(ClientError::ServerFull(message));
                    }

                    for msg in self.tick(now) {
                        // a closed channel means the task ended; the select arm below reports why
                        let _ = conn.outbound.send(msg);
                    }
                }
                result = &mut conn.task => {
                    return match result {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(error = %e, "Connection task failed");
                            Err(ClientError::TaskStopped)
                        }
                    };
                }
            }
        }
    }
}

/// Connect to the relay from `config` and play with `intents` until a terminal failure
pub async fn run_client<I: IntentSource>(config: ClientConfig, intents: I) -> Result<(), ClientError> {
    let sim = SimulationContext::from_seed(config.seed, config.autonomous_count);
    let policy = ReconnectPolicy {
        max_attempts: config.reconnect_attempts,
        base_delay: config.reconnect_delay,
    };
    let conn = connection::spawn(config.server_url.clone(), policy);
    GameClient::new(sim, intents).run(conn).await
}
