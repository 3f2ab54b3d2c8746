//! Client side: remote-state reconciliation, transport and the tick loop

pub mod buffer;
pub mod connection;
pub mod game_loop;
pub mod pilot;
pub mod reconcile;

pub use buffer::{RemoteBuffer, RemoteEntitySnapshot};
pub use connection::{ClientError, ReconnectPolicy};
pub use game_loop::{run_client, GameClient, IntentSource};
pub use pilot::{Autopilot, Idle};
pub use reconcile::{Reconciler, RemoteVehicle};
