//! Server-side session bookkeeping and relay

pub mod registry;
pub mod relay;

pub use registry::{PlayerEntry, Registry};
pub use relay::{Admission, SessionRelay};

/// Default maximum concurrent sessions
pub const MAX_PLAYERS: usize = 10;
