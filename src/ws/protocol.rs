//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game::PlayerId;

/// Horizontal position on the arena floor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub z: f32,
}

/// Rotation about the vertical axis
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub y: f32,
}

/// Last reported pose of a connected player
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPose {
    pub position: Position,
    pub rotation: Rotation,
    #[serde(default)]
    pub color_id: u32,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Client-reported pose of its own vehicle
    #[serde(rename_all = "camelCase")]
    Move {
        position: Position,
        rotation: Rotation,
        color_id: u32,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// The sender's vehicle was destroyed
    #[serde(rename_all = "camelCase")]
    Eliminated { survival_time: f32 },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// First message on an admitted connection
    #[serde(rename_all = "camelCase")]
    Welcome { id: PlayerId, server_time: u64 },

    /// Full registry snapshot for a newly admitted session
    CurrentPlayers { players: HashMap<PlayerId, PlayerPose> },

    /// Another player connected
    PlayerJoined {
        id: PlayerId,
        position: Position,
        rotation: Rotation,
    },

    /// Another player reported a new pose
    #[serde(rename_all = "camelCase")]
    PlayerMoved {
        id: PlayerId,
        position: Position,
        rotation: Rotation,
        color_id: u32,
    },

    /// A player disconnected
    PlayerLeft { id: PlayerId },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },

    /// Admission rejected; the server closes the connection after this
    #[serde(alias = "game_full")]
    ServerFull { message: String },

    /// Authoritative override of the receiver's own position
    InvalidMovement { position: Position },

    /// A player's vehicle was destroyed
    #[serde(rename_all = "camelCase")]
    PlayerEliminated { id: PlayerId, survival_time: f32 },

    /// Round over
    GameOver { winner: Option<PlayerId> },
}

/// Wire codec errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ClientMsg {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ServerMsg {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
