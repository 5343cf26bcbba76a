//! `wayfind-types` – shared vocabulary of the Wayfind localization stack.
//!
//! Holds the frame, intention and error types that every other crate in the
//! workspace speaks, so the route memory, the route sources and the navigator
//! never depend on each other just to exchange data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of a discrete place along a recorded route.
///
/// Ids are dense: a route with `n` waypoints uses `0..n`.
pub type WaypointId = usize;

/// A dense float vector produced by the perception network (feature,
/// attention key/query, or destination payload).
pub type Embedding = Vec<f32>;

/// A raw camera frame handed to the perception network.
///
/// The core never looks inside `data`; decoding and pre-processing belong to
/// the network implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data (e.g. RGB24 or BGR24).
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }
}

/// Discrete driving intention supplied by the pilot each tick.
///
/// Serialized with the pilot's dotted tokens, e.g. `"intersection.left"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Intention {
    #[serde(rename = "intersection.left")]
    Left,
    #[default]
    #[serde(rename = "intersection.ahead")]
    Ahead,
    #[serde(rename = "intersection.right")]
    Right,
}

impl Intention {
    /// Number of entries in a maneuver command distribution.
    pub const COMMAND_WIDTH: usize = 3;

    /// Position of this intention in the `[left, ahead, right]` command layout.
    pub fn index(self) -> usize {
        match self {
            Intention::Left => 0,
            Intention::Ahead => 1,
            Intention::Right => 2,
        }
    }

    /// One-hot maneuver command fed to the network when no command is carried.
    pub fn command(self) -> Embedding {
        let mut command = vec![0.0; Self::COMMAND_WIDTH];
        command[self.index()] = 1.0;
        command
    }

    pub fn token(self) -> &'static str {
        match self {
            Intention::Left => "intersection.left",
            Intention::Ahead => "intersection.ahead",
            Intention::Right => "intersection.right",
        }
    }
}

impl fmt::Display for Intention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Intention {
    type Err = NavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "intersection.left" => Ok(Intention::Left),
            "intersection.ahead" => Ok(Intention::Ahead),
            "intersection.right" => Ok(Intention::Right),
            other => Err(NavError::UnknownIntention(other.to_string())),
        }
    }
}

/// Error type shared by the route memory, the navigator and their
/// collaborators.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NavError {
    /// A vector handed to the route memory does not match the dimension the
    /// open corpus was built with.
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Route memory is closed")]
    MemoryClosed,

    #[error("Route data source error: {0}")]
    Store(String),

    #[error("Perception network error: {0}")]
    Perception(String),

    #[error("Unknown driving intention: {0}")]
    UnknownIntention(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
