//! `wayfind-memory` – The Route Memory.
//!
//! Holds the reference corpus of the currently open route and decides, frame
//! by frame, which recorded waypoint the vehicle occupies and which image it
//! should head for next.
//!
//! # Modules
//!
//! - [`route_memory`] – [`RouteMemory`][route_memory::RouteMemory]: the
//!   per-route corpus plus the decaying per-waypoint evidence that commits to
//!   a waypoint match only once it is confident enough.
//! - [`stats`] – [`OutlierStats`][stats::OutlierStats] and the vector helpers
//!   (`dot`, `softmax`, `argmin`, `argmax`) the matcher is built from.
//! - [`config`] – [`MemoryConfig`][config::MemoryConfig]: every tunable of the
//!   evidence model with its default.

pub mod config;
pub mod route_memory;
pub mod stats;

pub use config::MemoryConfig;
pub use route_memory::{MatchOutcome, RouteMemory};
