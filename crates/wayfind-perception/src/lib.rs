//! `wayfind-perception` – the seam to the perception/control network.
//!
//! The network itself (image transforms, inference runtime, weights) lives
//! outside this workspace.  This crate defines the contract the navigator
//! drives it through.
//!
//! # Modules
//!
//! - [`network`] – [`PerceptionNetwork`][network::PerceptionNetwork]: turns a
//!   frame into route-corpus features at route-open time and into driving
//!   outputs plus matching embeddings at every control tick.

pub mod network;

pub use network::{ImageFeatures, NetworkOutput, PerceptionNetwork};
