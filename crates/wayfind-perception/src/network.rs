//! Generic `PerceptionNetwork` trait and the data it produces.

use wayfind_types::{Embedding, Frame, NavError};

/// Per-image outputs used to build a route corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFeatures {
    /// Appearance embedding, unit-normalized.
    pub coordinate: Embedding,
    /// Attention key for destination selection.
    pub key: Embedding,
    /// Destination payload handed back to the network once selected.
    pub value: Embedding,
}

/// Outputs of one control-tick forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkOutput {
    /// Steering action.
    pub action: f32,
    /// Corridor critic.
    pub critic: f32,
    /// Corridor surprise.
    pub surprise: f32,
    /// Sampled maneuver command distribution, `[left, ahead, right]`.
    pub gumbel: Embedding,
    /// Obstacle brake signal.
    pub brake: f32,
    /// Critic of the brake signal.
    pub brake_critic: f32,
    /// Appearance embedding of the current frame.
    pub coordinate: Embedding,
    /// Attention query of the current frame.
    pub query: Embedding,
}

/// A perception/control network.
///
/// Implementations are shared between the control thread, which calls
/// [`forward`][PerceptionNetwork::forward] every tick, and background route
/// loaders, which call [`features`][PerceptionNetwork::features] for every
/// stored image; both take `&self`, so implementations synchronize
/// internally.
pub trait PerceptionNetwork: Send + Sync {
    /// Extract the corpus entry for one stored route image.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::Perception`] if inference fails.
    fn features(&self, image: &Frame) -> Result<ImageFeatures, NavError>;

    /// Run the driving head on a live frame.
    ///
    /// `command` is the maneuver command distribution to condition on and
    /// `destination` the payload selected by the route memory on the previous
    /// tick, if any.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::Perception`] if inference fails.
    fn forward(
        &self,
        image: &Frame,
        command: &[f32],
        destination: Option<&[f32]>,
    ) -> Result<NetworkOutput, NavError>;
}
