//! Route Memory – topological self-localization against a recorded route.
//!
//! A route is recorded as an ordered corpus of images, each tagged with the
//! waypoint it was taken at.  At route-open time every image is pushed
//! through the perception network once, yielding a feature vector, an
//! attention key and a destination payload per image.  Afterwards every
//! control tick calls [`RouteMemory::match_frame`] with the live frame's
//! feature and attention query.
//!
//! ## Evidence model
//!
//! Each waypoint owns one evidence scalar.  Per tick:
//!
//! 1. Images whose distance `1 − ⟨corpus[i], feature⟩` is an outlier under
//!    the [`OutlierStats`] tests credit their waypoint `criterion_weight`
//!    once per passed test.
//! 2. All evidence decays by `momentum` and is clipped to
//!    `[evidence_floor, evidence_ceiling]`.
//! 3. The waypoint of the nearest image receives an **unclipped** bonus
//!    `d_prob · s_prob · bonus_weight`, where `d_prob` is the nearest image's
//!    similarity and `s_prob` the peak of the attention distribution.
//! 4. If the strongest evidence exceeds `match_threshold` that waypoint is
//!    declared matched and its evidence is reset to the floor, so it has to
//!    re-accumulate before it can fire again.
//!
//! Because the clip happens before the bonus, the ceiling bounds what slow
//! accumulation alone can achieve; a match always needs a strong bonus on
//! top of a saturated waypoint.
//!
//! # Example
//!
//! ```rust
//! use wayfind_memory::{MemoryConfig, RouteMemory};
//!
//! let mut memory = RouteMemory::new(MemoryConfig::default());
//! assert!(!memory.is_open());
//!
//! memory.reset(
//!     2,
//!     vec![0, 1],
//!     vec![vec![1.0, 0.0], vec![0.0, 1.0]],
//!     vec![vec![1.0, 0.0], vec![0.0, 1.0]],
//!     vec![vec![0.5], vec![1.5]],
//! );
//! assert!(memory.is_open());
//!
//! let outcome = memory.match_frame(&[1.0, 0.0], &[0.0, 0.0]).unwrap();
//! assert!(outcome.confidence >= 0.0);
//! ```

use tracing::{debug, info};
use wayfind_types::{Embedding, NavError, WaypointId};

use crate::config::MemoryConfig;
use crate::stats::{OutlierStats, argmax, argmin, dot, softmax};

// ─────────────────────────────────────────────────────────────────────────────
// MatchOutcome
// ─────────────────────────────────────────────────────────────────────────────

/// Result of one [`RouteMemory::match_frame`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Waypoint declared matched on this tick, if any.
    pub waypoint: Option<WaypointId>,
    /// Corpus image to display: the nearest image on a fresh match, otherwise
    /// the selected destination image.
    pub image: usize,
    /// Non-negative evidence of the displayed image's waypoint.
    pub confidence: f32,
    /// Payload of the selected destination image.
    pub destination: Option<Embedding>,
}

// ─────────────────────────────────────────────────────────────────────────────
// RouteMemory
// ─────────────────────────────────────────────────────────────────────────────

/// Reference corpus of one route plus the per-waypoint evidence state.
///
/// The memory is *closed* until [`reset`][RouteMemory::reset] installs a
/// non-empty corpus.  It is never mutated incrementally: a route switch
/// replaces every field at once.
#[derive(Debug, Clone)]
pub struct RouteMemory {
    config: MemoryConfig,
    num_waypoints: usize,
    /// Image index → waypoint id.
    waypoint_ids: Vec<WaypointId>,
    /// Image index → feature vector.
    corpus: Vec<Embedding>,
    keys: Vec<Embedding>,
    values: Vec<Embedding>,
    evidence: Vec<f32>,
    /// Most recently confirmed waypoint.
    current: Option<WaypointId>,
}

impl RouteMemory {
    /// Create a closed memory.
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            num_waypoints: 0,
            waypoint_ids: Vec::new(),
            corpus: Vec::new(),
            keys: Vec::new(),
            values: Vec::new(),
            evidence: Vec::new(),
            current: None,
        }
    }

    /// Replace the whole memory with a freshly built route corpus.
    ///
    /// `num_waypoints` is the number of distinct waypoints on the route;
    /// `waypoint_ids`, `corpus`, `keys` and `values` hold one entry per image.
    /// Evidence starts at zero and no waypoint is confirmed.  With
    /// `num_waypoints == 0` or an empty corpus the memory stays closed.
    ///
    /// # Panics
    ///
    /// Panics when the per-image arrays differ in length, when a waypoint id
    /// is not below `num_waypoints`, or when feature or key vectors differ in
    /// dimension.  These are caller bugs; installing such a corpus would
    /// silently corrupt the evidence later.
    pub fn reset(
        &mut self,
        num_waypoints: usize,
        waypoint_ids: Vec<WaypointId>,
        corpus: Vec<Embedding>,
        keys: Vec<Embedding>,
        values: Vec<Embedding>,
    ) {
        let n = corpus.len();
        assert!(
            waypoint_ids.len() == n && keys.len() == n && values.len() == n,
            "route corpus arrays differ in length: ids={}, corpus={}, keys={}, values={}",
            waypoint_ids.len(),
            n,
            keys.len(),
            values.len()
        );

        self.clear();
        if num_waypoints == 0 || n == 0 {
            return;
        }

        if let Some(&bad) = waypoint_ids.iter().find(|&&id| id >= num_waypoints) {
            panic!("waypoint id {bad} out of range for {num_waypoints} waypoints");
        }
        assert!(
            corpus.iter().all(|c| c.len() == corpus[0].len()),
            "corpus feature vectors differ in dimension"
        );
        assert!(
            keys.iter().all(|k| k.len() == keys[0].len()),
            "attention keys differ in dimension"
        );

        self.num_waypoints = num_waypoints;
        self.waypoint_ids = waypoint_ids;
        self.corpus = corpus;
        self.keys = keys;
        self.values = values;
        self.evidence = vec![0.0; num_waypoints];
    }

    /// Drop the corpus and all evidence, leaving the memory closed.
    pub fn clear(&mut self) {
        self.num_waypoints = 0;
        self.waypoint_ids.clear();
        self.corpus.clear();
        self.keys.clear();
        self.values.clear();
        self.evidence.clear();
        self.current = None;
    }

    /// `true` iff a non-empty corpus is installed.
    pub fn is_open(&self) -> bool {
        !self.corpus.is_empty()
    }

    /// Number of corpus images.
    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    /// `true` when no corpus images are installed.
    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// Number of waypoints on the open route; `0` when closed.
    pub fn num_waypoints(&self) -> usize {
        self.num_waypoints
    }

    /// The most recently confirmed waypoint, if any.
    pub fn current_waypoint(&self) -> Option<WaypointId> {
        self.current
    }

    /// Current evidence, one entry per waypoint.
    pub fn evidence(&self) -> &[f32] {
        &self.evidence
    }

    /// Evidence tunables this memory was built with.
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Localize one frame against the open corpus.
    ///
    /// `feature` must have the corpus dimension and `query` the key
    /// dimension.
    ///
    /// # Errors
    ///
    /// - [`NavError::MemoryClosed`] if no corpus is installed.
    /// - [`NavError::DimensionMismatch`] if either vector has the wrong
    ///   length.  Evidence is left untouched in both cases.
    pub fn match_frame(&mut self, feature: &[f32], query: &[f32]) -> Result<MatchOutcome, NavError> {
        self.check_dimensions(feature, query)?;

        let distances: Vec<f32> = self.corpus.iter().map(|c| 1.0 - dot(c, feature)).collect();
        let logits: Vec<f32> = self.keys.iter().map(|k| dot(k, query)).collect();
        let selections = softmax(&logits);

        // Outlier evidence, then momentum and clip.
        self.accumulate_outliers(&distances);
        self.decay();

        // Unclipped bonus for the nearest image.  The corpus is non-empty, so
        // both argmin and argmax exist.
        let d_idx = argmin(&distances).unwrap_or(0);
        let d_prob = 1.0 - distances[d_idx];
        let s_prob = argmax(&selections).map_or(0.0, |i| selections[i]);
        self.add_bonus(self.waypoint_ids[d_idx], d_prob * s_prob * self.config.bonus_weight);

        let s_idx = self.select_destination(&selections);
        let destination = Some(self.values[s_idx].clone());

        let matched = self.declare_match();
        let mut image = s_idx;
        if let Some(p) = matched
            && self.current != Some(p)
        {
            self.current = Some(p);
            image = d_idx;
            info!(
                waypoint = p,
                distance = d_prob,
                soft = s_prob,
                "route memory matched waypoint"
            );
        }

        let confidence = self.evidence[self.waypoint_ids[image]].max(0.0);
        debug!(
            nearest = d_idx,
            destination = s_idx,
            confidence,
            "route memory tick"
        );

        Ok(MatchOutcome {
            waypoint: matched,
            image,
            confidence,
            destination,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Evidence steps
    // ─────────────────────────────────────────────────────────────────────────

    fn check_dimensions(&self, feature: &[f32], query: &[f32]) -> Result<(), NavError> {
        let (Some(first_feature), Some(first_key)) = (self.corpus.first(), self.keys.first()) else {
            return Err(NavError::MemoryClosed);
        };
        if feature.len() != first_feature.len() {
            return Err(NavError::DimensionMismatch {
                what: "feature".to_string(),
                expected: first_feature.len(),
                actual: feature.len(),
            });
        }
        if query.len() != first_key.len() {
            return Err(NavError::DimensionMismatch {
                what: "query".to_string(),
                expected: first_key.len(),
                actual: query.len(),
            });
        }
        Ok(())
    }

    fn accumulate_outliers(&mut self, distances: &[f32]) {
        let stats = OutlierStats::compute(distances, self.config.epsilon, self.config.mad_scale);
        for (i, &d) in distances.iter().enumerate() {
            self.credit(self.waypoint_ids[i], stats.hits(d));
        }
    }

    /// Add `criterion_weight` once per passed outlier test.
    fn credit(&mut self, waypoint: WaypointId, hits: usize) {
        self.evidence[waypoint] += hits as f32 * self.config.criterion_weight;
    }

    fn decay(&mut self) {
        let MemoryConfig {
            momentum,
            evidence_floor,
            evidence_ceiling,
            ..
        } = self.config;
        for e in &mut self.evidence {
            *e = (*e * momentum).clamp(evidence_floor, evidence_ceiling);
        }
    }

    fn add_bonus(&mut self, waypoint: WaypointId, amount: f32) {
        self.evidence[waypoint] += amount;
    }

    /// Pick the destination image.  With a confirmed waypoint only images of
    /// its successor are eligible; if the route has no such image every image
    /// is.
    fn select_destination(&self, selections: &[f32]) -> usize {
        let successor = self.current.map(|c| (c + 1) % self.num_waypoints);
        let restricted = successor.and_then(|next| {
            self.waypoint_ids
                .iter()
                .enumerate()
                .filter(|&(_, &id)| id == next)
                .map(|(i, _)| i)
                .reduce(|best, i| if selections[i] > selections[best] { i } else { best })
        });
        restricted
            .or_else(|| argmax(selections))
            .unwrap_or(0)
    }

    fn declare_match(&mut self) -> Option<WaypointId> {
        let p = argmax(&self.evidence)?;
        if self.evidence[p] > self.config.match_threshold {
            self.evidence[p] = self.config.evidence_floor;
            Some(p)
        } else {
            None
        }
    }
}

impl Default for RouteMemory {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
