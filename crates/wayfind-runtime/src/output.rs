//! Per-tick navigator output and the flattened record published downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wayfind_memory::stats::argmax;
use wayfind_types::{Embedding, WaypointId};

/// Everything one [`Navigator::forward`][crate::Navigator::forward] call
/// produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigatorOutput {
    pub action: f32,
    pub critic: f32,
    pub surprise: f32,
    pub brake: f32,
    pub brake_critic: f32,
    /// Waypoint declared on this tick, if any.
    pub waypoint: Option<WaypointId>,
    /// Corpus index to display.  `None` when no route is open.
    pub image: Option<usize>,
    /// Evidence of the displayed image's waypoint, floored at zero.
    pub confidence: Option<f32>,
    /// Destination payload fed back to the network on the next tick.
    pub destination: Option<Embedding>,
    /// Command distribution the network was conditioned on.
    pub command: Embedding,
}

/// Flat driving record with sentinel values in place of absent fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivingState {
    pub time: DateTime<Utc>,
    pub action: f32,
    pub critic: f32,
    pub surprise: f32,
    pub brake: f32,
    pub brake_critic: f32,
    /// Declared waypoint or `-1`.
    pub navigation_point: i64,
    /// Display image index or `-1`.
    pub navigation_image: i64,
    /// Confidence or `1.0`.
    pub navigation_distance: f32,
    /// Winning command index shifted to `[-1, 1]` plus its probability.
    pub navigation_command: f32,
}

impl DrivingState {
    pub fn from_output(output: &NavigatorOutput) -> Self {
        Self::at(Utc::now(), output)
    }

    /// Build the record with an explicit timestamp.
    pub fn at(time: DateTime<Utc>, output: &NavigatorOutput) -> Self {
        Self {
            time,
            action: output.action,
            critic: output.critic,
            surprise: output.surprise,
            brake: output.brake,
            brake_critic: output.brake_critic,
            navigation_point: output.waypoint.map_or(-1, |w| w as i64),
            navigation_image: output.image.map_or(-1, |i| i as i64),
            navigation_distance: output.confidence.unwrap_or(1.0),
            navigation_command: navigation_command(&output.command),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// `(argmax(command) - 1) + command[argmax]`; `0.0` for an empty command.
pub fn navigation_command(command: &[f32]) -> f32 {
    argmax(command).map_or(0.0, |i| (i as f32 - 1.0) + command[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> NavigatorOutput {
        NavigatorOutput {
            action: 0.25,
            critic: 0.5,
            surprise: 0.1,
            brake: 0.0,
            brake_critic: 0.2,
            waypoint: None,
            image: None,
            confidence: None,
            destination: None,
            command: vec![0.0, 1.0, 0.0],
        }
    }

    #[test]
    fn absent_navigation_fields_use_sentinels() {
        let state = DrivingState::from_output(&output());
        assert_eq!(state.navigation_point, -1);
        assert_eq!(state.navigation_image, -1);
        assert_eq!(state.navigation_distance, 1.0);
        assert_eq!(state.navigation_command, 1.0);
    }

    #[test]
    fn present_navigation_fields_pass_through() {
        let mut out = output();
        out.waypoint = Some(3);
        out.image = Some(7);
        out.confidence = Some(0.25);
        let state = DrivingState::from_output(&out);
        assert_eq!(state.navigation_point, 3);
        assert_eq!(state.navigation_image, 7);
        assert_eq!(state.navigation_distance, 0.25);
    }

    #[test]
    fn navigation_command_encodes_direction_and_weight() {
        assert!((navigation_command(&[1.0, 0.0, 0.0]) - 0.0).abs() < 1e-6);
        assert!((navigation_command(&[0.0, 0.0, 1.0]) - 2.0).abs() < 1e-6);
        assert!((navigation_command(&[0.7, 0.2, 0.1]) - -0.3).abs() < 1e-6);
        assert_eq!(navigation_command(&[]), 0.0);
    }

    #[test]
    fn driving_state_serializes_to_json() {
        let time = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = DrivingState::at(time, &output()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["navigation_point"], -1);
        assert_eq!(value["navigation_distance"], 1.0);
        assert_eq!(value["time"], "2024-05-01T12:00:00Z");
    }
}
