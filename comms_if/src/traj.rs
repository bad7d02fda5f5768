//! # Trajectory messages
//!
//! This module provides the messages exchanged between the planner, the trajectory follower, and
//! whatever consumes the follower's output commands.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Largest start delay accepted when issuing a scripted trajectory (one day).
pub const MAX_START_DELAY_S: f64 = 86_400.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One planned instant of motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    /// Commanded linear speed.
    ///
    /// Positive speeds are "forwards", negative speeds are "backwards"
    pub speed: f64,

    /// Commanded steering angle.
    pub steering_angle: f64,
}

/// A complete open-loop plan.
///
/// A trajectory is immutable once received. Sample `i` is nominally active over
/// `[start_time + i * sample_interval_s, start_time + (i + 1) * sample_interval_s)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// The time at which sample 0 becomes active.
    pub start_time: DateTime<Utc>,

    /// Time between consecutive samples.
    ///
    /// Units: seconds
    pub sample_interval_s: f64,

    /// The samples, in execution order.
    pub samples: Vec<TrajectorySample>,
}

/// A trajectory whose start time is not yet known.
///
/// Used by scripts and the command line tool, where the start time is stamped at the moment the
/// trajectory is issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedTrajectory {
    /// Delay between issuing the trajectory and sample 0 becoming active.
    ///
    /// Units: seconds
    #[serde(default)]
    pub start_delay_s: f64,

    /// Time between consecutive samples.
    ///
    /// Units: seconds
    pub sample_interval_s: f64,

    /// The samples, in execution order.
    pub samples: Vec<TrajectorySample>,
}

/// The single output value the follower produces each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Commanded linear speed.
    pub speed: f64,

    /// Commanded steering angle.
    pub steering_angle: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Whether a trajectory can be followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajValidity {
    Valid,

    /// The trajectory has no samples.
    Empty,

    /// The sample interval is not a positive finite number.
    InvalidInterval,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TrajParseError {
    #[error("Trajectory contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Start delay must be finite and no longer than one day, found {0} s")]
    InvalidStartDelay(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Trajectory {
    /// Parse a trajectory from a JSON message.
    ///
    /// Only the structure of the message is checked. Use [`Trajectory::validity`] to find out if
    /// the trajectory can actually be followed.
    pub fn from_json(json_str: &str) -> Result<Self, TrajParseError> {
        serde_json::from_str(json_str).map_err(TrajParseError::InvalidJson)
    }

    /// Check whether this trajectory can be followed.
    ///
    /// Sample intervals must be finite and at least one nanosecond once rounded.
    pub fn validity(&self) -> TrajValidity {
        if interval_to_nanos(self.sample_interval_s).is_none() {
            TrajValidity::InvalidInterval
        } else if self.samples.is_empty() {
            TrajValidity::Empty
        } else {
            TrajValidity::Valid
        }
    }

    /// Nominal length of the trajectory in seconds.
    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 * self.sample_interval_s
    }
}

impl ScriptedTrajectory {
    /// Parse a scripted trajectory from JSON.
    pub fn from_json(json_str: &str) -> Result<Self, TrajParseError> {
        serde_json::from_str(json_str).map_err(TrajParseError::InvalidJson)
    }

    /// Stamp the trajectory so that it starts `start_delay_s` after `now`.
    pub fn issue(self, now: DateTime<Utc>) -> Result<Trajectory, TrajParseError> {
        if !self.start_delay_s.is_finite() || self.start_delay_s.abs() > MAX_START_DELAY_S {
            return Err(TrajParseError::InvalidStartDelay(self.start_delay_s));
        }

        let start_time = now
            .checked_add_signed(Duration::nanoseconds((self.start_delay_s * 1e9) as i64))
            .ok_or(TrajParseError::InvalidStartDelay(self.start_delay_s))?;

        Ok(Trajectory {
            start_time,
            sample_interval_s: self.sample_interval_s,
            samples: self.samples,
        })
    }
}

impl Command {
    /// The command issued when there is nothing valid to follow: zero speed, zero steering.
    pub const fn neutral() -> Self {
        Self {
            speed: 0.0,
            steering_angle: 0.0,
        }
    }

    /// Parse a command from a JSON message.
    pub fn from_json(json_str: &str) -> Result<Self, TrajParseError> {
        serde_json::from_str(json_str).map_err(TrajParseError::InvalidJson)
    }
}

impl Default for Command {
    fn default() -> Self {
        Self::neutral()
    }
}

impl From<TrajectorySample> for Command {
    fn from(sample: TrajectorySample) -> Self {
        Self {
            speed: sample.speed,
            steering_angle: sample.steering_angle,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a sample interval to whole nanoseconds.
///
/// Returns `None` unless the interval is positive, finite and at least one nanosecond once
/// rounded. Intervals too long for `i128` nanoseconds saturate to `i128::MAX`.
pub fn interval_to_nanos(sample_interval_s: f64) -> Option<i128> {
    if !(sample_interval_s.is_finite() && sample_interval_s > 0.0) {
        return None;
    }

    let ns = (sample_interval_s * 1e9).min(i128::MAX as f64).round();

    if ns >= 1.0 {
        Some(ns as i128)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_json() {
        let traj = Trajectory::from_json(
            r#"{
                "start_time": "2021-03-04T12:00:00Z",
                "sample_interval_s": 0.1,
                "samples": [
                    {"speed": 1.0, "steering_angle": 0.0},
                    {"speed": 1.0, "steering_angle": 5.0}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(traj.start_time, Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap());
        assert_eq!(traj.sample_interval_s, 0.1);
        assert_eq!(traj.samples.len(), 2);
        assert_eq!(traj.samples[1].steering_angle, 5.0);
        assert_eq!(traj.validity(), TrajValidity::Valid);

        assert!(matches!(
            Trajectory::from_json(r#"{"sample_interval_s": 0.1, "samples": []}"#),
            Err(TrajParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_validity() {
        let mut traj = Trajectory {
            start_time: Utc::now(),
            sample_interval_s: 0.0,
            samples: vec![],
        };

        assert_eq!(traj.validity(), TrajValidity::InvalidInterval);

        traj.sample_interval_s = f64::NAN;
        assert_eq!(traj.validity(), TrajValidity::InvalidInterval);

        // Shorter than a nanosecond
        traj.sample_interval_s = 1e-12;
        assert_eq!(traj.validity(), TrajValidity::InvalidInterval);

        traj.sample_interval_s = f64::INFINITY;
        assert_eq!(traj.validity(), TrajValidity::InvalidInterval);

        // Long enough to overflow once in nanoseconds, still followable
        traj.sample_interval_s = f64::MAX;
        assert_eq!(traj.validity(), TrajValidity::Empty);

        traj.sample_interval_s = 0.5;
        assert_eq!(traj.validity(), TrajValidity::Empty);

        traj.samples.push(TrajectorySample {
            speed: 0.3,
            steering_angle: -0.1,
        });
        assert_eq!(traj.validity(), TrajValidity::Valid);
        assert_eq!(traj.duration_s(), 0.5);

        traj.sample_interval_s = 1e300;
        assert_eq!(traj.validity(), TrajValidity::Valid);
    }

    #[test]
    fn test_interval_to_nanos() {
        assert_eq!(interval_to_nanos(0.1), Some(100_000_000));
        assert_eq!(interval_to_nanos(1e-9), Some(1));
        assert_eq!(interval_to_nanos(4e-10), None);
        assert_eq!(interval_to_nanos(-0.0), None);
        assert_eq!(interval_to_nanos(f64::NEG_INFINITY), None);

        assert_eq!(interval_to_nanos(1e300), Some(i128::MAX));
        assert_eq!(interval_to_nanos(f64::MAX), Some(i128::MAX));
    }

    #[test]
    fn test_issue_scripted() {
        let scripted =
            ScriptedTrajectory::from_json(r#"{"sample_interval_s": 0.2, "samples": []}"#).unwrap();
        assert_eq!(scripted.start_delay_s, 0.0);

        let scripted = ScriptedTrajectory::from_json(
            r#"{
                "start_delay_s": 1.5,
                "sample_interval_s": 0.2,
                "samples": [{"speed": 0.5, "steering_angle": 0.1}]
            }"#,
        )
        .unwrap();

        let now = Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap();
        let traj = scripted.clone().issue(now).unwrap();

        assert_eq!(traj.start_time, now + Duration::milliseconds(1500));
        assert_eq!(traj.sample_interval_s, 0.2);
        assert_eq!(traj.samples.len(), 1);

        let far = ScriptedTrajectory {
            start_delay_s: 1e12,
            ..scripted
        };
        assert!(matches!(
            far.issue(now),
            Err(TrajParseError::InvalidStartDelay(_))
        ));
    }

    #[test]
    fn test_command_from_sample() {
        let cmd = Command::from(TrajectorySample {
            speed: -0.4,
            steering_angle: 0.25,
        });

        assert_eq!(cmd.speed, -0.4);
        assert_eq!(cmd.steering_angle, 0.25);
        assert_eq!(Command::default(), Command::neutral());

        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(Command::from_json(&json).unwrap(), cmd);
    }
}
