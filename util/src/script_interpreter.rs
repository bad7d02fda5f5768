//! # Trajectory script interpreter module
//!
//! This module provides an interpreter for trajectory scripts, allowing trajectories to be issued
//! to the follower at fixed times without a planner on the network.
//!
//! A script is a sequence of entries of the form `<exec_time_s>: <json>;`, where the JSON is a
//! [`ScriptedTrajectory`]. Whitespace and newlines between entries are ignored, as is any line
//! that doesn't match this form (which allows for comments).
//!
//! ```text
//! 0.0: {"sample_interval_s": 0.1, "samples": [{"speed": 1.0, "steering_angle": 0.0}]};
//! 5.0: {"start_delay_s": 0.5, "sample_interval_s": 0.1, "samples": []};
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use log::warn;
use regex::RegexBuilder;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal
use crate::session::get_elapsed_seconds;
use comms_if::traj::{ScriptedTrajectory, TrajParseError, Trajectory};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A trajectory which is scripted to be issued at a specific time.
struct ScriptEntry {
    /// The session time at which the trajectory is issued
    exec_time_s: f64,

    traj: ScriptedTrajectory,
}

/// A script interpreter.
///
/// After initialising with the path to the script to run use `.get_pending()`
/// to acquire the trajectories that need issuing.
pub struct ScriptInterpreter {
    script_path: PathBuf,
    entries: VecDeque<ScriptEntry>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0:?}")]
    ScriptNotFound(PathBuf),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Could not build the script regex: {0}")]
    RegexError(regex::Error),

    #[error("Script timestamps must be in order, but {1} s comes after {0} s")]
    OutOfOrder(f64, f64),

    #[error("Script contains an invalid trajectory at {0} s: {1}")]
    InvalidTraj(f64, TrajParseError),
}

/// Result of polling the interpreter for trajectories to issue.
#[derive(Debug)]
pub enum PendingTrajs {
    None,
    Some(Vec<Trajectory>),
    EndOfScript,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {

        let path = script_path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path));
        }

        let script = fs::read_to_string(&path)
            .map_err(ScriptError::ScriptLoadError)?;

        Self::from_script(path, &script)
    }

    /// Create a new interpreter from the contents of a script.
    ///
    /// `script_path` is only used for reporting.
    pub fn from_script(script_path: PathBuf, script: &str) -> Result<Self, ScriptError> {

        let mut entries: VecDeque<ScriptEntry> = VecDeque::new();

        // Capture groups: 1 = exec time, 3 = JSON payload up to the terminating `;`
        let re = RegexBuilder::new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .map_err(ScriptError::RegexError)?;

        for cap in re.captures_iter(script) {
            let time_str = cap.get(1).map_or("", |m| m.as_str());
            let json_str = cap.get(3).map_or("", |m| m.as_str());

            let exec_time_s: f64 = time_str
                .parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            let traj = ScriptedTrajectory::from_json(json_str)
                .map_err(|e| ScriptError::InvalidTraj(exec_time_s, e))?;

            if let Some(last) = entries.back() {
                if exec_time_s < last.exec_time_s {
                    return Err(ScriptError::OutOfOrder(last.exec_time_s, exec_time_s));
                }
            }

            entries.push_back(ScriptEntry { exec_time_s, traj });
        }

        if entries.is_empty() {
            return Err(ScriptError::ScriptEmpty)
        }

        Ok(ScriptInterpreter {
            script_path,
            entries,
        })
    }

    /// Return the trajectories which are due now, stamped with the current time.
    ///
    /// Uses the session clock, so a session must have been started.
    pub fn get_pending(&mut self) -> PendingTrajs {
        self.get_pending_at(get_elapsed_seconds(), Utc::now())
    }

    /// Return the trajectories due at session time `elapsed_s`, stamping their start time
    /// relative to `now`.
    pub fn get_pending_at(&mut self, elapsed_s: f64, now: DateTime<Utc>) -> PendingTrajs {

        // If the queue is empty the script is over
        if self.entries.is_empty() {
            return PendingTrajs::EndOfScript
        }

        let mut trajs = vec![];

        while let Some(entry) = self.entries.front() {
            if entry.exec_time_s > elapsed_s {
                break;
            }

            let entry = match self.entries.pop_front() {
                Some(e) => e,
                None => break,
            };

            match entry.traj.issue(now) {
                Ok(t) => trajs.push(t),
                Err(e) => warn!(
                    "Skipping trajectory scheduled at {} s in {:?}: {}",
                    entry.exec_time_s, self.script_path, e
                ),
            }
        }

        if trajs.is_empty() {
            PendingTrajs::None
        }
        else {
            PendingTrajs::Some(trajs)
        }
    }

    /// Get the number of trajectories remaining in the script
    pub fn get_num_trajs(&self) -> usize {
        self.entries.len()
    }

    /// Get the length of the script in seconds, i.e. the time at which the last remaining
    /// trajectory is nominally finished.
    pub fn get_duration(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.exec_time_s
                + e.traj.start_delay_s.max(0.0)
                + e.traj.samples.len() as f64 * e.traj.sample_interval_s.max(0.0))
            .fold(0f64, f64::max)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, TimeZone};

    const SCRIPT: &str = r#"
        # Drive forwards then turn
        0.0: {"sample_interval_s": 0.1, "samples": [
            {"speed": 1.0, "steering_angle": 0.0},
            {"speed": 1.0, "steering_angle": 0.0}
        ]};
        1.5: {"start_delay_s": 0.5, "sample_interval_s": 0.5, "samples": [
            {"speed": 0.5, "steering_angle": 0.2}
        ]};
        1.5: {"sample_interval_s": 0.25, "samples": []};
    "#;

    fn interpreter() -> ScriptInterpreter {
        ScriptInterpreter::from_script(PathBuf::from("test.traj"), SCRIPT).unwrap()
    }

    #[test]
    fn test_parse() {
        let si = interpreter();

        assert_eq!(si.get_num_trajs(), 3);
        assert_eq!(si.get_duration(), 2.5);
    }

    #[test]
    fn test_get_pending() {
        let mut si = interpreter();
        let now = Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap();

        match si.get_pending_at(0.0, now) {
            PendingTrajs::Some(t) => {
                assert_eq!(t.len(), 1);
                assert_eq!(t[0].start_time, now);
                assert_eq!(t[0].samples.len(), 2);
            }
            p => panic!("Expected one trajectory, got {:?}", p),
        }

        assert!(matches!(si.get_pending_at(1.0, now), PendingTrajs::None));

        match si.get_pending_at(1.6, now) {
            PendingTrajs::Some(t) => {
                assert_eq!(t.len(), 2);
                assert_eq!(t[0].start_time, now + Duration::milliseconds(500));
                assert_eq!(t[1].sample_interval_s, 0.25);
            }
            p => panic!("Expected two trajectories, got {:?}", p),
        }

        assert!(matches!(si.get_pending_at(2.0, now), PendingTrajs::EndOfScript));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            ScriptInterpreter::from_script(PathBuf::new(), "nothing to see here"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::from_script(PathBuf::new(), "1.0: {\"samples\": []};"),
            Err(ScriptError::InvalidTraj(_, _))
        ));
        assert!(matches!(
            ScriptInterpreter::from_script(
                PathBuf::new(),
                "2.0: {\"sample_interval_s\": 0.1, \"samples\": []};\n\
                 1.0: {\"sample_interval_s\": 0.1, \"samples\": []};"
            ),
            Err(ScriptError::OutOfOrder(_, _))
        ));
        assert!(matches!(
            ScriptInterpreter::new("/definitely/not/a/script.traj"),
            Err(ScriptError::ScriptNotFound(_))
        ));
    }
}
