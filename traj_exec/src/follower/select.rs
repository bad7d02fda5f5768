//! Sample selection
//!
//! Maps the time elapsed since a trajectory's start onto an index into its samples. Every input
//! maps to a defined [`Selection`], so callers never index out of range.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Duration;

// Internal
use super::ExhaustionPolicy;
use comms_if::traj::interval_to_nanos;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The result of selecting a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Output the neutral command.
    Neutral(NeutralCause),

    /// Output the sample at `index`.
    Sample {
        index: usize,
        phase: Phase
    },
}

/// Why the neutral command was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeutralCause {
    /// No trajectory has been received yet.
    NoTrajectory,

    /// The held trajectory has no samples.
    EmptyTrajectory,

    /// The held trajectory's sample interval is not a positive finite number.
    InvalidInterval,

    /// The held trajectory has finished and the policy is to stop.
    Exhausted,
}

/// Where the current time lies relative to the held trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// There is nothing to follow.
    Idle,

    /// The trajectory has not started yet, the first sample is output.
    BeforeStart,

    /// The current time lies within the trajectory.
    Active,

    /// The trajectory has finished.
    Exhausted,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Selection {
    /// Get the phase this selection corresponds to.
    pub fn phase(&self) -> Phase {
        match self {
            Selection::Neutral(NeutralCause::Exhausted) => Phase::Exhausted,
            Selection::Neutral(_) => Phase::Idle,
            Selection::Sample { phase, .. } => *phase,
        }
    }

    /// Get the selected sample index, if there is one.
    pub fn index(&self) -> Option<usize> {
        match self {
            Selection::Sample { index, .. } => Some(*index),
            Selection::Neutral(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Select the sample to execute `elapsed` after the trajectory's start time.
///
/// The index is `elapsed / sample_interval_s` truncated towards zero, computed in integer
/// nanoseconds so that times falling exactly on a sample boundary select the sample starting
/// there. Out of range indices are clamped:
///
/// - Before the start (negative `elapsed`) the first sample is selected.
/// - Past the end the last sample is selected under [`ExhaustionPolicy::Hold`], or the neutral
///   command under [`ExhaustionPolicy::Stop`].
///
/// Empty trajectories and invalid sample intervals always select the neutral command.
pub fn select_sample(
    elapsed: Duration,
    sample_interval_s: f64,
    num_samples: usize,
    policy: ExhaustionPolicy
) -> Selection {
    let interval_ns = match interval_to_nanos(sample_interval_s) {
        Some(i) => i,
        None => return Selection::Neutral(NeutralCause::InvalidInterval)
    };

    if num_samples == 0 {
        return Selection::Neutral(NeutralCause::EmptyTrajectory)
    }

    // Durations too long for i64 nanoseconds are still exact in milliseconds
    let elapsed_ns = match elapsed.num_nanoseconds() {
        Some(ns) => i128::from(ns),
        None => i128::from(elapsed.num_milliseconds()) * 1_000_000
    };

    if elapsed_ns < 0 {
        return Selection::Sample {
            index: 0,
            phase: Phase::BeforeStart
        }
    }

    // Integer division truncates towards zero
    let index = elapsed_ns / interval_ns;

    if index >= num_samples as i128 {
        match policy {
            ExhaustionPolicy::Hold => Selection::Sample {
                index: num_samples - 1,
                phase: Phase::Exhausted
            },
            ExhaustionPolicy::Stop => Selection::Neutral(NeutralCause::Exhausted)
        }
    }
    else {
        Selection::Sample {
            index: index as usize,
            phase: Phase::Active
        }
    }
}
