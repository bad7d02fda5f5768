//! # Trajectory Follower Executable Parameters
//!
//! This module provide parameters for the trajectory follower executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest cycle period accepted.
///
/// Units: seconds
pub const MAX_CYCLE_PERIOD_S: f64 = 60.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajExecParams {

    /// Target period of one cycle of the main loop.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// If true every received trajectory is saved into the session directory.
    #[serde(default)]
    pub archive_trajectories: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TrajExecParamsError {
    #[error("The cycle period must be greater than 0 and at most 60 seconds, found {0}")]
    InvalidCyclePeriod(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrajExecParams {
    /// Check that the parameters are usable.
    pub fn validate(&self) -> Result<(), TrajExecParamsError> {
        // Also rejects NaN
        if !(self.cycle_period_s > 0.0 && self.cycle_period_s <= MAX_CYCLE_PERIOD_S) {
            return Err(TrajExecParamsError::InvalidCyclePeriod(self.cycle_period_s))
        }

        Ok(())
    }

    /// Number of cycles per second
    pub fn cycle_frequency_hz(&self) -> f64 {
        1.0 / self.cycle_period_s
    }
}

impl Default for TrajExecParams {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.1,
            archive_trajectories: false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validate() {
        let params: TrajExecParams = util::params::load_str("cycle_period_s = 0.1").unwrap();
        assert!(params.validate().is_ok());
        assert!(!params.archive_trajectories);
        assert!((params.cycle_frequency_hz() - 10.0).abs() < 1e-9);

        let params = TrajExecParams {
            cycle_period_s: MAX_CYCLE_PERIOD_S,
            ..Default::default()
        };
        assert!(params.validate().is_ok());

        // Periods too long to become a cycle duration are refused up front
        for period in &[0.0, -0.1, f64::NAN, f64::INFINITY, 60.5, 1e20, f64::MAX] {
            let params = TrajExecParams {
                cycle_period_s: *period,
                ..Default::default()
            };
            assert!(matches!(
                params.validate(),
                Err(TrajExecParamsError::InvalidCyclePeriod(_))
            ));
        }
    }
}
