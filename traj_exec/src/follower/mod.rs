//! Trajectory follower module
//!
//! Holds the most recently received trajectory and, given the current time, selects the sample of
//! that trajectory which should be executed now. The follower is open-loop: nothing about the
//! rover's actual state is used.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod select;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use select::*;
pub use state::*;
