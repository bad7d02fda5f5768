//! # Trajectory Client
//!
//! Subscribes to the planner's trajectories and delivers each one to the follower as soon as it
//! arrives. Reception happens on a background thread so that trajectories are taken in
//! independently of the main loop's cycle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketKind, SocketOptions},
    traj::{TrajParseError, TrajValidity, Trajectory},
};
use log::{debug, info, warn};

use crate::follower::Follower;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive timeout, which bounds how long dropping the client waits for the receive thread.
///
/// Units: milliseconds
const RECV_TIMEOUT_MS: i32 = 50;

/// Pause after an unexpected receive error before trying again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Session-relative directory in which received trajectories are archived.
const ARCHIVE_DIR: &str = "trajectories";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Trajectory client
pub struct TrajClient {
    shutdown: Arc<AtomicBool>,

    connected: Arc<AtomicBool>,

    num_received: Arc<AtomicUsize>,

    join_handle: Option<JoinHandle<()>>,
}

/// State owned by the receive thread.
struct Receiver {
    socket: MonitoredSocket,
    follower: Arc<Follower>,
    archive: bool,
    shutdown: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    num_received: Arc<AtomicUsize>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TrajClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not start the receive thread: {0}")]
    ThreadError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrajClient {

    /// Create a new instance of the trajectory client.
    ///
    /// Every trajectory received is passed to `follower`. If `archive` is set each trajectory is
    /// also saved into the session directory.
    ///
    /// This function will not block until the planner connects.
    pub fn new(
        ctx: &zmq::Context,
        params: &NetParams,
        follower: Arc<Follower>,
        archive: bool
    ) -> Result<Self, TrajClientError> {
        let socket_options = SocketOptions {
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            recv_timeout: RECV_TIMEOUT_MS,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            SocketKind::Subscriber,
            socket_options,
            &params.traj_endpoint
        ).map_err(TrajClientError::SocketError)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));
        let num_received = Arc::new(AtomicUsize::new(0));

        let receiver = Receiver {
            socket,
            follower,
            archive,
            shutdown: shutdown.clone(),
            connected: connected.clone(),
            num_received: num_received.clone(),
        };

        let join_handle = thread::Builder::new()
            .name("traj_client".into())
            .spawn(move || receiver.run())
            .map_err(TrajClientError::ThreadError)?;

        Ok(Self {
            shutdown,
            connected,
            num_received,
            join_handle: Some(join_handle),
        })
    }

    /// Check if the client is connected to the planner
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Number of trajectories delivered to the follower so far.
    pub fn num_received(&self) -> usize {
        self.num_received.load(Ordering::Relaxed)
    }
}

impl Drop for TrajClient {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(jh) = self.join_handle.take() {
            if jh.join().is_err() {
                warn!("TrajClient receive thread panicked");
            }
        }
    }
}

impl Receiver {
    fn run(self) {
        debug!("TrajClient receive thread started");

        while !self.shutdown.load(Ordering::Relaxed) {
            self.connected.store(self.socket.connected(), Ordering::Relaxed);

            let msg = match self.socket.recv_string(0) {
                Ok(Ok(s)) => s,
                Ok(Err(_)) => {
                    warn!("Recieved a trajectory message which was not valid UTF-8");
                    continue
                },
                // No message in timeout
                Err(zmq::Error::EAGAIN) => continue,
                Err(e) => {
                    warn!("Could not recieve a trajectory: {}", e);
                    thread::sleep(RECV_ERROR_BACKOFF);
                    continue
                }
            };

            match deliver(&msg, &self.follower) {
                Ok(traj) => {
                    let n = self.num_received.fetch_add(1, Ordering::Relaxed) + 1;

                    if self.archive {
                        util::session::save_with_timestamp(archive_path(n), traj);
                    }
                },
                Err(e) => warn!("Could not parse recieved trajectory: {}", e)
            }
        }

        debug!("TrajClient receive thread stopped");
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse a trajectory message and hand it to the follower.
///
/// Messages which don't parse leave the follower's trajectory untouched. Trajectories which parse
/// but can't be followed are still delivered, replacing the previous one, since they are the
/// planner's latest intent. On success the delivered trajectory is returned.
pub fn deliver(msg: &str, follower: &Follower) -> Result<Trajectory, TrajParseError> {
    let traj = Trajectory::from_json(msg)?;

    match traj.validity() {
        TrajValidity::Valid => info!(
            "Recieved trajectory of {} samples every {} s ({:.2} s long) starting at {}",
            traj.samples.len(),
            traj.sample_interval_s,
            traj.duration_s(),
            traj.start_time
        ),
        TrajValidity::Empty => warn!(
            "Recieved an empty trajectory, the neutral command will be output"
        ),
        TrajValidity::InvalidInterval => warn!(
            "Recieved a trajectory with invalid sample interval {}, the neutral command will be \
            output",
            traj.sample_interval_s
        ),
    }

    follower.receive_trajectory(traj.clone());

    Ok(traj)
}

/// Session-relative archive path of the `n`th trajectory received.
///
/// The timestamp added when saving only resolves milliseconds, the index keeps names unique.
pub fn archive_path(n: usize) -> PathBuf {
    PathBuf::from(ARCHIVE_DIR).join(format!("traj_{:06}.json", n))
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use comms_if::traj::Command;

    #[test]
    fn test_deliver() {
        let follower = Follower::default();
        let t0 = Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, 0).unwrap();

        let traj = deliver(
            r#"{
                "start_time": "2021-03-04T12:00:00Z",
                "sample_interval_s": 0.1,
                "samples": [{"speed": 0.8, "steering_angle": -0.3}]
            }"#,
            &follower,
        )
        .unwrap();
        assert_eq!(traj.samples.len(), 1);

        let expected = Command {
            speed: 0.8,
            steering_angle: -0.3,
        };
        assert_eq!(follower.compute_command(t0), expected);

        // Garbage leaves the held trajectory alone
        assert!(deliver("{\"start_time\": 3}", &follower).is_err());
        assert!(deliver("not json at all", &follower).is_err());
        assert_eq!(follower.compute_command(t0), expected);

        // Degenerate trajectories still replace it
        deliver(
            r#"{"start_time": "2021-03-04T12:00:00Z", "sample_interval_s": 0.1, "samples": []}"#,
            &follower,
        )
        .unwrap();
        assert_eq!(
            follower.compute_command(t0 + Duration::milliseconds(50)),
            Command::neutral()
        );
    }

    #[test]
    fn test_archive_path() {
        assert_eq!(archive_path(1), PathBuf::from("trajectories/traj_000001.json"));
        assert_eq!(archive_path(1_234_567), PathBuf::from("trajectories/traj_1234567.json"));

        // Trajectories arriving within the same millisecond still get their own file
        assert_ne!(archive_path(41), archive_path(42));
    }
}
