//! # Trajectory follower command line tool
//!
//! Operator tool which stands in for the planner, publishing a trajectory file to the follower, or
//! for the actuators, printing the commands the follower outputs.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use color_eyre::{eyre::{eyre, WrapErr}, Result};
use comms_if::{
    net::{zmq, MonitoredSocket, SocketKind, SocketOptions},
    traj::{Command, ScriptedTrajectory},
};
use structopt::StructOpt;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "traj_cli", about = "Send trajectories to, and listen to, the trajectory follower")]
enum Opt {
    /// Publish a trajectory file to the follower.
    ///
    /// The file holds a JSON object with `sample_interval_s`, `samples` and an optional
    /// `start_delay_s`. The trajectory's start time is set when it is sent.
    #[structopt(name = "send")]
    Send {
        /// Path to the trajectory file.
        #[structopt(parse(from_os_str))]
        file: PathBuf,

        /// Endpoint to publish the trajectory on.
        #[structopt(long, default_value = "tcp://*:5020")]
        endpoint: String,

        /// Delay between sending the trajectory and its start, overriding the file's value.
        ///
        /// Units: seconds
        #[structopt(long)]
        start_delay_s: Option<f64>,

        /// Time allowed for the follower to subscribe before publishing.
        ///
        /// Units: milliseconds
        #[structopt(long, default_value = "500")]
        settle_ms: u64,
    },

    /// Print the commands output by the follower.
    #[structopt(name = "listen")]
    Listen {
        /// Endpoint the follower publishes its commands on.
        #[structopt(long, default_value = "tcp://localhost:5021")]
        endpoint: String,

        /// Stop after this many commands, by default listen forever.
        #[structopt(long)]
        count: Option<usize>,
    },
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let ctx = zmq::Context::new();

    match Opt::from_args() {
        Opt::Send { file, endpoint, start_delay_s, settle_ms } => send(
            &ctx, &file, &endpoint, start_delay_s, Duration::from_millis(settle_ms)
        ),
        Opt::Listen { endpoint, count } => listen(&ctx, &endpoint, count),
    }
}

/// Load a trajectory file, stamp it, and publish it.
fn send(
    ctx: &zmq::Context,
    file: &Path,
    endpoint: &str,
    start_delay_s: Option<f64>,
    settle: Duration
) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("Could not read {:?}", file))?;

    let mut scripted = ScriptedTrajectory::from_json(&json)
        .wrap_err_with(|| format!("{:?} is not a valid trajectory", file))?;

    if let Some(d) = start_delay_s {
        scripted.start_delay_s = d;
    }

    let socket = MonitoredSocket::new(
        ctx,
        SocketKind::Publisher,
        SocketOptions {
            bind: true,
            linger: 1000,
            ..Default::default()
        },
        endpoint
    ).wrap_err("Could not open the trajectory socket")?;

    // PUB sockets drop messages sent before a subscriber has connected
    thread::sleep(settle);

    if !socket.connected() {
        eprintln!("Warning: no follower appears to be connected to {}", endpoint);
    }

    let traj = scripted.issue(Utc::now())
        .wrap_err("Could not set the trajectory's start time")?;

    let msg = serde_json::to_string(&traj)
        .wrap_err("Could not serialize the trajectory")?;

    socket.send(msg.as_str(), 0)
        .wrap_err("Could not send the trajectory")?;

    println!(
        "Sent trajectory of {} samples every {} s, starting at {}",
        traj.samples.len(),
        traj.sample_interval_s,
        traj.start_time
    );

    Ok(())
}

/// Print commands from the follower as they arrive.
fn listen(ctx: &zmq::Context, endpoint: &str, count: Option<usize>) -> Result<()> {
    let socket = MonitoredSocket::new(
        ctx,
        SocketKind::Subscriber,
        SocketOptions::default(),
        endpoint
    ).wrap_err("Could not open the command socket")?;

    let mut num_received = 0usize;

    while count.map_or(true, |c| num_received < c) {
        let msg = socket.recv_string(0)
            .wrap_err("Could not recieve a command")?
            .map_err(|_| eyre!("Recieved a command which was not valid UTF-8"))?;

        match Command::from_json(&msg) {
            Ok(cmd) => println!(
                "{} speed: {:+.3}, steering angle: {:+.3}",
                Utc::now().format("%H:%M:%S%.3f"),
                cmd.speed,
                cmd.steering_angle
            ),
            Err(e) => eprintln!("Could not parse command {:?}: {}", msg, e),
        }

        num_received += 1;
    }

    Ok(())
}
