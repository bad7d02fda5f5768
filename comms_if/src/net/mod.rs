//! # Network Module
//!
//! Networking abstractions over ZMQ for the follower's two channels.
//!
//! Trajectories travel over a PUB/SUB pair: the planner binds a PUB socket on the trajectory
//! endpoint and the follower connects a SUB socket to it. The follower binds its own PUB socket on
//! the command endpoint. All payloads are JSON strings.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use zmq::{Context, Socket, SocketEvent};
use log::{debug, warn};
use serde::{Serialize, Deserialize};

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

macro_rules! set_sockopts {
    ($socket:expr, $(($opt:ident, $val:expr)),+) => {
        $(
            $socket.$opt($val)
                .map_err(|e| MonitoredSocketError::SocketOptionError(stringify!($opt), e))?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive timeout of the monitor socket, which bounds how long a dropped socket waits for its
/// monitor thread to exit.
///
/// Units: milliseconds
const MONITOR_RECV_TIMEOUT_MS: i32 = 100;

/// Events the monitor listens for.
const MONITORED_EVENTS: i32 = SocketEvent::CONNECTED as i32
    | SocketEvent::ACCEPTED as i32
    | SocketEvent::DISCONNECTED as i32;

// ------------------------------------------------------------------------------------------------
// STATICS
// ------------------------------------------------------------------------------------------------

/// Number of monitors created so far, used to give each monitor a unique endpoint.
static NUM_MONITORS: AtomicUsize = AtomicUsize::new(0);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network endpoints used by the trajectory follower, loaded from `net.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetParams {
    /// Endpoint on which trajectories are published by the planner.
    pub traj_endpoint: String,

    /// Endpoint on which the follower publishes its output commands.
    pub cmd_endpoint: String,
}

/// A publisher or subscriber socket which tracks how many peers it has.
///
/// A background thread reads the socket's monitor events. Dropping the socket stops and joins
/// that thread.
pub struct MonitoredSocket {
    socket: Socket,

    monitor: Option<thread::JoinHandle<()>>,

    shutdown: Arc<AtomicBool>,

    num_peers: Arc<AtomicUsize>,
}

/// Options applied to a monitored socket when it is opened.
///
/// Timeouts and intervals are in milliseconds, with the same meaning as the matching
/// [`zmq_setsockopt`](http://api.zeromq.org/4-2:zmq-setsockopt) options.
#[derive(Debug, Clone, Copy)]
pub struct SocketOptions {
    /// Bind to the endpoint rather than connecting to it. Defaults to `false`.
    pub bind: bool,

    /// `ZMQ_LINGER`
    pub linger: i32,

    /// `ZMQ_CONNECT_TIMEOUT`
    pub connect_timeout: i32,

    /// `ZMQ_RCVTIMEO`, after which a receive returns `EAGAIN`.
    pub recv_timeout: i32,

    /// `ZMQ_SNDTIMEO`, after which a send returns `EAGAIN`.
    pub send_timeout: i32,

    /// `ZMQ_HEARTBEAT_IVL`
    pub heartbeat_ivl: i32,

    /// `ZMQ_HEARTBEAT_TIMEOUT`
    pub heartbeat_timeout: i32,

    /// `ZMQ_HEARTBEAT_TTL`
    pub heartbeat_ttl: i32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The role a monitored socket plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// A PUB socket.
    Publisher,

    /// A SUB socket subscribed to every message.
    Subscriber,
}

#[derive(thiserror::Error, Debug)]
pub enum MonitoredSocketError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Error enabling monitoring for the socket: {0}")]
    MonitoringEnableError(zmq::Error),

    #[error("Could not {0} {1}: {2}")]
    EndpointError(&'static str, String, zmq::Error),

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(&'static str, zmq::Error),

    #[error("Could not start the monitor thread: {0}")]
    MonitorThreadError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MonitoredSocket {
    /// Open a socket of the given kind on `endpoint`.
    ///
    /// Never waits for a peer: publishers drop messages until a subscriber arrives and
    /// subscribers receive nothing until they connect, so [`MonitoredSocket::connected`] should be
    /// checked where that matters.
    pub fn new(
        ctx: &Context,
        kind: SocketKind,
        options: SocketOptions,
        endpoint: &str
    ) -> Result<Self, MonitoredSocketError> {
        let socket = ctx.socket(kind.socket_type())
            .map_err(MonitoredSocketError::CreateSocketError)?;

        let monitor_endpoint = format!(
            "inproc://monitor_{}",
            NUM_MONITORS.fetch_add(1, Ordering::Relaxed)
        );

        // The monitor must be listening before the socket connects, or early events are lost
        socket.monitor(&monitor_endpoint, MONITORED_EVENTS)
            .map_err(MonitoredSocketError::MonitoringEnableError)?;
        let monitor = ctx.socket(zmq::PAIR)
            .map_err(MonitoredSocketError::CreateSocketError)?;
        monitor.set_rcvtimeo(MONITOR_RECV_TIMEOUT_MS)
            .map_err(|e| MonitoredSocketError::SocketOptionError("set_rcvtimeo", e))?;
        monitor.connect(&monitor_endpoint)
            .map_err(|e| MonitoredSocketError::EndpointError(
                "connect to", monitor_endpoint.clone(), e
            ))?;

        options.set(&socket)?;

        if kind == SocketKind::Subscriber {
            socket.set_subscribe(b"")
                .map_err(|e| MonitoredSocketError::SocketOptionError("set_subscribe", e))?;
        }

        let (action, result) = match options.bind {
            true => ("bind to", socket.bind(endpoint)),
            false => ("connect to", socket.connect(endpoint))
        };
        result.map_err(|e| MonitoredSocketError::EndpointError(action, endpoint.into(), e))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let num_peers = Arc::new(AtomicUsize::new(0));

        let monitor = {
            let shutdown = shutdown.clone();
            let num_peers = num_peers.clone();

            thread::Builder::new()
                .name(format!("monitor_{}", endpoint))
                .spawn(move || monitor_socket(monitor, monitor_endpoint, shutdown, num_peers))
                .map_err(MonitoredSocketError::MonitorThreadError)?
        };

        Ok(Self {
            socket,
            monitor: Some(monitor),
            shutdown,
            num_peers,
        })
    }

    /// True while at least one peer is connected.
    pub fn connected(&self) -> bool {
        self.num_peers() > 0
    }

    /// Number of peers currently connected.
    pub fn num_peers(&self) -> usize {
        self.num_peers.load(Ordering::Relaxed)
    }
}

impl Drop for MonitoredSocket {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(jh) = self.monitor.take() {
            if jh.join().is_err() {
                warn!("Socket monitor thread panicked");
            }
        }
    }
}

impl std::ops::Deref for MonitoredSocket {
    type Target = Socket;

    fn deref(&self) -> &Self::Target {
        &self.socket
    }
}

impl SocketKind {
    fn socket_type(self) -> zmq::SocketType {
        match self {
            SocketKind::Publisher => zmq::PUB,
            SocketKind::Subscriber => zmq::SUB,
        }
    }
}

impl SocketOptions {
    /// Set these options on the given socket.
    fn set(&self, socket: &Socket) -> Result<(), MonitoredSocketError> {
        set_sockopts!(
            socket,
            (set_linger, self.linger),
            (set_connect_timeout, self.connect_timeout),
            (set_rcvtimeo, self.recv_timeout),
            (set_sndtimeo, self.send_timeout),
            (set_heartbeat_ivl, self.heartbeat_ivl),
            (set_heartbeat_timeout, self.heartbeat_timeout),
            (set_heartbeat_ttl, self.heartbeat_ttl)
        );

        Ok(())
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        // zmq's own defaults
        Self {
            bind: false,
            linger: 30_000,
            connect_timeout: 0,
            recv_timeout: -1,
            send_timeout: -1,
            heartbeat_ivl: 0,
            heartbeat_timeout: 0,
            heartbeat_ttl: 0,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Decode the event id from the first frame of a monitor message.
fn parse_event_frame(frame: &[u8]) -> Result<SocketEvent, zmq::Error> {
    match frame {
        [lo, hi, ..] => Ok(SocketEvent::from_raw(u16::from_ne_bytes([*lo, *hi]))),
        _ => Err(zmq::Error::EINVAL)
    }
}

/// Peer count after `event`.
fn peers_after(num_peers: usize, event: SocketEvent) -> usize {
    match event {
        SocketEvent::CONNECTED | SocketEvent::ACCEPTED => num_peers.saturating_add(1),
        SocketEvent::DISCONNECTED => num_peers.saturating_sub(1),
        _ => num_peers
    }
}

/// Read the next event from a monitor socket.
fn read_event(monitor: &Socket) -> Result<SocketEvent, zmq::Error> {
    let msg = monitor.recv_msg(0)?;
    let event = parse_event_frame(&msg)?;

    // The second frame is the peer address
    if monitor.get_rcvmore()? {
        monitor.recv_msg(0)?;
    }

    Ok(event)
}

fn monitor_socket(
    monitor: Socket,
    monitor_endpoint: String,
    shutdown: Arc<AtomicBool>,
    num_peers: Arc<AtomicUsize>
) {
    while !shutdown.load(Ordering::Relaxed) {
        let event = match read_event(&monitor) {
            Ok(e) => e,
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                warn!("Error reading event from monitor {}: {}", monitor_endpoint, e);
                num_peers.store(0, Ordering::Relaxed);
                break
            }
        };

        // Only this thread writes the count
        let n = peers_after(num_peers.load(Ordering::Relaxed), event);
        num_peers.store(n, Ordering::Relaxed);
    }

    debug!("Monitor {} stopped", monitor_endpoint);
}

#[cfg(test)]
mod test {
    use super::*;

    fn frame(event: SocketEvent) -> Vec<u8> {
        let mut f = (event as u16).to_ne_bytes().to_vec();
        f.extend_from_slice(&[0, 0, 0, 0]);
        f
    }

    #[test]
    fn test_parse_event_frame() {
        assert!(matches!(
            parse_event_frame(&frame(SocketEvent::ACCEPTED)),
            Ok(SocketEvent::ACCEPTED)
        ));
        assert!(matches!(
            parse_event_frame(&frame(SocketEvent::DISCONNECTED)),
            Ok(SocketEvent::DISCONNECTED)
        ));
        assert!(matches!(parse_event_frame(&[0x01]), Err(zmq::Error::EINVAL)));
        assert!(matches!(parse_event_frame(&[]), Err(zmq::Error::EINVAL)));
    }

    #[test]
    fn test_peer_count() {
        // A bound publisher accepting two subscribers, one of which leaves
        let mut n = 0;
        for event in &[
            SocketEvent::ACCEPTED,
            SocketEvent::ACCEPTED,
            SocketEvent::DISCONNECTED,
        ] {
            n = peers_after(n, *event);
        }
        assert_eq!(n, 1);

        // A connecting subscriber losing and regaining its publisher
        let mut n = peers_after(0, SocketEvent::CONNECTED);
        n = peers_after(n, SocketEvent::DISCONNECTED);
        assert_eq!(n, 0);
        n = peers_after(n, SocketEvent::DISCONNECTED);
        assert_eq!(n, 0);
        n = peers_after(n, SocketEvent::CONNECTED);
        assert_eq!(n, 1);
    }
}
