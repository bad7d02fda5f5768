//! # Command Server
//!
//! Publishes the command computed on each cycle to whatever drives the actuators.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketKind, SocketOptions},
    traj::Command,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Command server
pub struct CmdServer {
    socket: MonitoredSocket
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CmdServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send the command: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the command: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdServer {
    /// Create a new instance of the command server.
    ///
    /// This function will not block until a client connects.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, CmdServerError> {
        let socket_options = SocketOptions {
            bind: true,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            SocketKind::Publisher,
            socket_options,
            &params.cmd_endpoint
        ).map_err(CmdServerError::SocketError)?;

        Ok(Self {
            socket
        })
    }

    /// Publish a command.
    ///
    /// Sending succeeds even if no client is listening, in which case the command is dropped.
    pub fn send(&mut self, cmd: &Command) -> Result<(), CmdServerError> {
        let cmd_string = serde_json::to_string(cmd)
            .map_err(CmdServerError::SerializationError)?;

        self.socket.send(cmd_string.as_str(), 0)
            .map_err(CmdServerError::SendError)
    }
}
