//! Inter-Process Communication (IPC) between the game and the agent
//!
//! Two Unix domain sockets carry traffic in one direction each: observations
//! (reward + frame) flow to the agent, commands (keys, mouse, text) flow to
//! the game. Each direction is decoupled from the tick rate by a single-slot
//! mailbox, so a slow peer only ever sees the freshest value.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickbridge::{Bridge, BridgeConfig, RecordingSink};
//! use tickbridge::ipc::SocketServer;
//!
//! let config = BridgeConfig::default();
//! let bridge = Arc::new(Bridge::new(RecordingSink::new(), &config));
//! let mut server = SocketServer::start(&config, Arc::clone(&bridge))?;
//!
//! loop {
//!     bridge.publish_observation(reward, frame);
//!     bridge.tick();
//! }
//! ```

pub mod client;
mod mailbox;
mod protocol;
mod server;

pub use mailbox::{Mailbox, WakeMailbox};
pub use protocol::{
    COMMAND_MIN_LEN, Command, MouseButtons, OBSERVATION_HEADER_LEN, Observation, ProtocolError,
    ProtocolLimits, command_fixed_len, command_text_len, decode_command, decode_observation,
    decode_observation_header, encode_command, encode_observation,
};
pub use server::{ServerState, SocketRole, SocketServer};
