//! tickbridge - a tick-synchronous bridge between a game and an external agent
//!
//! The game publishes one observation (a reward and an encoded frame) per tick
//! and applies the agent's most recent command before simulating the next one.
//! Traffic runs over two Unix domain sockets, one per direction, served from a
//! background transport thread so the tick loop never blocks on the agent.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickbridge::{Bridge, BridgeConfig, RecordingSink};
//! use tickbridge::ipc::SocketServer;
//!
//! fn run() -> tickbridge::Result<()> {
//!     let config = BridgeConfig::builder()
//!         .observation_socket("/tmp/game_obs.sock")
//!         .command_socket("/tmp/game_cmd.sock")
//!         .build();
//!
//!     let bridge = Arc::new(Bridge::new(RecordingSink::new(), &config));
//!     let mut server = SocketServer::start(&config, Arc::clone(&bridge))?;
//!
//!     for tick in 0..1000 {
//!         bridge.publish_observation(0.0, render_frame(tick));
//!         bridge.tick();
//!     }
//!
//!     server.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Input
//!
//! Commands are applied through an [`InputSink`] implemented by the engine
//! glue. Keys and mouse buttons are edge-detected so the engine sees ordinary
//! press and release events; see [`InputInjector`] for the routing rules.

mod bridge;
mod config;
mod error;
pub mod input;
pub mod ipc;

// Re-export public types
pub use bridge::Bridge;
pub use config::{
    BridgeConfig, BridgeConfigBuilder, DEFAULT_COMMAND_SOCKET, DEFAULT_OBSERVATION_SOCKET,
};
pub use error::{Error, Result};
pub use input::{
    InputEvent, InputInjector, InputSink, KeyAction, KeyCode, Modifiers, MouseButton,
    RecordingSink,
};
pub use ipc::{Command, MouseButtons, Observation, ProtocolLimits, SocketServer};
