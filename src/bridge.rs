//! Shared context between the tick source and the transport
//!
//! One `Bridge` is created per game session and handed by `Arc` to both the
//! [`SocketServer`](crate::ipc::SocketServer) and the engine's tick callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::BridgeConfig;
use crate::input::{InputInjector, InputSink};
use crate::ipc::{Command, Mailbox, Observation, WakeMailbox};

/// Mailboxes, injector and connection state for one game session
pub struct Bridge<S> {
    observations: WakeMailbox<Observation>,
    commands: Mailbox<Command>,
    injector: Mutex<InputInjector<S>>,
    client_connected: AtomicBool,
}

impl<S: InputSink> Bridge<S> {
    pub fn new(sink: S, config: &BridgeConfig) -> Self {
        let injector =
            InputInjector::new(sink).suppress_system_pointer(config.suppress_system_pointer());
        Self {
            observations: WakeMailbox::new(),
            commands: Mailbox::new(),
            injector: Mutex::new(injector),
            client_connected: AtomicBool::new(false),
        }
    }

    /// Hand this tick's observation to the transport
    ///
    /// Never blocks. An observation not yet sent is replaced.
    pub fn publish_observation(&self, reward: f64, frame: Vec<u8>) {
        self.observations.publish(Observation::new(reward, frame));
    }

    /// Apply the latest command, if any, then keep held buttons down
    ///
    /// Call exactly once per simulation tick. Returns whether a new command
    /// was applied.
    pub fn tick(&self) -> bool {
        let command = self.commands.take_latest();
        let mut injector = self.lock_injector();
        let applied = match command {
            Some(command) => {
                injector.inject(&command);
                true
            }
            None => false,
        };
        injector.maintain_button_state();
        applied
    }

    /// Release all injected input
    pub fn reset_input(&self) {
        self.lock_injector().reset();
    }

    /// Run a closure against the injector, e.g. to query held keys
    pub fn with_injector<R>(&self, f: impl FnOnce(&mut InputInjector<S>) -> R) -> R {
        f(&mut self.lock_injector())
    }

    /// Whether an agent is connected to the command socket
    ///
    /// Engines use this to suppress real keyboard and mouse input while the
    /// agent is in control.
    pub fn is_client_connected(&self) -> bool {
        self.client_connected.load(Ordering::SeqCst)
    }

    pub fn observations(&self) -> &WakeMailbox<Observation> {
        &self.observations
    }

    pub fn commands(&self) -> &Mailbox<Command> {
        &self.commands
    }

    pub(crate) fn set_client_connected(&self, connected: bool) {
        let was_connected = self.client_connected.swap(connected, Ordering::SeqCst);
        if was_connected != connected {
            tracing::info!(connected, "client connection state changed");
        }
    }

    // The injector is never held across I/O, only across sink callbacks.
    fn lock_injector(&self) -> MutexGuard<'_, InputInjector<S>> {
        self.injector.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
