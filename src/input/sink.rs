//! Engine-facing side of input injection

use std::fmt;

use crate::input::keys::{KeyCode, Modifiers};
use crate::ipc::MouseButtons;

/// Press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Press,
    Release,
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAction::Press => f.write_str("press"),
            KeyAction::Release => f.write_str("release"),
        }
    }
}

/// A physical mouse button, numbered as the engine numbers them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MouseButton {
    Left = 0,
    Right = 1,
    Middle = 2,
}

impl MouseButton {
    pub const ALL: [MouseButton; 3] = [MouseButton::Left, MouseButton::Right, MouseButton::Middle];

    /// The bit for this button in a wire bitmask
    pub fn flag(self) -> MouseButtons {
        match self {
            MouseButton::Left => MouseButtons::LEFT,
            MouseButton::Right => MouseButtons::RIGHT,
            MouseButton::Middle => MouseButtons::MIDDLE,
        }
    }
}

/// Receiver of synthetic input, implemented by the game engine glue
///
/// Event methods are called from whichever thread drives the injector; the
/// query methods describe the engine state the injector needs to route input.
pub trait InputSink: Send {
    fn key(&mut self, key: KeyCode, action: KeyAction, modifiers: Modifiers);

    fn mouse_button(&mut self, button: MouseButton, action: KeyAction, modifiers: Modifiers);

    /// Rotate the camera directly by yaw/pitch deltas
    fn turn(&mut self, yaw: f64, pitch: f64);

    /// Move the UI pointer to absolute window coordinates
    fn pointer_moved(&mut self, x: f64, y: f64);

    fn scroll(&mut self, delta: f64);

    fn char_typed(&mut self, ch: char);

    /// Enable or disable the real pointer device
    fn set_system_pointer_enabled(&mut self, _enabled: bool) {}

    /// Whether a UI surface (menu, chat, inventory) currently has focus
    fn ui_focused(&self) -> bool;

    /// Window size in pixels
    fn window_size(&self) -> (u32, u32);

    /// User mouse sensitivity in `[0, 1]`
    fn mouse_sensitivity(&self) -> f64 {
        0.5
    }
}

/// An event delivered to an [`InputSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key {
        key: KeyCode,
        action: KeyAction,
        modifiers: Modifiers,
    },
    MouseButton {
        button: MouseButton,
        action: KeyAction,
        modifiers: Modifiers,
    },
    Turn {
        yaw: f64,
        pitch: f64,
    },
    PointerMoved {
        x: f64,
        y: f64,
    },
    Scroll(f64),
    Char(char),
    SystemPointer(bool),
}

/// Sink that records every event in memory
///
/// Useful for headless runs and for asserting on injected input.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    events: Vec<InputEvent>,
    ui_focused: bool,
    window_size: (u32, u32),
    sensitivity: f64,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            ui_focused: false,
            window_size: (320, 240),
            sensitivity: 0.5,
        }
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn set_ui_focused(&mut self, focused: bool) {
        self.ui_focused = focused;
    }

    pub fn events(&self) -> &[InputEvent] {
        &self.events
    }

    /// Drain and return everything recorded so far
    pub fn take_events(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.events)
    }
}

impl InputSink for RecordingSink {
    fn key(&mut self, key: KeyCode, action: KeyAction, modifiers: Modifiers) {
        self.events.push(InputEvent::Key {
            key,
            action,
            modifiers,
        });
    }

    fn mouse_button(&mut self, button: MouseButton, action: KeyAction, modifiers: Modifiers) {
        self.events.push(InputEvent::MouseButton {
            button,
            action,
            modifiers,
        });
    }

    fn turn(&mut self, yaw: f64, pitch: f64) {
        self.events.push(InputEvent::Turn { yaw, pitch });
    }

    fn pointer_moved(&mut self, x: f64, y: f64) {
        self.events.push(InputEvent::PointerMoved { x, y });
    }

    fn scroll(&mut self, delta: f64) {
        self.events.push(InputEvent::Scroll(delta));
    }

    fn char_typed(&mut self, ch: char) {
        self.events.push(InputEvent::Char(ch));
    }

    fn set_system_pointer_enabled(&mut self, enabled: bool) {
        self.events.push(InputEvent::SystemPointer(enabled));
    }

    fn ui_focused(&self) -> bool {
        self.ui_focused
    }

    fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    fn mouse_sensitivity(&self) -> f64 {
        self.sensitivity
    }
}
