//! Turns per-tick commands into press/release/move/type events
//!
//! The agent sends the complete input state for each tick. The injector keeps
//! the previous tick's state and emits only the transitions, except for mouse
//! buttons which are re-pressed every tick while held: the engine's press
//! handler auto-releases a button that is not re-asserted each tick, and
//! actions like mining rely on the button staying down.

use std::collections::BTreeSet;

use crate::input::keys::{self, KeyCode, Modifiers};
use crate::input::sink::{InputSink, KeyAction, MouseButton};
use crate::ipc::{Command, MouseButtons};

/// Input injection state machine, one per connection lifetime
pub struct InputInjector<S> {
    sink: S,
    pressed_keys: BTreeSet<KeyCode>,
    modifiers: Modifiers,
    mouse_buttons: MouseButtons,
    virtual_pointer: Option<(f64, f64)>,
    suppress_system_pointer: bool,
    system_pointer_suppressed: bool,
}

impl<S: InputSink> InputInjector<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            pressed_keys: BTreeSet::new(),
            modifiers: Modifiers::empty(),
            mouse_buttons: MouseButtons::empty(),
            virtual_pointer: None,
            suppress_system_pointer: true,
            system_pointer_suppressed: false,
        }
    }

    /// Whether the real pointer is disabled while the virtual pointer drives the UI
    pub fn suppress_system_pointer(mut self, enabled: bool) -> Self {
        self.suppress_system_pointer = enabled;
        self
    }

    /// Apply one tick's command
    pub fn inject(&mut self, command: &Command) {
        self.handle_keys(&command.keys);
        self.handle_mouse_buttons(command.mouse_buttons);
        self.handle_mouse_motion(command.mouse_dx, command.mouse_dy);
        self.handle_scroll(command.scroll_delta);
        self.handle_text(&command.text);
    }

    /// Re-press every held mouse button
    ///
    /// Must run once per tick, whether or not a new command arrived.
    pub fn maintain_button_state(&mut self) {
        for button in MouseButton::ALL {
            if self.mouse_buttons.contains(button.flag()) {
                self.sink
                    .mouse_button(button, KeyAction::Press, self.modifiers);
            }
        }
    }

    /// Release everything and forget all state
    ///
    /// Called whenever the agent connection goes away so that no movement or
    /// attack input is left stuck on.
    pub fn reset(&mut self) {
        let pressed = std::mem::take(&mut self.pressed_keys);
        for key in pressed {
            self.sink.key(key, KeyAction::Release, self.modifiers);
        }

        for button in MouseButton::ALL {
            if self.mouse_buttons.contains(button.flag()) {
                self.sink
                    .mouse_button(button, KeyAction::Release, self.modifiers);
            }
        }

        if self.system_pointer_suppressed {
            self.sink.set_system_pointer_enabled(true);
            self.system_pointer_suppressed = false;
        }

        self.modifiers = Modifiers::empty();
        self.mouse_buttons = MouseButtons::empty();
        self.virtual_pointer = None;

        tracing::info!("input injector reset");
    }

    /// Non-modifier keys currently held
    pub fn pressed_keys(&self) -> &BTreeSet<KeyCode> {
        &self.pressed_keys
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn mouse_buttons(&self) -> MouseButtons {
        self.mouse_buttons
    }

    /// Virtual pointer position, once a UI surface has received pointer motion
    pub fn virtual_pointer(&self) -> Option<(f64, f64)> {
        self.virtual_pointer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn handle_keys(&mut self, keys: &[KeyCode]) {
        let (held, modifiers) = keys::partition(keys);

        // Releases carry the modifiers that were active when the key went down.
        for &key in self.pressed_keys.difference(&held) {
            tracing::trace!(key, modifiers = ?self.modifiers, "key release");
            self.sink.key(key, KeyAction::Release, self.modifiers);
        }

        for &key in held.difference(&self.pressed_keys) {
            tracing::trace!(key, ?modifiers, "key press");
            self.sink.key(key, KeyAction::Press, modifiers);
        }

        self.pressed_keys = held;
        self.modifiers = modifiers;
    }

    fn handle_mouse_buttons(&mut self, buttons: MouseButtons) {
        let current = buttons & MouseButtons::all();

        for button in MouseButton::ALL {
            let flag = button.flag();
            if current.contains(flag) {
                self.sink
                    .mouse_button(button, KeyAction::Press, self.modifiers);
            } else if self.mouse_buttons.contains(flag) {
                tracing::trace!(?button, "mouse button release");
                self.sink
                    .mouse_button(button, KeyAction::Release, self.modifiers);
            }
        }

        self.mouse_buttons = current;
    }

    fn handle_mouse_motion(&mut self, dx: f32, dy: f32) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        if !(dx.is_finite() && dy.is_finite()) {
            tracing::debug!(dx, dy, "ignoring non-finite mouse motion");
            return;
        }

        if self.sink.ui_focused() {
            self.move_virtual_pointer(f64::from(dx), f64::from(dy));
            return;
        }

        let factor = turn_factor(self.sink.mouse_sensitivity());
        let yaw = f64::from(dx) * factor;
        let pitch = f64::from(dy) * factor;
        tracing::trace!(dx, dy, yaw, pitch, "camera turn");
        self.sink.turn(yaw, pitch);
    }

    fn move_virtual_pointer(&mut self, dx: f64, dy: f64) {
        let (width, height) = self.sink.window_size();
        let max_x = f64::from(width.max(1) - 1);
        let max_y = f64::from(height.max(1) - 1);

        let (x, y) = match self.virtual_pointer {
            Some(position) => position,
            None => {
                if self.suppress_system_pointer && !self.system_pointer_suppressed {
                    self.sink.set_system_pointer_enabled(false);
                    self.system_pointer_suppressed = true;
                }
                (f64::from(width) / 2.0, f64::from(height) / 2.0)
            }
        };

        let x = (x + dx).clamp(0.0, max_x);
        let y = (y + dy).clamp(0.0, max_y);
        self.virtual_pointer = Some((x, y));

        tracing::trace!(x, y, "virtual pointer move");
        self.sink.pointer_moved(x, y);
    }

    fn handle_scroll(&mut self, delta: f32) {
        if delta != 0.0 && delta.is_finite() {
            self.sink.scroll(f64::from(delta));
        }
    }

    fn handle_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        if !self.sink.ui_focused() {
            tracing::debug!(len = text.len(), "ignoring text input without a focused UI");
            return;
        }

        for ch in text.chars() {
            self.sink.char_typed(ch);
        }
    }
}

/// Pixel-to-degrees factor for a sensitivity setting in `[0, 1]`
pub fn turn_factor(sensitivity: f64) -> f64 {
    let s = sensitivity * 0.6 + 0.2;
    s * s * s * 8.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::keys::{A, LEFT_SHIFT, W};
    use crate::input::sink::{InputEvent, RecordingSink};

    fn injector() -> InputInjector<RecordingSink> {
        InputInjector::new(RecordingSink::new())
    }

    fn keys(keys: &[KeyCode]) -> Command {
        Command {
            keys: keys.to_vec(),
            ..Default::default()
        }
    }

    fn key_event(key: KeyCode, action: KeyAction, modifiers: Modifiers) -> InputEvent {
        InputEvent::Key {
            key,
            action,
            modifiers,
        }
    }

    #[test]
    fn test_new_key_fires_single_press() {
        let mut injector = injector();
        injector.inject(&keys(&[W]));
        injector.sink_mut().take_events();

        injector.inject(&keys(&[W, A]));

        assert_eq!(
            injector.sink().events(),
            &[key_event(A, KeyAction::Press, Modifiers::empty())]
        );
    }

    #[test]
    fn test_dropped_key_fires_single_release() {
        let mut injector = injector();
        injector.inject(&keys(&[W, A]));
        injector.sink_mut().take_events();

        injector.inject(&keys(&[A]));

        assert_eq!(
            injector.sink().events(),
            &[key_event(W, KeyAction::Release, Modifiers::empty())]
        );
        assert_eq!(injector.pressed_keys(), &BTreeSet::from([A]));
    }

    #[test]
    fn test_shift_only_is_a_plain_key() {
        let mut injector = injector();
        injector.inject(&keys(&[LEFT_SHIFT]));

        assert_eq!(
            injector.sink().events(),
            &[key_event(LEFT_SHIFT, KeyAction::Press, Modifiers::empty())]
        );
    }

    #[test]
    fn test_release_uses_previous_modifiers() {
        let mut injector = injector();
        injector.inject(&keys(&[W, LEFT_SHIFT]));
        assert_eq!(
            injector.sink_mut().take_events(),
            vec![key_event(W, KeyAction::Press, Modifiers::SHIFT)]
        );

        injector.inject(&keys(&[A]));
        assert_eq!(
            injector.sink().events(),
            &[
                key_event(W, KeyAction::Release, Modifiers::SHIFT),
                key_event(A, KeyAction::Press, Modifiers::empty()),
            ]
        );
    }

    #[test]
    fn test_mouse_button_pressed_every_tick_and_released_once() {
        let mut injector = injector();
        let held = Command {
            mouse_buttons: MouseButtons::LEFT,
            ..Default::default()
        };
        let press = InputEvent::MouseButton {
            button: MouseButton::Left,
            action: KeyAction::Press,
            modifiers: Modifiers::empty(),
        };
        let release = InputEvent::MouseButton {
            button: MouseButton::Left,
            action: KeyAction::Release,
            modifiers: Modifiers::empty(),
        };

        injector.inject(&held);
        injector.inject(&held);
        injector.maintain_button_state();
        assert_eq!(injector.sink_mut().take_events(), vec![press; 3]);

        injector.inject(&Command::default());
        injector.inject(&Command::default());
        injector.maintain_button_state();
        assert_eq!(injector.sink().events(), &[release]);
    }

    #[test]
    fn test_unknown_button_bits_are_ignored() {
        let mut injector = injector();
        injector.inject(&Command {
            mouse_buttons: MouseButtons::from_bits_retain(0xF8),
            ..Default::default()
        });
        assert!(injector.sink().events().is_empty());
        assert!(injector.mouse_buttons().is_empty());
    }

    #[test]
    fn test_motion_turns_camera_when_unfocused() {
        let mut injector = InputInjector::new(RecordingSink::new().with_sensitivity(0.5));
        injector.inject(&Command {
            mouse_dx: 10.0,
            mouse_dy: -4.0,
            ..Default::default()
        });

        let factor = turn_factor(0.5);
        assert!((factor - 0.125 * 8.0).abs() < 1e-12);
        assert_eq!(
            injector.sink().events(),
            &[InputEvent::Turn {
                yaw: 10.0 * factor,
                pitch: -4.0 * factor
            }]
        );
        assert_eq!(injector.virtual_pointer(), None);
    }

    #[test]
    fn test_motion_drives_clamped_virtual_pointer_when_focused() {
        let mut sink = RecordingSink::new().with_window_size(100, 50);
        sink.set_ui_focused(true);
        let mut injector = InputInjector::new(sink);

        injector.inject(&Command {
            mouse_dx: 10.0,
            mouse_dy: 5.0,
            ..Default::default()
        });
        assert_eq!(injector.virtual_pointer(), Some((60.0, 30.0)));
        assert_eq!(
            injector.sink_mut().take_events(),
            vec![
                InputEvent::SystemPointer(false),
                InputEvent::PointerMoved { x: 60.0, y: 30.0 },
            ]
        );

        injector.inject(&Command {
            mouse_dx: 1000.0,
            mouse_dy: -1000.0,
            ..Default::default()
        });
        assert_eq!(injector.virtual_pointer(), Some((99.0, 0.0)));
        assert_eq!(
            injector.sink().events(),
            &[InputEvent::PointerMoved { x: 99.0, y: 0.0 }]
        );
    }

    #[test]
    fn test_non_finite_motion_leaves_pointer_in_window() {
        let mut sink = RecordingSink::new().with_window_size(100, 50);
        sink.set_ui_focused(true);
        let mut injector = InputInjector::new(sink);

        injector.inject(&Command {
            mouse_dx: f32::NAN,
            ..Default::default()
        });
        injector.inject(&Command {
            mouse_dx: f32::INFINITY,
            mouse_dy: 1.0,
            ..Default::default()
        });
        assert_eq!(injector.virtual_pointer(), None);
        assert!(injector.sink().events().is_empty());

        injector.inject(&Command {
            mouse_dx: 1.0,
            mouse_dy: 1.0,
            ..Default::default()
        });
        assert_eq!(injector.virtual_pointer(), Some((51.0, 26.0)));
        assert_eq!(
            injector.sink_mut().take_events(),
            vec![
                InputEvent::SystemPointer(false),
                InputEvent::PointerMoved { x: 51.0, y: 26.0 },
            ]
        );
    }

    #[test]
    fn test_non_finite_motion_does_not_turn_camera() {
        let mut injector = injector();
        injector.inject(&Command {
            mouse_dx: f32::NAN,
            mouse_dy: 0.0,
            scroll_delta: f32::NAN,
            ..Default::default()
        });
        injector.inject(&Command {
            mouse_dy: f32::NEG_INFINITY,
            ..Default::default()
        });
        assert!(injector.sink().events().is_empty());
    }

    #[test]
    fn test_pointer_suppression_can_be_disabled() {
        let mut sink = RecordingSink::new();
        sink.set_ui_focused(true);
        let mut injector = InputInjector::new(sink).suppress_system_pointer(false);

        injector.inject(&Command {
            mouse_dx: 1.0,
            ..Default::default()
        });
        assert!(
            !injector
                .sink()
                .events()
                .iter()
                .any(|e| matches!(e, InputEvent::SystemPointer(_)))
        );
    }

    #[test]
    fn test_scroll_and_text() {
        let mut sink = RecordingSink::new();
        sink.set_ui_focused(true);
        let mut injector = InputInjector::new(sink);

        injector.inject(&Command {
            scroll_delta: -2.0,
            text: "Hé🦀".to_string(),
            ..Default::default()
        });

        assert_eq!(
            injector.sink().events(),
            &[
                InputEvent::Scroll(-2.0),
                InputEvent::Char('H'),
                InputEvent::Char('é'),
                InputEvent::Char('🦀'),
            ]
        );
    }

    #[test]
    fn test_text_ignored_without_focus() {
        let mut injector = injector();
        injector.inject(&Command {
            text: "hello".to_string(),
            ..Default::default()
        });
        assert!(injector.sink().events().is_empty());
    }

    #[test]
    fn test_reset_releases_everything() {
        let mut sink = RecordingSink::new();
        sink.set_ui_focused(true);
        let mut injector = InputInjector::new(sink);
        injector.inject(&Command {
            keys: vec![W, A],
            mouse_buttons: MouseButtons::RIGHT,
            mouse_dx: 3.0,
            ..Default::default()
        });
        injector.sink_mut().take_events();

        injector.reset();

        let events = injector.sink_mut().take_events();
        let key_releases = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    InputEvent::Key {
                        action: KeyAction::Release,
                        ..
                    }
                )
            })
            .count();
        let button_releases = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    InputEvent::MouseButton {
                        button: MouseButton::Right,
                        action: KeyAction::Release,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(key_releases, 2);
        assert_eq!(button_releases, 1);
        assert!(events.contains(&InputEvent::SystemPointer(true)));

        assert!(injector.pressed_keys().is_empty());
        assert!(injector.mouse_buttons().is_empty());
        assert!(injector.modifiers().is_empty());
        assert_eq!(injector.virtual_pointer(), None);

        // Nothing left to release.
        injector.reset();
        assert!(injector.sink().events().is_empty());
    }
}
