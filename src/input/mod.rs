//! Synthetic input injection
//!
//! Commands decoded from the agent are applied to the engine once per tick by
//! an [`InputInjector`], which talks to the engine only through the
//! [`InputSink`] trait.

mod injector;
pub mod keys;
mod sink;

pub use injector::{InputInjector, turn_factor};
pub use keys::{KeyCode, Modifiers};
pub use sink::{InputEvent, InputSink, KeyAction, MouseButton, RecordingSink};
