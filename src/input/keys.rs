//! Key identifiers and modifier handling
//!
//! Key codes are opaque small integers chosen by the agent and the engine; the
//! bridge only needs to know which of them are modifiers. The numbering follows
//! the GLFW key table, which is what the engine's keyboard handler consumes.

use std::collections::BTreeSet;

/// Key identifier as carried on the wire
pub type KeyCode = i16;

pub const SPACE: KeyCode = 32;
pub const A: KeyCode = 65;
pub const D: KeyCode = 68;
pub const E: KeyCode = 69;
pub const S: KeyCode = 83;
pub const W: KeyCode = 87;
pub const ESCAPE: KeyCode = 256;
pub const ENTER: KeyCode = 257;

pub const LEFT_SHIFT: KeyCode = 340;
pub const LEFT_CONTROL: KeyCode = 341;
pub const LEFT_ALT: KeyCode = 342;
pub const LEFT_SUPER: KeyCode = 343;
pub const RIGHT_SHIFT: KeyCode = 344;
pub const RIGHT_CONTROL: KeyCode = 345;
pub const RIGHT_ALT: KeyCode = 346;
pub const RIGHT_SUPER: KeyCode = 347;
pub const MENU: KeyCode = 348;

/// Keys treated as modifiers during edge detection
pub const MODIFIER_KEYS: [KeyCode; 9] = [
    LEFT_SHIFT,
    RIGHT_SHIFT,
    LEFT_CONTROL,
    RIGHT_CONTROL,
    LEFT_ALT,
    RIGHT_ALT,
    LEFT_SUPER,
    RIGHT_SUPER,
    MENU,
];

pub fn is_modifier(key: KeyCode) -> bool {
    MODIFIER_KEYS.contains(&key)
}

bitflags::bitflags! {
    /// Modifier state passed along with key and button events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 0x01;
        const CONTROL = 0x02;
        const ALT = 0x04;
        const SUPER = 0x08;
    }
}

impl Modifiers {
    /// Modifier bitmask for a set of held modifier keys
    ///
    /// `MENU` counts as a modifier key but has no bit of its own.
    pub fn from_keys<'a>(keys: impl IntoIterator<Item = &'a KeyCode>) -> Self {
        keys.into_iter().fold(Self::empty(), |mods, key| {
            mods | match *key {
                LEFT_SHIFT | RIGHT_SHIFT => Self::SHIFT,
                LEFT_CONTROL | RIGHT_CONTROL => Self::CONTROL,
                LEFT_ALT | RIGHT_ALT => Self::ALT,
                LEFT_SUPER | RIGHT_SUPER => Self::SUPER,
                _ => Self::empty(),
            }
        })
    }
}

/// Split a tick's keys into (held non-modifier keys, modifier bitmask)
///
/// When every key in the set is a modifier, the whole set is treated as plain
/// keys so that e.g. a lone shift still produces a press.
pub fn partition(keys: &[KeyCode]) -> (BTreeSet<KeyCode>, Modifiers) {
    let current: BTreeSet<KeyCode> = keys.iter().copied().collect();
    let modifier_keys: BTreeSet<KeyCode> =
        current.iter().copied().filter(|&key| is_modifier(key)).collect();

    if modifier_keys.len() == current.len() {
        return (current, Modifiers::empty());
    }

    let modifiers = Modifiers::from_keys(&modifier_keys);
    let held = current.difference(&modifier_keys).copied().collect();
    (held, modifiers)
}
