use serde::{Deserialize, Serialize};

use crate::state::{GameEvent, GamePhase};

/// Keys the game listens to. Whatever produces them (a window, a terminal, a script) maps
/// its own key codes onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Enter,
    Escape,
    Space,
    Backspace,
    Char(char),
}

/// Maps a key to the event it means in `phase`.
///
/// While a name is being typed, printable keys (space included) are text. Everywhere else
/// Space is the keyboard stand-in for a pinch.
pub fn map_key(key: Key, phase: GamePhase) -> Option<GameEvent> {
    match (key, phase) {
        (Key::Enter, _) => Some(GameEvent::Confirm),
        (Key::Escape, _) => Some(GameEvent::Cancel),
        (Key::Backspace, GamePhase::EnteringName) => Some(GameEvent::Backspace),
        (Key::Space, GamePhase::EnteringName) => Some(GameEvent::Char(' ')),
        (Key::Char(c), GamePhase::EnteringName) => Some(GameEvent::Char(c)),
        (Key::Space, _) => Some(GameEvent::Flap),
        _ => None,
    }
}

/// The keystrokes that type `name` and confirm it.
pub fn keys_for_name(name: &str) -> Vec<Key> {
    name.chars()
        .map(|c| if c == ' ' { Key::Space } else { Key::Char(c) })
        .chain(std::iter::once(Key::Enter))
        .collect()
}
