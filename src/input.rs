use log::warn;
use parking_lot::Mutex;

/// keys on the CHIP-8 pad, 0x0 to 0xf
pub const NUM_KEYS: usize = 16;

/// map of host characters to the CHIP-8 pad using the left-hand side of a
/// qwerty keyboard
pub const CHIP8_CONVENTIONAL_KEYMAP: [(char, u8); NUM_KEYS] = [
    ('x', 0x00), // x
    ('1', 0x01), // 1
    ('2', 0x02), // 2
    ('3', 0x03), // 3
    ('q', 0x04), // q
    ('w', 0x05), // w
    ('e', 0x06), // e
    ('a', 0x07), // a
    ('s', 0x08), // s
    ('d', 0x09), // d
    ('z', 0x0a), // z
    ('c', 0x0b), // c
    ('4', 0x0c), // 4
    ('r', 0x0d), // r
    ('f', 0x0e), // f
    ('v', 0x0f), // v
];

/// Held state of the 16-key pad, shared between the host's input events and
/// the interpreter thread. Events overwrite state directly, no queueing:
/// the interpreter samples key state once per tick anyway, so last event
/// wins.
pub struct Keypad {
    keys: Mutex<[bool; NUM_KEYS]>,
}

impl Keypad {
    pub fn new() -> Keypad {
        Keypad {
            keys: Mutex::new([false; NUM_KEYS]),
        }
    }

    /// host key-press pass-through; codes outside the pad are dropped
    pub fn key_down(&self, key: u8) {
        match self.keys.lock().get_mut(key as usize) {
            Some(held) => *held = true,
            None => warn!("no CHIP-8 key 0x{:02x?} to press", key),
        }
    }

    /// host key-release pass-through
    pub fn key_up(&self, key: u8) {
        match self.keys.lock().get_mut(key as usize) {
            Some(held) => *held = false,
            None => warn!("no CHIP-8 key 0x{:02x?} to release", key),
        }
    }

    /// per-tick poll for SKP/SKNP
    pub fn is_pressed(&self, key: u8) -> bool {
        self.keys
            .lock()
            .get(key as usize)
            .copied()
            .unwrap_or(false)
    }

    /// lowest-numbered held key, for the wait-for-key instruction
    pub fn first_pressed(&self) -> Option<u8> {
        self.keys
            .lock()
            .iter()
            .position(|held| *held)
            .map(|key| key as u8)
    }
}

impl Default for Keypad {
    fn default() -> Self {
        Keypad::new()
    }
}
