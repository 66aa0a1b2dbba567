//! Hex keypad. The program selects one key with OUT 2 and reads it back on EF3.

use crate::device::Device;
use crate::sink::KeySource;

pub const KEY_SELECT_PORT: u8 = 2;
/// EF3 in the arbiter's flag word.
const EF3: u8 = 0x04;

#[derive(Default)]
pub struct Keypad {
    selected: u8,
    pressed: u16,
}

impl Keypad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample keys 0x0-0xF. Called once per frame.
    pub fn latch(&mut self, keys: &dyn KeySource) {
        self.pressed = (0..16)
            .filter(|&key| keys.is_pressed(key))
            .fold(0, |acc, key| acc | 1 << key);
    }

    pub fn selected(&self) -> u8 {
        self.selected
    }
}

impl Device for Keypad {
    fn name(&self) -> &'static str {
        "keypad"
    }

    fn is_output_port(&self, port: u8) -> bool {
        port == KEY_SELECT_PORT
    }

    fn on_output(&mut self, _port: u8, value: u8) {
        self.selected = value & 0x0F;
    }

    fn ef_lines(&self) -> u8 {
        if self.pressed & (1 << self.selected) != 0 {
            EF3
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Held(usize);

    impl KeySource for Held {
        fn is_pressed(&self, key: usize) -> bool {
            key == self.0
        }
    }

    #[test]
    fn ef3_follows_selected_key() {
        let mut keypad = Keypad::new();
        keypad.latch(&Held(0xA));
        assert_eq!(keypad.ef_lines(), 0);
        keypad.on_output(KEY_SELECT_PORT, 0xFA);
        assert_eq!(keypad.selected(), 0xA);
        assert_eq!(keypad.ef_lines(), EF3);
        keypad.latch(&Held(0x3));
        assert_eq!(keypad.ef_lines(), 0);
    }
}
