use crate::sink::KeySource;

/// IF bit raised when a selected input line goes low.
pub const JOYPAD_INTERRUPT: u8 = 0x10;

/// Key numbers handed to [`KeySource::is_pressed`]. Directions sit on the
/// P14 select line, buttons on P15; each group maps to P10-P13 in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    Right = 0,
    Left = 1,
    Up = 2,
    Down = 3,
    A = 4,
    B = 5,
    Select = 6,
    Start = 7,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
    ];
}

/// P1 register and the edge-triggered joypad interrupt.
pub struct Joypad {
    select: u8,
    pressed: u8,
    last_lines: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: 0x30,
            pressed: 0,
            last_lines: 0x0F,
        }
    }

    pub fn read(&self) -> u8 {
        0xC0 | self.select | self.lines()
    }

    pub fn write(&mut self, val: u8, if_reg: &mut u8) {
        self.select = val & 0x30;
        self.update_lines(if_reg);
    }

    /// Sample the key source. Called once per frame.
    pub fn latch(&mut self, keys: &dyn KeySource, if_reg: &mut u8) {
        self.pressed = Button::ALL
            .iter()
            .filter(|&&b| keys.is_pressed(b as usize))
            .fold(0, |acc, &b| acc | 1 << b as u8);
        self.update_lines(if_reg);
    }

    /// True while any selected input line is held low. Wakes the CPU from STOP.
    pub fn any_line_low(&self) -> bool {
        self.lines() != 0x0F
    }

    /// P10-P13, active low.
    fn lines(&self) -> u8 {
        let mut lines = 0x0F;
        if self.select & 0x10 == 0 {
            lines &= !(self.pressed & 0x0F);
        }
        if self.select & 0x20 == 0 {
            lines &= !(self.pressed >> 4);
        }
        lines
    }

    fn update_lines(&mut self, if_reg: &mut u8) {
        let lines = self.lines();
        if self.last_lines & !lines != 0 {
            *if_reg |= JOYPAD_INTERRUPT;
        }
        self.last_lines = lines;
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Held(&'static [Button]);

    impl KeySource for Held {
        fn is_pressed(&self, key: usize) -> bool {
            self.0.iter().any(|&b| b as usize == key)
        }
    }

    #[test]
    fn selected_group_pulls_lines_low() {
        let mut joypad = Joypad::new();
        let mut if_reg = 0;
        joypad.latch(&Held(&[Button::Start, Button::Up]), &mut if_reg);
        assert_eq!(joypad.read(), 0xFF);
        assert_eq!(if_reg, 0);

        joypad.write(0x20, &mut if_reg);
        assert_eq!(joypad.read() & 0x0F, 0x0B);
        assert_eq!(if_reg, JOYPAD_INTERRUPT);

        if_reg = 0;
        joypad.write(0x10, &mut if_reg);
        assert_eq!(joypad.read() & 0x0F, 0x07);
        assert_eq!(if_reg, JOYPAD_INTERRUPT);
    }

    #[test]
    fn release_does_not_interrupt() {
        let mut joypad = Joypad::new();
        let mut if_reg = 0;
        joypad.write(0x10, &mut if_reg);
        joypad.latch(&Held(&[Button::A]), &mut if_reg);
        assert_eq!(if_reg, JOYPAD_INTERRUPT);

        if_reg = 0;
        joypad.latch(&Held(&[]), &mut if_reg);
        assert_eq!(if_reg, 0);
        assert_eq!(joypad.read() & 0x0F, 0x0F);
    }
}
