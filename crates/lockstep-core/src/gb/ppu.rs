use std::collections::VecDeque;

use crate::error::{EmuError, Result};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

/// Dots (T-cycles) per scanline.
pub const DOTS_PER_LINE: u16 = 456;
/// Scanlines per frame, including VBlank.
pub const LINES_PER_FRAME: u8 = 154;

/// IF bits owned by the PPU.
pub const VBLANK_INTERRUPT: u8 = 0x01;
pub const STAT_INTERRUPT: u8 = 0x02;

const OAM_SCAN_DOTS: u16 = 80;
/// Dots spent on the discarded first tile fetch at the start of mode 3.
const TRANSFER_STARTUP_DOTS: u8 = 6;
const SPRITE_FETCH_DOTS: u8 = 6;

// Sprite limits
const MAX_SPRITES_PER_LINE: usize = 10;
const TOTAL_SPRITES: usize = 40;

const VRAM_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xA0;

// Window X position is clipped if greater than this value
const WINDOW_X_MAX: u8 = 166;

// VRAM layout constants
const BG_MAP_0_BASE: usize = 0x1800;
const BG_MAP_1_BASE: usize = 0x1C00;
const TILE_DATA_SIGNED_BASE: usize = 0x1000;

// LCD modes used in the `mode` field
pub const MODE_HBLANK: u8 = 0;
pub const MODE_VBLANK: u8 = 1;
pub const MODE_OAM: u8 = 2;
pub const MODE_TRANSFER: u8 = 3;

/// Default DMG palette colors in 0x00RRGGBB order.
pub const DMG_PALETTE: [u32; 4] = [0x009BBC0F, 0x008BAC0F, 0x00306230, 0x000F380F];

#[derive(Copy, Clone, Default)]
struct Sprite {
    x: u8,
    y: u8,
    tile: u8,
    flags: u8,
}

#[derive(Copy, Clone, Default)]
struct ObjPixel {
    color: u8,
    palette1: bool,
    behind_bg: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FetchStep {
    Tile,
    DataLow,
    DataHigh,
    Push,
}

/// Background/window tile fetcher. Tile, DataLow and DataHigh take two
/// dots each; Push retries every dot until the FIFO is empty.
#[derive(Copy, Clone)]
struct Fetcher {
    step: FetchStep,
    dots: u8,
    tile_x: u8,
    tile: u8,
    low: u8,
    high: u8,
    window: bool,
}

impl Fetcher {
    fn new(window: bool) -> Self {
        Self {
            step: FetchStep::Tile,
            dots: 0,
            tile_x: 0,
            tile: 0,
            low: 0,
            high: 0,
            window,
        }
    }
}

#[derive(Copy, Clone)]
struct SpriteFetch {
    index: usize,
    dots_left: u8,
}

pub struct Ppu {
    pub vram: [u8; VRAM_SIZE],
    pub oam: [u8; OAM_SIZE],

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    /// Last value written to the OAM DMA register.
    pub dma: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    pub mode: u8,
    dot: u16,

    /// Internal window line counter
    win_line_counter: u8,
    /// WY matched LY at some point this frame
    window_y_hit: bool,
    /// The window was drawn on the current line
    window_active: bool,

    /// Latched sprites for the current scanline
    line_sprites: [Sprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    sprites_fetched: u16,
    sprite_fetch: Option<SpriteFetch>,

    bg_fifo: VecDeque<u8>,
    obj_fifo: VecDeque<ObjPixel>,
    fetcher: Fetcher,
    startup_dots: u8,
    discard: u8,
    lx: u8,

    /// The first frame after the LCD is switched on is not drawn.
    blank_frame: bool,

    pub framebuffer: [u32; SCREEN_WIDTH * SCREEN_HEIGHT],
    /// Indicates a completed frame is available in `framebuffer`
    frame_ready: bool,
    stat_irq_line: bool,
    frame_counter: u64,
}

impl Ppu {
    /// PPU as found at power-on: LCD off, everything cleared.
    pub fn new() -> Self {
        Self {
            vram: [0; VRAM_SIZE],
            oam: [0; OAM_SIZE],
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            dma: 0xFF,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            mode: MODE_HBLANK,
            dot: 0,
            win_line_counter: 0,
            window_y_hit: false,
            window_active: false,
            line_sprites: [Sprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            sprites_fetched: 0,
            sprite_fetch: None,
            bg_fifo: VecDeque::with_capacity(16),
            obj_fifo: VecDeque::with_capacity(16),
            fetcher: Fetcher::new(false),
            startup_dots: 0,
            discard: 0,
            lx: 0,
            blank_frame: false,
            framebuffer: [DMG_PALETTE[0]; SCREEN_WIDTH * SCREEN_HEIGHT],
            frame_ready: false,
            stat_irq_line: false,
            frame_counter: 0,
        }
    }

    /// Register state left by the boot ROM: LCD and background on, at the
    /// top of a frame.
    pub fn apply_boot_state(&mut self) {
        self.lcdc = 0x91;
        self.bgp = 0xFC;
        self.ly = 0;
        self.dot = 0;
        self.start_line();
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & 0x80 != 0
    }

    /// Current `(LY, dot)` position inside the frame.
    pub fn dot_position(&self) -> (u8, u16) {
        (self.ly, self.dot)
    }

    pub fn frames(&self) -> u64 {
        self.frame_counter
    }

    /// Returns true once per finished frame.
    pub fn take_frame(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    pub fn vram_accessible(&self) -> bool {
        !self.lcd_enabled() || self.mode != MODE_TRANSFER
    }

    pub fn oam_accessible(&self) -> bool {
        !self.lcd_enabled() || matches!(self.mode, MODE_HBLANK | MODE_VBLANK)
    }

    pub fn read_reg(&self, addr: u16) -> Result<u8> {
        Ok(match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                if self.lcd_enabled() {
                    let coincidence = if self.ly == self.lyc { 0x04 } else { 0 };
                    0x80 | self.stat | coincidence | self.mode
                } else {
                    0x80 | self.stat
                }
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF46 => self.dma,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => {
                return Err(EmuError::InvalidAddress {
                    device: "ppu",
                    address: addr,
                });
            }
        })
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) -> Result<()> {
        match addr {
            0xFF40 => self.write_lcdc(val),
            0xFF41 => self.stat = val & 0x78,
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF44 => {}
            0xFF45 => self.lyc = val,
            0xFF46 => self.dma = val,
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {
                return Err(EmuError::InvalidAddress {
                    device: "ppu",
                    address: addr,
                });
            }
        }
        Ok(())
    }

    fn write_lcdc(&mut self, val: u8) {
        let was_on = self.lcd_enabled();
        self.lcdc = val;
        match (was_on, self.lcd_enabled()) {
            (true, false) => {
                self.ly = 0;
                self.dot = 0;
                self.mode = MODE_HBLANK;
                self.stat_irq_line = false;
                self.bg_fifo.clear();
                self.obj_fifo.clear();
                // no handoff while the LCD is off, not even a half-drawn frame
                self.frame_ready = false;
            }
            (false, true) => {
                self.ly = 0;
                self.dot = 0;
                self.win_line_counter = 0;
                self.window_y_hit = false;
                self.start_line();
                // the first line after enabling skips the OAM scan
                self.mode = MODE_HBLANK;
                self.blank_frame = true;
                self.framebuffer.fill(DMG_PALETTE[0]);
            }
            _ => {}
        }
    }

    /// Advance one machine cycle (four dots).
    pub fn cycle(&mut self, if_reg: &mut u8) {
        for _ in 0..4 {
            self.step_dot(if_reg);
        }
    }

    /// Advance a single dot.
    pub fn step_dot(&mut self, if_reg: &mut u8) {
        if !self.lcd_enabled() {
            return;
        }
        match self.mode {
            MODE_OAM if self.dot % 2 == 1 => self.scan_oam_entry((self.dot / 2) as usize),
            MODE_TRANSFER => self.transfer_dot(),
            _ => {}
        }

        self.dot += 1;
        if self.dot == OAM_SCAN_DOTS && (self.ly as usize) < SCREEN_HEIGHT {
            self.start_transfer();
        }
        if self.dot == DOTS_PER_LINE {
            self.dot = 0;
            self.end_line(if_reg);
        }
        self.update_stat_irq(if_reg);
    }

    fn start_line(&mut self) {
        self.mode = MODE_OAM;
        self.sprite_count = 0;
        self.window_active = false;
        if self.ly == self.wy {
            self.window_y_hit = true;
        }
    }

    fn end_line(&mut self, if_reg: &mut u8) {
        if self.window_active {
            self.win_line_counter = self.win_line_counter.wrapping_add(1);
        }
        self.ly += 1;
        if self.ly as usize == SCREEN_HEIGHT {
            self.mode = MODE_VBLANK;
            *if_reg |= VBLANK_INTERRUPT;
            self.blank_frame = false;
            self.frame_ready = true;
            self.frame_counter += 1;
        } else if self.ly == LINES_PER_FRAME {
            self.ly = 0;
            self.win_line_counter = 0;
            self.window_y_hit = false;
            self.start_line();
        } else if (self.ly as usize) < SCREEN_HEIGHT {
            self.start_line();
        }
    }

    fn scan_oam_entry(&mut self, index: usize) {
        if self.sprite_count == MAX_SPRITES_PER_LINE || index >= TOTAL_SPRITES {
            return;
        }
        let base = index * 4;
        let y = self.oam[base];
        let height = self.sprite_height();
        let line = self.ly as u16 + 16;
        if line >= y as u16 && line < y as u16 + height as u16 {
            self.line_sprites[self.sprite_count] = Sprite {
                y,
                x: self.oam[base + 1],
                tile: self.oam[base + 2],
                flags: self.oam[base + 3],
            };
            self.sprite_count += 1;
        }
    }

    fn sprite_height(&self) -> u8 {
        if self.lcdc & 0x04 != 0 { 16 } else { 8 }
    }

    fn start_transfer(&mut self) {
        self.mode = MODE_TRANSFER;
        // stable sort keeps OAM order among equal X
        self.line_sprites[..self.sprite_count].sort_by_key(|s| s.x);
        self.sprites_fetched = 0;
        self.sprite_fetch = None;
        self.bg_fifo.clear();
        self.obj_fifo.clear();
        self.fetcher = Fetcher::new(false);
        self.startup_dots = TRANSFER_STARTUP_DOTS;
        self.discard = self.scx & 7;
        self.lx = 0;
    }

    fn transfer_dot(&mut self) {
        if self.startup_dots > 0 {
            self.startup_dots -= 1;
            return;
        }

        if let Some(fetch) = self.sprite_fetch.as_mut() {
            fetch.dots_left -= 1;
            if fetch.dots_left == 0 {
                let index = fetch.index;
                self.sprite_fetch = None;
                self.merge_sprite(index);
            }
            return;
        }

        if self.lcdc & 0x02 != 0 {
            let hit = (0..self.sprite_count).find(|&i| {
                self.sprites_fetched & (1 << i) == 0
                    && self.line_sprites[i].x as u16 <= self.lx as u16 + 8
            });
            if let Some(index) = hit {
                self.sprites_fetched |= 1 << index;
                self.sprite_fetch = Some(SpriteFetch {
                    index,
                    dots_left: SPRITE_FETCH_DOTS,
                });
                return;
            }
        }

        if !self.fetcher.window
            && self.lcdc & 0x20 != 0
            && self.window_y_hit
            && self.wx <= WINDOW_X_MAX
            && self.lx + 7 >= self.wx
        {
            self.window_active = true;
            self.bg_fifo.clear();
            self.fetcher = Fetcher::new(true);
            self.discard = 0;
        }

        self.output_pixel();
        if self.mode == MODE_TRANSFER {
            self.step_fetcher();
        }
    }

    fn output_pixel(&mut self) {
        let Some(bg) = self.bg_fifo.pop_front() else {
            return;
        };
        if self.discard > 0 {
            self.discard -= 1;
            return;
        }
        let obj = self.obj_fifo.pop_front().unwrap_or_default();

        let bg_color = if self.lcdc & 0x01 != 0 { bg } else { 0 };
        let show_obj = self.lcdc & 0x02 != 0 && obj.color != 0;
        let shade = if show_obj && !(obj.behind_bg && bg_color != 0) {
            let palette = if obj.palette1 { self.obp1 } else { self.obp0 };
            (palette >> (obj.color * 2)) & 0x03
        } else {
            (self.bgp >> (bg_color * 2)) & 0x03
        };
        if !self.blank_frame {
            let index = self.ly as usize * SCREEN_WIDTH + self.lx as usize;
            self.framebuffer[index] = DMG_PALETTE[shade as usize];
        }

        self.lx += 1;
        if self.lx as usize == SCREEN_WIDTH {
            self.mode = MODE_HBLANK;
        }
    }

    fn step_fetcher(&mut self) {
        match self.fetcher.step {
            FetchStep::Tile => {
                if self.fetcher_tick() {
                    self.fetcher.tile = self.vram[self.tile_map_addr()];
                    self.fetcher.step = FetchStep::DataLow;
                }
            }
            FetchStep::DataLow => {
                if self.fetcher_tick() {
                    self.fetcher.low = self.vram[self.tile_row_addr()];
                    self.fetcher.step = FetchStep::DataHigh;
                }
            }
            FetchStep::DataHigh => {
                if self.fetcher_tick() {
                    self.fetcher.high = self.vram[self.tile_row_addr() + 1];
                    self.fetcher.step = FetchStep::Push;
                    self.try_push();
                }
            }
            FetchStep::Push => self.try_push(),
        }
    }

    fn fetcher_tick(&mut self) -> bool {
        self.fetcher.dots += 1;
        if self.fetcher.dots == 2 {
            self.fetcher.dots = 0;
            true
        } else {
            false
        }
    }

    fn try_push(&mut self) {
        if !self.bg_fifo.is_empty() {
            return;
        }
        let (low, high) = (self.fetcher.low, self.fetcher.high);
        for bit in (0..8).rev() {
            self.bg_fifo
                .push_back((((high >> bit) & 1) << 1) | ((low >> bit) & 1));
        }
        self.fetcher.tile_x = self.fetcher.tile_x.wrapping_add(1);
        self.fetcher.step = FetchStep::Tile;
    }

    /// Row of the tile map and the tile row within it for the current fetch.
    fn fetch_coords(&self) -> (usize, u8, u8) {
        if self.fetcher.window {
            let map = if self.lcdc & 0x40 != 0 {
                BG_MAP_1_BASE
            } else {
                BG_MAP_0_BASE
            };
            (map, self.fetcher.tile_x, self.win_line_counter)
        } else {
            let map = if self.lcdc & 0x08 != 0 {
                BG_MAP_1_BASE
            } else {
                BG_MAP_0_BASE
            };
            let x = (self.scx / 8).wrapping_add(self.fetcher.tile_x);
            (map, x, self.ly.wrapping_add(self.scy))
        }
    }

    fn tile_map_addr(&self) -> usize {
        let (map, x, y) = self.fetch_coords();
        map + (y as usize / 8) * 32 + (x as usize & 31)
    }

    fn tile_row_addr(&self) -> usize {
        let (_, _, y) = self.fetch_coords();
        let tile = self.fetcher.tile;
        let base = if self.lcdc & 0x10 != 0 {
            tile as usize * 16
        } else {
            (TILE_DATA_SIGNED_BASE as isize + (tile as i8 as isize) * 16) as usize
        };
        base + (y as usize % 8) * 2
    }

    fn merge_sprite(&mut self, index: usize) {
        let sprite = self.line_sprites[index];
        let height = self.sprite_height();
        let mut row = (self.ly as u16 + 16).wrapping_sub(sprite.y as u16) as u8 % height;
        if sprite.flags & 0x40 != 0 {
            row = height - 1 - row;
        }
        let tile = if height == 16 {
            sprite.tile & 0xFE
        } else {
            sprite.tile
        };
        let addr = tile as usize * 16 + row as usize * 2;
        let (low, high) = (self.vram[addr], self.vram[addr + 1]);

        while self.obj_fifo.len() < 8 {
            self.obj_fifo.push_back(ObjPixel::default());
        }
        // pixels left of the current position were already drawn
        let skip = (self.lx as usize + 8).saturating_sub(sprite.x as usize);
        for i in skip..8 {
            let bit = if sprite.flags & 0x20 != 0 { i } else { 7 - i };
            let color = (((high >> bit) & 1) << 1) | ((low >> bit) & 1);
            let slot = &mut self.obj_fifo[i - skip];
            if slot.color == 0 && color != 0 {
                *slot = ObjPixel {
                    color,
                    palette1: sprite.flags & 0x10 != 0,
                    behind_bg: sprite.flags & 0x80 != 0,
                };
            }
        }
    }

    fn update_stat_irq(&mut self, if_reg: &mut u8) {
        let coincidence = self.ly == self.lyc && self.stat & 0x40 != 0;
        let mode_signal = match self.mode {
            MODE_HBLANK => self.stat & 0x08 != 0,
            MODE_VBLANK => self.stat & 0x10 != 0,
            MODE_OAM => self.stat & 0x20 != 0,
            _ => false,
        };
        let current = coincidence || mode_signal;
        if current && !self.stat_irq_line {
            *if_reg |= STAT_INTERRUPT;
        }
        self.stat_irq_line = current;
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}
