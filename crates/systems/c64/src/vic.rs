//! Raster video generator.
//!
//! A state machine over raster position, decoupled from wall-clock time:
//! `tick()` counts down to the next line, lines advance to the next frame,
//! and the driving loop learns about frame boundaries through the returned
//! [`VicTick`]. Rendering happens one visible line at a time, reading screen
//! codes, color cells, character and bitmap data exclusively through the
//! bus's video-facing window.
//!
//! Known limitations, reported through the log rather than guessed at:
//! the raster register reads back a placeholder, and the extended-background
//! control-bit combinations select an unsupported mode that renders nothing.

use crate::bus::VideoMemory;
use breadbin_core::interrupt::IrqLine;
use breadbin_core::logging::{log, LogCategory, LogLevel};
use serde::Serialize;

/// Visible pixel area.
pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 200;

/// System ticks per raster line.
pub const TICKS_PER_LINE: u32 = 63;
/// Total raster lines per frame (PAL).
pub const LINES_PER_FRAME: u16 = 312;
/// First and last raster line of the visible window.
const FIRST_VISIBLE_LINE: u16 = 50;
const LAST_VISIBLE_LINE: u16 = 249;

const CELLS_PER_LINE: usize = 40;
const CELL_WIDTH: usize = 8;

// Register offsets within the chip's block at $D000.
const REG_CTRL1: usize = 0x11;
const REG_RASTER: usize = 0x12;
const REG_CTRL2: usize = 0x16;
const REG_BASE: usize = 0x18;
const REG_IRQ_STATUS: usize = 0x19;
const REG_IRQ_ENABLE: usize = 0x1A;
const REG_BG_COLOR: usize = 0x21;
const REG_MC_COLOR1: usize = 0x22;
const REG_MC_COLOR2: usize = 0x23;

const REG_COUNT: usize = 0x40;

/// Graphics mode, a pure function of three control-register bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
    Text,
    MulticolorText,
    Bitmap,
    MulticolorBitmap,
    /// Extended-background combinations; accepted, not rendered.
    Unsupported,
}

/// Outcome of one raster tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VicTick {
    InProgress,
    /// The raster wrapped to line 0; the framebuffer is complete.
    FrameComplete,
}

pub struct Vic {
    regs: [u8; REG_COUNT],
    mode: Mode,
    visible_rows: u8,
    visible_cols: u8,

    raster_line: u16,
    ticks_to_next_line: u32,

    screen_base: u16,
    char_base: u16,
    bitmap_base: u16,

    irq_enabled: bool,
    irq: IrqLine,

    // Host-side expansions of the character source, rebuilt from the video
    // window every visible line. One byte per pixel: 0x00/0xFF for hi-res,
    // the 2-bit pair code for multicolor.
    charset_hires: Vec<u8>,
    charset_mcm: Vec<u8>,

    framebuffer: Vec<u8>,
}

impl Vic {
    pub fn new(irq: IrqLine) -> Self {
        let mut vic = Self {
            regs: [0; REG_COUNT],
            mode: Mode::Text,
            visible_rows: 25,
            visible_cols: 40,
            raster_line: 0,
            ticks_to_next_line: TICKS_PER_LINE,
            screen_base: 0,
            char_base: 0,
            bitmap_base: 0,
            irq_enabled: false,
            irq,
            charset_hires: vec![0; CHARSET_IMAGE_BYTES * 8],
            charset_mcm: vec![0; CHARSET_IMAGE_BYTES * 8],
            framebuffer: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
        };
        // Power-on register state, applied through the normal write paths so
        // the derived state (mode, bases, row/column counts) is consistent.
        vic.write_register(0xD011, 0x9B);
        vic.write_register(0xD016, 0x08);
        vic.write_register(0xD018, 0x14);
        vic.regs[REG_IRQ_STATUS] = 0x0F;
        vic
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn raster_line(&self) -> u16 {
        self.raster_line
    }

    pub fn visible_rows(&self) -> u8 {
        self.visible_rows
    }

    pub fn visible_cols(&self) -> u8 {
        self.visible_cols
    }

    pub fn screen_base(&self) -> u16 {
        self.screen_base
    }

    pub fn char_base(&self) -> u16 {
        self.char_base
    }

    pub fn bitmap_base(&self) -> u16 {
        self.bitmap_base
    }

    /// The current frame's pixels, one palette index per pixel.
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    /// Processor-path register read.
    pub fn read_register(&self, addr: u16) -> u8 {
        let reg = (addr as usize) & (REG_COUNT - 1);
        if reg == REG_RASTER {
            // True raster position is not exposed yet; software sees a
            // stable placeholder.
            log(LogCategory::Video, LogLevel::Debug, || {
                "raster register read returns placeholder 0".to_string()
            });
            return 0;
        }
        self.regs[reg]
    }

    /// Register read without logging, for diagnostics dumps.
    pub fn peek_register(&self, addr: u16) -> u8 {
        self.regs[(addr as usize) & (REG_COUNT - 1)]
    }

    /// Processor-path register write. Control and base-address registers
    /// re-derive their dependent state immediately.
    pub fn write_register(&mut self, addr: u16, value: u8) {
        let reg = (addr as usize) & (REG_COUNT - 1);
        match reg {
            REG_CTRL1 => {
                self.visible_rows = if value & 0x08 != 0 { 24 } else { 25 };
                self.regs[REG_CTRL1] = value;
                self.update_mode();
            }
            REG_CTRL2 => {
                self.visible_cols = if value & 0x08 != 0 { 40 } else { 38 };
                self.regs[REG_CTRL2] = value;
                self.update_mode();
            }
            REG_BASE => {
                self.char_base = ((value & 0x0E) as u16) << 10;
                self.screen_base = ((value & 0xF0) as u16) << 6;
                self.bitmap_base = ((value & 0x08) as u16) << 10;
                self.regs[REG_BASE] = value;
            }
            REG_IRQ_ENABLE => {
                self.irq_enabled = value != 0;
                self.regs[REG_IRQ_ENABLE] = value;
            }
            REG_IRQ_STATUS => {
                // Writing with bit 0 clear acknowledges the raster interrupt.
                if value & 0x01 == 0 {
                    self.irq.release();
                }
                self.regs[REG_IRQ_STATUS] = value;
            }
            REG_RASTER => {
                log(LogCategory::Video, LogLevel::Debug, || {
                    format!("raster register write ignored: {value:02X}")
                });
            }
            _ => self.regs[reg] = value,
        }
    }

    /// Mode bits: extended-color (ctrl1.6), bitmap (ctrl1.5),
    /// multicolor (ctrl2.4).
    fn update_mode(&mut self) {
        let ecm = self.regs[REG_CTRL1] & 0x40 != 0;
        let bmm = self.regs[REG_CTRL1] & 0x20 != 0;
        let mcm = self.regs[REG_CTRL2] & 0x10 != 0;
        self.mode = match (ecm, bmm, mcm) {
            (false, false, false) => Mode::Text,
            (false, false, true) => Mode::MulticolorText,
            (false, true, false) => Mode::Bitmap,
            (false, true, true) => Mode::MulticolorBitmap,
            (true, _, _) => {
                log(LogCategory::Stubs, LogLevel::Warn, || {
                    "extended-background graphics mode not implemented".to_string()
                });
                Mode::Unsupported
            }
        };
    }

    /// Advance one tick. On a line boundary inside the visible window the
    /// line is rendered and, when enabled, the interrupt line asserted; on
    /// wrap to line 0 the completed frame is reported to the caller.
    pub fn tick(&mut self, mem: &VideoMemory<'_>) -> VicTick {
        self.ticks_to_next_line -= 1;
        if self.ticks_to_next_line > 0 {
            return VicTick::InProgress;
        }
        self.ticks_to_next_line = TICKS_PER_LINE;

        self.raster_line += 1;
        if self.raster_line == LINES_PER_FRAME {
            self.raster_line = 0;
            return VicTick::FrameComplete;
        }

        if !(FIRST_VISIBLE_LINE..=LAST_VISIBLE_LINE).contains(&self.raster_line) {
            return VicTick::InProgress;
        }

        if self.irq_enabled {
            self.irq.assert();
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                format!("raster line {} asserted IRQ", self.raster_line)
            });
        }

        // The character source can change under us (RAM-based charsets,
        // base-address flips), so the expansions are rebuilt per line.
        self.rebuild_charset_caches(mem);
        self.render_line(mem);
        VicTick::InProgress
    }

    fn rebuild_charset_caches(&mut self, mem: &VideoMemory<'_>) {
        for i in 0..CHARSET_IMAGE_BYTES {
            let byte = mem.read(self.char_base.wrapping_add(i as u16));
            for bit in 0..8 {
                self.charset_hires[i * 8 + 7 - bit] =
                    if byte & (1 << bit) != 0 { 0xFF } else { 0x00 };
            }
            for px in (0..8).step_by(2) {
                let code = (byte >> (6 - px)) & 0x03;
                self.charset_mcm[i * 8 + px] = code;
                self.charset_mcm[i * 8 + px + 1] = code;
            }
        }
    }

    fn render_line(&mut self, mem: &VideoMemory<'_>) {
        let crt_row = (self.raster_line - FIRST_VISIBLE_LINE) as usize;
        let char_row = crt_row / 8;
        let line_in_cell = crt_row % 8;

        for cell in 0..CELLS_PER_LINE {
            let code = mem.read(
                self.screen_base
                    .wrapping_add((char_row * CELLS_PER_LINE + cell) as u16),
            );
            match self.mode {
                Mode::Text | Mode::MulticolorText => {
                    self.render_char_cell(mem, code, crt_row, char_row, cell, line_in_cell)
                }
                Mode::Bitmap => self.render_bitmap_cell(mem, code, crt_row, char_row, cell, line_in_cell),
                Mode::MulticolorBitmap => {
                    self.render_bitmap_mcm_cell(mem, code, crt_row, char_row, cell, line_in_cell)
                }
                Mode::Unsupported => {}
            }
        }
    }

    fn render_char_cell(
        &mut self,
        mem: &VideoMemory<'_>,
        code: u8,
        crt_row: usize,
        char_row: usize,
        cell: usize,
        line_in_cell: usize,
    ) {
        let bg = self.regs[REG_BG_COLOR] & 0x0F;
        let fg = mem.color(char_row * CELLS_PER_LINE + cell) & 0x0F;
        let glyph = code as usize * 64 + line_in_cell * 8;
        let dst = crt_row * SCREEN_WIDTH + cell * CELL_WIDTH;

        if self.mode == Mode::Text || fg < 8 {
            for px in 0..CELL_WIDTH {
                self.framebuffer[dst + px] =
                    if self.charset_hires[glyph + px] != 0 { fg } else { bg };
            }
        } else {
            // Multicolor cell: each pair code selects one of four colors.
            let pair_colors = [
                bg,
                self.regs[REG_MC_COLOR1] & 0x0F,
                self.regs[REG_MC_COLOR2] & 0x0F,
                fg & 0x07,
            ];
            for px in 0..CELL_WIDTH {
                self.framebuffer[dst + px] =
                    pair_colors[self.charset_mcm[glyph + px] as usize];
            }
        }
    }

    fn render_bitmap_cell(
        &mut self,
        mem: &VideoMemory<'_>,
        code: u8,
        crt_row: usize,
        char_row: usize,
        cell: usize,
        line_in_cell: usize,
    ) {
        // The screen-matrix byte carries the color pair for the whole cell.
        let fg = code >> 4;
        let bg = code & 0x0F;
        let byte = mem.read(self.bitmap_base.wrapping_add(
            (char_row * SCREEN_WIDTH + cell * CELL_WIDTH + line_in_cell) as u16,
        ));
        let dst = crt_row * SCREEN_WIDTH + cell * CELL_WIDTH;
        for px in 0..CELL_WIDTH {
            let bit = (byte >> (7 - px)) & 0x01;
            self.framebuffer[dst + px] = if bit != 0 { fg } else { bg };
        }
    }

    fn render_bitmap_mcm_cell(
        &mut self,
        mem: &VideoMemory<'_>,
        code: u8,
        crt_row: usize,
        char_row: usize,
        cell: usize,
        line_in_cell: usize,
    ) {
        let bg = self.regs[REG_BG_COLOR] & 0x0F;
        let fg = mem.color(char_row * CELLS_PER_LINE + cell) & 0x0F;
        let byte = mem.read(self.bitmap_base.wrapping_add(
            (char_row * SCREEN_WIDTH + cell * CELL_WIDTH + line_in_cell) as u16,
        ));
        let pair_colors = [bg, code >> 4, code & 0x0F, fg];
        let dst = crt_row * SCREEN_WIDTH + cell * CELL_WIDTH;
        for px in (0..CELL_WIDTH).step_by(2) {
            let pair = (byte >> (6 - px)) & 0x03;
            let color = pair_colors[pair as usize];
            self.framebuffer[dst + px] = color;
            self.framebuffer[dst + px + 1] = color;
        }
    }
}

const CHARSET_IMAGE_BYTES: usize = 0x1000;

#[cfg(test)]
mod tests {
    use super::*;

    fn vic() -> (Vic, IrqLine) {
        let irq = IrqLine::new();
        (Vic::new(irq.clone()), irq)
    }

    fn empty_mem<'a>(ram: &'a [u8], char_rom: &'a [u8], color: &'a [u8]) -> VideoMemory<'a> {
        VideoMemory::for_tests(ram, char_rom, color)
    }

    #[test]
    fn power_on_derived_state() {
        let (v, _) = vic();
        assert_eq!(v.mode(), Mode::Text);
        assert_eq!(v.screen_base(), 0x0400);
        assert_eq!(v.char_base(), 0x1000);
        assert_eq!(v.bitmap_base(), 0x0000);
        assert_eq!(v.visible_rows(), 24); // ctrl1 power-on value has bit 3 set
        assert_eq!(v.visible_cols(), 40);
    }

    #[test]
    fn mode_derivation_table() {
        let (mut v, _) = vic();
        let cases = [
            (0x1B, 0x08, Mode::Text),
            (0x1B, 0x18, Mode::MulticolorText),
            (0x3B, 0x08, Mode::Bitmap),
            (0x3B, 0x18, Mode::MulticolorBitmap),
        ];
        for (ctrl1, ctrl2, expected) in cases {
            v.write_register(0xD011, ctrl1);
            v.write_register(0xD016, ctrl2);
            assert_eq!(v.mode(), expected, "ctrl1={ctrl1:02X} ctrl2={ctrl2:02X}");
        }
    }

    #[test]
    fn extended_background_bits_do_not_corrupt_state() {
        let (mut v, _) = vic();
        v.write_register(0xD011, 0x5B); // ecm set
        assert_eq!(v.mode(), Mode::Unsupported);
        // Registers still behave and the mode recovers.
        v.write_register(0xD011, 0x1B);
        assert_eq!(v.mode(), Mode::Text);
        assert_eq!(v.peek_register(0xD011), 0x1B);
    }

    #[test]
    fn base_address_register_derivation() {
        let (mut v, _) = vic();
        v.write_register(0xD018, 0x1E);
        assert_eq!(v.char_base(), (0x0E_u16) << 10);
        assert_eq!(v.screen_base(), (0x10_u16) << 6);
        assert_eq!(v.bitmap_base(), 0x2000);
    }

    #[test]
    fn raster_register_is_a_placeholder() {
        let (mut v, _) = vic();
        v.write_register(0xD012, 0x42);
        assert_eq!(v.read_register(0xD012), 0);
        assert_eq!(v.peek_register(0xD012), 0);
    }

    #[test]
    fn sixty_three_ticks_advance_one_line() {
        let (mut v, _) = vic();
        let ram = vec![0u8; 0x4000];
        let chars = vec![0u8; 0x1000];
        let color = vec![0u8; 0x400];
        let mem = empty_mem(&ram, &chars, &color);
        for _ in 0..TICKS_PER_LINE {
            v.tick(&mem);
        }
        assert_eq!(v.raster_line(), 1);
        for _ in 0..TICKS_PER_LINE {
            v.tick(&mem);
        }
        assert_eq!(v.raster_line(), 2);
    }

    #[test]
    fn one_frame_of_ticks_wraps_with_one_completion() {
        let (mut v, _) = vic();
        let ram = vec![0u8; 0x4000];
        let chars = vec![0u8; 0x1000];
        let color = vec![0u8; 0x400];
        let mem = empty_mem(&ram, &chars, &color);
        let mut completions = 0;
        for _ in 0..(LINES_PER_FRAME as u32 * TICKS_PER_LINE) {
            if v.tick(&mem) == VicTick::FrameComplete {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(v.raster_line(), 0);
    }

    #[test]
    fn visible_line_asserts_irq_when_enabled() {
        let (mut v, irq) = vic();
        let ram = vec![0u8; 0x4000];
        let chars = vec![0u8; 0x1000];
        let color = vec![0u8; 0x400];
        let mem = empty_mem(&ram, &chars, &color);

        // Not enabled: run into the visible window, nothing asserted.
        for _ in 0..(51 * TICKS_PER_LINE) {
            v.tick(&mem);
        }
        assert!(!irq.is_asserted());

        v.write_register(0xD01A, 0x01);
        for _ in 0..TICKS_PER_LINE {
            v.tick(&mem);
        }
        assert!(irq.is_asserted());

        // Acknowledge through the status register releases the line.
        v.write_register(0xD019, 0x00);
        assert!(!irq.is_asserted());
    }

    #[test]
    fn text_mode_renders_glyph_pixels() {
        let (mut v, _) = vic();
        let mut ram = vec![0u8; 0x4000];
        let mut chars = vec![0u8; 0x1000];
        let mut color = vec![0u8; 0x400];

        // Screen code 1 in the top-left cell; its glyph's first row is
        // 0b10101010. Foreground color 5, background 6.
        ram[0x0400] = 0x01;
        chars[8] = 0xAA;
        color[0] = 0x05;
        v.write_register(0xD021, 0x06);

        let mem = empty_mem(&ram, &chars, &color);
        // Advance to raster line 50 (first visible) so row 0 is rendered.
        for _ in 0..(50 * TICKS_PER_LINE) {
            v.tick(&mem);
        }
        let fb = v.framebuffer();
        assert_eq!(&fb[0..8], &[5, 6, 5, 6, 5, 6, 5, 6]);
    }

    #[test]
    fn multicolor_text_uses_pair_colors_for_high_foreground() {
        let (mut v, _) = vic();
        let mut ram = vec![0u8; 0x4000];
        let mut chars = vec![0u8; 0x1000];
        let mut color = vec![0u8; 0x400];

        v.write_register(0xD016, 0x18); // multicolor on
        v.write_register(0xD021, 0x00); // background 0
        v.write_register(0xD022, 0x07);
        v.write_register(0xD023, 0x0E);

        ram[0x0400] = 0x01;
        chars[8] = 0b00_01_10_11;
        color[0] = 0x0A; // >= 8 selects multicolor rendering; fg = 2

        let mem = empty_mem(&ram, &chars, &color);
        for _ in 0..(50 * TICKS_PER_LINE) {
            v.tick(&mem);
        }
        let fb = v.framebuffer();
        assert_eq!(&fb[0..8], &[0, 0, 7, 7, 14, 14, 2, 2]);
    }

    #[test]
    fn bitmap_mode_takes_colors_from_screen_byte_nibbles() {
        let (mut v, _) = vic();
        let mut ram = vec![0u8; 0x4000];
        let chars = vec![0u8; 0x1000];
        let color = vec![0u8; 0x400];

        v.write_register(0xD011, 0x3B); // bitmap mode
        ram[0x0400] = 0x25; // fg 2, bg 5
        ram[0x0000] = 0xF0; // bitmap byte for cell 0 line 0

        let mem = empty_mem(&ram, &chars, &color);
        for _ in 0..(50 * TICKS_PER_LINE) {
            v.tick(&mem);
        }
        let fb = v.framebuffer();
        assert_eq!(&fb[0..8], &[2, 2, 2, 2, 5, 5, 5, 5]);
    }
}
