//! Commodore-64-class home computer: system assembly and driving loop.

#![allow(clippy::upper_case_acronyms)]

pub mod bus;
pub mod cia;
pub mod keyboard;
pub mod palette;
pub mod vic;

use breadbin_core::cpu_6502::{Cpu6502, HaltReason, Step};
use breadbin_core::interrupt::{IrqLine, NmiLine};
use breadbin_core::types::{Frame, PixelFormat};
use breadbin_core::System;
use bus::{C64Bus, RomError};
use keyboard::C64Key;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use vic::{VicTick, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Target wall-clock duration of one frame (50 Hz).
pub const FRAME_PERIOD: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum C64Error {
    #[error(transparent)]
    Rom(#[from] RomError),
    #[error("execution halted by BRK at ${pc:04X}")]
    Break { pc: u16 },
    #[error("execution halted by unimplemented opcode ${opcode:02X} at ${pc:04X}")]
    UnknownOpcode { opcode: u8, pc: u16 },
}

/// The whole machine: processor (owning the bus, which owns the chips) plus
/// the shared interrupt lines and the frame pacer.
///
/// One call to [`System::step_frame`] advances the processor and the video
/// generator in strict lockstep, one instruction paired with one raster
/// tick, until the raster wraps and a frame is complete. A halt (BRK or an
/// unimplemented opcode) stops the loop and surfaces as an error; the
/// machine state stays inspectable afterwards.
pub struct C64System {
    cpu: Cpu6502<C64Bus>,
    halted: Option<HaltReason>,
    pacing: bool,
    last_frame_at: Option<Instant>,
}

impl Default for C64System {
    fn default() -> Self {
        Self::new()
    }
}

impl C64System {
    /// Create a machine with blank ROMs. Load images and [`reset`] before
    /// running.
    ///
    /// [`reset`]: System::reset
    pub fn new() -> Self {
        let irq = IrqLine::new();
        let nmi = NmiLine::new();
        let bus = C64Bus::new(irq.clone());
        Self {
            cpu: Cpu6502::new(bus, irq, nmi),
            halted: None,
            pacing: true,
            last_frame_at: None,
        }
    }

    /// Create a machine from ROM image files and reset it. Missing or
    /// wrongly sized images are fatal.
    pub fn from_rom_paths(kernal_basic: &Path, charset: &Path) -> Result<Self, C64Error> {
        let mut sys = Self::new();
        sys.cpu.bus.load_kernal_basic(kernal_basic)?;
        sys.cpu.bus.load_charset(charset)?;
        System::reset(&mut sys);
        Ok(sys)
    }

    /// Enable or disable frame pacing (headless runs want it off).
    pub fn set_pacing(&mut self, pacing: bool) {
        self.pacing = pacing;
    }

    pub fn bus(&self) -> &C64Bus {
        &self.cpu.bus
    }

    pub fn bus_mut(&mut self) -> &mut C64Bus {
        &mut self.cpu.bus
    }

    pub fn registers(&self) -> &breadbin_core::cpu_6502::Registers {
        self.cpu.registers()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn key_down(&mut self, key: C64Key) {
        self.cpu.bus.cia1.keyboard.key_down(key);
    }

    pub fn key_up(&mut self, key: C64Key) {
        self.cpu.bus.cia1.keyboard.key_up(key);
    }

    /// Human-readable register dump for interactive diagnostics.
    pub fn dump_registers(&self) -> String {
        let r = self.registers();
        let mut out = String::new();
        let _ = writeln!(out, "A:  ${:02X}   X: ${:02X}   Y: ${:02X}", r.a, r.x, r.y);
        let _ = writeln!(out, "PC: ${:04X} SP: ${:02X}", r.pc, r.sp);
        let _ = writeln!(
            out,
            "flags: {}{}-{}{}{}{}",
            if r.sign { 'N' } else { 'n' },
            if r.overflow { 'V' } else { 'v' },
            if r.decimal { 'D' } else { 'd' },
            if r.irq_disable { 'I' } else { 'i' },
            if r.zero { 'Z' } else { 'z' },
            if r.carry { 'C' } else { 'c' },
        );
        out
    }

    /// Hex dump of a memory window.
    pub fn dump_memory(&self, addr: u16, len: usize) -> String {
        self.cpu.bus.dump_memory(addr, len)
    }

    fn halt_error(&self, reason: HaltReason) -> C64Error {
        let pc = self.registers().pc;
        match reason {
            HaltReason::Break => C64Error::Break { pc },
            HaltReason::UnknownOpcode(opcode) => C64Error::UnknownOpcode { opcode, pc },
        }
    }

    /// Block until the target frame period has elapsed since the previous
    /// frame. Never sleeps a negative duration.
    fn pace(&mut self) {
        if let Some(prev) = self.last_frame_at {
            if let Some(remaining) = FRAME_PERIOD.checked_sub(prev.elapsed()) {
                thread::sleep(remaining);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

impl System for C64System {
    type Error = C64Error;

    fn reset(&mut self) {
        self.cpu.reset();
        self.halted = None;
        self.last_frame_at = None;
    }

    fn step_frame(&mut self) -> Result<Frame, C64Error> {
        if let Some(reason) = self.halted {
            return Err(self.halt_error(reason));
        }
        loop {
            match self.cpu.step() {
                Step::Continue => {}
                Step::Halt(reason) => {
                    self.halted = Some(reason);
                    return Err(self.halt_error(reason));
                }
            }
            self.cpu.bus.cia1.tick();
            if self.cpu.bus.tick_video() == VicTick::FrameComplete {
                if self.pacing {
                    self.pace();
                }
                return Ok(Frame {
                    width: SCREEN_WIDTH as u32,
                    height: SCREEN_HEIGHT as u32,
                    format: PixelFormat::Indexed8,
                    pixels: self.cpu.bus.vic.framebuffer().to_vec(),
                });
            }
        }
    }

    fn debug_state(&self) -> Value {
        json!({
            "registers": self.registers(),
            "raster_line": self.cpu.bus.vic.raster_line(),
            "mode": self.cpu.bus.vic.mode(),
            "halted": self.halted.map(|r| format!("{r:?}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breadbin_core::cpu_6502::Bus6502;
    use crate::bus::KERNAL_BASIC_IMAGE_SIZE;

    /// Blank machine whose reset vector points at `$0200` and IRQ vector at
    /// `$0300`, with the given code poked into RAM.
    fn test_system(program: &[u8], handler: &[u8]) -> C64System {
        let mut sys = C64System::new();
        sys.set_pacing(false);

        let mut image = vec![0u8; KERNAL_BASIC_IMAGE_SIZE];
        image[0x3FFC] = 0x00; // reset vector -> $0200
        image[0x3FFD] = 0x02;
        image[0x3FFE] = 0x00; // IRQ vector -> $0300
        image[0x3FFF] = 0x03;
        sys.bus_mut().load_kernal_basic_image(&image);

        for (i, &b) in program.iter().enumerate() {
            sys.bus_mut().write(0x0200 + i as u16, b);
        }
        for (i, &b) in handler.iter().enumerate() {
            sys.bus_mut().write(0x0300 + i as u16, b);
        }
        System::reset(&mut sys);
        sys
    }

    #[test]
    fn store_compare_branch_program_halts_only_via_break() {
        let mut sys = test_system(
            &[
                0xA9, 0x05, // LDA #$05
                0x85, 0x10, // STA $10
                0xC9, 0x05, // CMP #$05
                0xF0, 0x01, // BEQ +1 (over the NOP, onto the BRK)
                0xEA, // NOP (skipped)
                0x00, // BRK
            ],
            &[],
        );
        match sys.step_frame() {
            Err(C64Error::Break { .. }) => {}
            other => panic!("expected a BRK halt, got {other:?}"),
        }
        assert!(sys.is_halted());
        assert_eq!(sys.bus().peek(0x0010), 0x05);
        // Repeated stepping stays halted and inspectable.
        assert!(matches!(sys.step_frame(), Err(C64Error::Break { .. })));
        assert_eq!(sys.bus().peek(0x0010), 0x05);
    }

    #[test]
    fn unimplemented_opcode_reports_the_byte() {
        let mut sys = test_system(&[0x02], &[]);
        match sys.step_frame() {
            Err(C64Error::UnknownOpcode { opcode, .. }) => assert_eq!(opcode, 0x02),
            other => panic!("expected unknown-opcode halt, got {other:?}"),
        }
    }

    #[test]
    fn raster_interrupt_vectors_and_returns() {
        // Main program spins; the handler counts invocations, acknowledges
        // the video interrupt and returns.
        let mut sys = test_system(
            &[0x4C, 0x00, 0x02], // JMP $0200
            &[
                0xE6, 0x20, // INC $20
                0xA9, 0x00, // LDA #$00
                0x8D, 0x19, 0xD0, // STA $D019 (acknowledge)
                0x40, // RTI
            ],
        );
        sys.bus_mut().write(0xD01A, 0x01); // enable the raster interrupt

        let frame = sys.step_frame().expect("frame");
        assert_eq!(frame.width, 320);
        assert_eq!(frame.height, 200);
        assert!(!sys.is_halted());

        // The handler ran and execution returned to the spin loop.
        assert!(sys.bus().peek(0x0020) > 0);
        let pc = sys.registers().pc;
        assert!(
            (0x0200..0x0203).contains(&pc),
            "PC should be back in the main loop, was {pc:04X}"
        );
    }

    #[test]
    fn masked_interrupts_are_not_serviced() {
        let mut sys = test_system(
            &[
                0x78, // SEI
                0x4C, 0x01, 0x02, // JMP $0201
            ],
            &[0xE6, 0x20, 0x40], // INC $20; RTI (never reached)
        );
        sys.bus_mut().write(0xD01A, 0x01);
        sys.step_frame().expect("frame");
        assert_eq!(sys.bus().peek(0x0020), 0);
    }

    #[test]
    fn timer_interrupt_reaches_the_processor() {
        // Start CIA timer A with a short period; the handler acknowledges
        // through the interrupt-control register.
        let mut sys = test_system(
            &[0x4C, 0x00, 0x02], // JMP $0200
            &[
                0xE6, 0x21, // INC $21
                0xAD, 0x0D, 0xDC, // LDA $DC0D (acknowledge)
                0x40, // RTI
            ],
        );
        sys.bus_mut().write(0xDC04, 0x40); // latch low
        sys.bus_mut().write(0xDC05, 0x00); // latch high
        sys.bus_mut().write(0xDC0D, 0x81); // enable timer A interrupt
        sys.bus_mut().write(0xDC0E, 0x11); // force load + start

        sys.step_frame().expect("frame");
        assert!(sys.bus().peek(0x0021) > 0);
    }

    #[test]
    fn frame_has_one_byte_per_pixel() {
        let mut sys = test_system(&[0x4C, 0x00, 0x02], &[]);
        let frame = sys.step_frame().expect("frame");
        assert_eq!(frame.format, PixelFormat::Indexed8);
        assert_eq!(frame.pixels.len(), 320 * 200);
    }

    #[test]
    fn debug_state_carries_registers_and_video_state() {
        let sys = test_system(&[0xEA], &[]);
        let state = sys.debug_state();
        assert_eq!(state["registers"]["pc"], 0x0200);
        assert_eq!(state["raster_line"], 0);
        assert!(state["halted"].is_null());
    }

    #[test]
    fn dump_helpers_render_text() {
        let sys = test_system(&[0xA9, 0x05], &[]);
        let regs = sys.dump_registers();
        assert!(regs.contains("PC: $0200"));
        let mem = sys.dump_memory(0x0200, 2);
        assert!(mem.contains("A9 05"));
    }
}
