//! CIA interface adapter: keyboard matrix ports and interval timer.
//!
//! Register block at `$DC00-$DCFF` (16 registers, mirrored). Port A selects
//! keyboard rows, port B reads the columns of the pressed-key matrix.
//! Timer A counts down once per system tick and asserts the shared IRQ line
//! on underflow when enabled; software acknowledges by reading the
//! interrupt-control register, which also releases the line.
//!
//! The timer counter registers read as 0: the live count is not exposed.

use crate::keyboard::Keyboard;
use breadbin_core::interrupt::IrqLine;
use breadbin_core::logging::{log, LogCategory, LogLevel};

const REG_PORT_A: usize = 0x00;
const REG_PORT_B: usize = 0x01;
const REG_TIMER_A_LO: usize = 0x04;
const REG_TIMER_A_HI: usize = 0x05;
const REG_TIMER_B_LO: usize = 0x06;
const REG_TIMER_B_HI: usize = 0x07;
const REG_ICR: usize = 0x0D;
const REG_CRA: usize = 0x0E;

const ICR_TIMER_A: u8 = 0x01;
const ICR_TRIGGERED: u8 = 0x80;

pub struct Cia {
    regs: [u8; 16],
    timer_latch: u16,
    timer_counter: u16,
    timer_running: bool,
    timer_one_shot: bool,
    irq_mask: u8,
    irq_flags: u8,
    pub keyboard: Keyboard,
    irq: IrqLine,
}

impl Cia {
    pub fn new(irq: IrqLine) -> Self {
        Self {
            regs: [0; 16],
            timer_latch: 0xFFFF,
            timer_counter: 0xFFFF,
            timer_running: false,
            timer_one_shot: false,
            irq_mask: 0,
            irq_flags: 0,
            keyboard: Keyboard::new(),
            irq,
        }
    }

    /// Count the interval timer down by one system tick.
    pub fn tick(&mut self) {
        if !self.timer_running {
            return;
        }
        if self.timer_counter == 0 {
            self.timer_counter = self.timer_latch;
            if self.timer_one_shot {
                self.timer_running = false;
            }
            self.irq_flags |= ICR_TIMER_A;
            if self.irq_mask & ICR_TIMER_A != 0 {
                self.irq_flags |= ICR_TRIGGERED;
                self.irq.assert();
                log(LogCategory::Interrupts, LogLevel::Trace, || {
                    "timer A underflow asserted IRQ".to_string()
                });
            }
        } else {
            self.timer_counter -= 1;
        }
    }

    pub fn read_register(&mut self, addr: u16) -> u8 {
        let reg = (addr as usize) & 0x0F;
        match reg {
            REG_PORT_B => self.keyboard.columns_for(self.regs[REG_PORT_A]),
            // Live counts are not exposed; the counter registers read 0.
            REG_TIMER_A_LO | REG_TIMER_A_HI | REG_TIMER_B_LO | REG_TIMER_B_HI => 0,
            REG_ICR => {
                // Read returns pending flags, clears them, and acknowledges
                // the interrupt by releasing the line.
                let flags = self.irq_flags;
                self.irq_flags = 0;
                self.irq.release();
                flags
            }
            _ => self.regs[reg],
        }
    }

    /// Register read without side effects, for diagnostics dumps.
    pub fn peek_register(&self, addr: u16) -> u8 {
        let reg = (addr as usize) & 0x0F;
        if reg == REG_ICR {
            self.irq_flags
        } else {
            self.regs[reg]
        }
    }

    pub fn write_register(&mut self, addr: u16, value: u8) {
        let reg = (addr as usize) & 0x0F;
        match reg {
            REG_TIMER_A_LO => self.timer_latch = (self.timer_latch & 0xFF00) | value as u16,
            REG_TIMER_A_HI => {
                self.timer_latch = (self.timer_latch & 0x00FF) | ((value as u16) << 8)
            }
            REG_ICR => {
                // Bit 7 selects set/clear of the mask bits below it.
                if value & 0x80 != 0 {
                    self.irq_mask |= value & 0x7F;
                } else {
                    self.irq_mask &= !(value & 0x7F);
                }
            }
            REG_CRA => {
                self.timer_running = value & 0x01 != 0;
                self.timer_one_shot = value & 0x08 != 0;
                if value & 0x10 != 0 {
                    self.timer_counter = self.timer_latch;
                }
                self.regs[REG_CRA] = value;
            }
            _ => self.regs[reg] = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::C64Key;

    fn cia() -> (Cia, IrqLine) {
        let irq = IrqLine::new();
        (Cia::new(irq.clone()), irq)
    }

    fn start_timer(cia: &mut Cia, count: u16) {
        cia.write_register(0xDC04, count as u8);
        cia.write_register(0xDC05, (count >> 8) as u8);
        cia.write_register(0xDC0D, 0x81); // enable timer A interrupt
        cia.write_register(0xDC0E, 0x11); // force load + start
    }

    #[test]
    fn timer_underflow_raises_irq_and_reloads() {
        let (mut cia, irq) = cia();
        start_timer(&mut cia, 3);
        for _ in 0..3 {
            cia.tick();
            assert!(!irq.is_asserted());
        }
        cia.tick(); // underflow
        assert!(irq.is_asserted());

        // Acknowledge: ICR read returns the flags, clears them, releases.
        let flags = cia.read_register(0xDC0D);
        assert_eq!(flags & ICR_TIMER_A, ICR_TIMER_A);
        assert_eq!(flags & ICR_TRIGGERED, ICR_TRIGGERED);
        assert!(!irq.is_asserted());
        assert_eq!(cia.read_register(0xDC0D), 0);
    }

    #[test]
    fn masked_timer_sets_flag_without_asserting() {
        let (mut cia, irq) = cia();
        cia.write_register(0xDC04, 1);
        cia.write_register(0xDC05, 0);
        cia.write_register(0xDC0E, 0x11); // start without enabling the mask
        cia.tick();
        cia.tick();
        assert!(!irq.is_asserted());
        assert_eq!(cia.peek_register(0xDC0D) & ICR_TIMER_A, ICR_TIMER_A);
    }

    #[test]
    fn counter_registers_read_zero() {
        let (mut cia, _) = cia();
        start_timer(&mut cia, 0x1234);
        assert_eq!(cia.read_register(0xDC04), 0);
        assert_eq!(cia.read_register(0xDC05), 0);
    }

    #[test]
    fn keyboard_matrix_reads_through_ports() {
        let (mut cia, _) = cia();
        // 'A' sits at row 1, column 2. Select row 1 (bit low).
        cia.keyboard.key_down(C64Key::A);
        cia.write_register(0xDC00, !(1 << 1));
        assert_eq!(cia.read_register(0xDC01), !(1 << 2));

        // Deselect every row: nothing reads pressed.
        cia.write_register(0xDC00, 0xFF);
        assert_eq!(cia.read_register(0xDC01), 0xFF);

        cia.keyboard.key_up(C64Key::A);
        cia.write_register(0xDC00, !(1 << 1));
        assert_eq!(cia.read_register(0xDC01), 0xFF);
    }
}
