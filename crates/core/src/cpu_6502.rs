//! MOS 6502 CPU core.
//!
//! A reusable instruction-execution engine, generic over the memory bus via
//! the [`Bus6502`] trait. Decode is data-driven: a 256-entry const table maps
//! each opcode byte to a (mnemonic, addressing mode) pair, and bytes with no
//! entry halt the run loop instead of crashing it.
//!
//! Known limitations, kept deliberately and reported rather than hidden:
//! decimal-mode arithmetic is inert (the flag is stored but binary arithmetic
//! is always used), and the ASL memory forms decode but perform no operation
//! yet (logged through the stub category).

use crate::interrupt::{IrqLine, NmiLine};
use crate::logging::{log, LogCategory, LogLevel};
use serde::Serialize;

/// Memory interface for the 6502.
///
/// Reads take `&mut self` because reads of memory-mapped peripheral
/// registers can have side effects (interrupt acknowledge, latch clears).
pub trait Bus6502 {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
}

/// Base of the fixed one-page stack region.
pub const STACK_BASE: u16 = 0x0100;
/// NMI service vector.
pub const NMI_VECTOR: u16 = 0xFFFA;
/// Power-on/reset vector.
pub const RESET_VECTOR: u16 = 0xFFFC;
/// IRQ/BRK service vector.
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Architectural register file.
///
/// The six status flags are kept as independent booleans; the packed status
/// byte only materializes when pushed to or popped from the stack.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// Stack pointer, an offset into the stack page. Wraps modulo 256.
    pub sp: u8,
    /// Address of the next byte to fetch.
    pub pc: u16,
    pub sign: bool,
    pub overflow: bool,
    pub zero: bool,
    pub carry: bool,
    pub irq_disable: bool,
    /// Stored but behaviourally inert: arithmetic is always binary.
    pub decimal: bool,
}

impl Registers {
    /// Pack the flags into the on-stack status byte layout (NV-BDIZC).
    /// Bit 5 is always set; bit 4 is the break bit of the push source.
    fn pack_flags(&self, brk: bool) -> u8 {
        let mut v = 0u8;
        v |= self.carry as u8;
        v |= (self.zero as u8) << 1;
        v |= (self.irq_disable as u8) << 2;
        v |= (self.decimal as u8) << 3;
        v |= (brk as u8) << 4;
        v |= 1 << 5;
        v |= (self.overflow as u8) << 6;
        v |= (self.sign as u8) << 7;
        v
    }

    /// Unpack a status byte; bits 4 and 5 have no storage.
    fn unpack_flags(&mut self, v: u8) {
        self.carry = v & 0x01 != 0;
        self.zero = v & 0x02 != 0;
        self.irq_disable = v & 0x04 != 0;
        self.decimal = v & 0x08 != 0;
        self.overflow = v & 0x40 != 0;
        self.sign = v & 0x80 != 0;
    }
}

/// Continuation signal returned by [`Cpu6502::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The driving loop must stop. State stays inspectable.
    Halt(HaltReason),
}

/// Why execution stopped. Break and unknown opcodes have the same effect on
/// the run loop but are reported distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The explicit software-break opcode (BRK).
    Break,
    /// An opcode byte with no defined handler.
    UnknownOpcode(u8),
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    IndirectX,
    IndirectY,
    Indirect,
    Relative,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Ora,
    And,
    Adc,
    Sbc,
    Cmp,
    Cpx,
    Cpy,
    Lda,
    Ldx,
    Ldy,
    Sta,
    Stx,
    Sty,
    Inc,
    Inx,
    Iny,
    Dex,
    Dey,
    Tax,
    Tay,
    Txa,
    Tya,
    Txs,
    Pha,
    Pla,
    Php,
    Plp,
    Jmp,
    Jsr,
    Rts,
    Rti,
    Bpl,
    Bmi,
    Bcc,
    Bcs,
    Bne,
    Beq,
    Clc,
    Sec,
    Cli,
    Sei,
    Cld,
    Rol,
    Asl,
    Nop,
    Brk,
}

#[derive(Debug, Clone, Copy)]
struct Instr {
    op: Op,
    mode: Mode,
}

const fn entry(op: Op, mode: Mode) -> Option<Instr> {
    Some(Instr { op, mode })
}

/// Opcode byte -> (operation, addressing mode). Built once; bytes without an
/// entry are the unimplemented-opcode condition.
const fn opcode_table() -> [Option<Instr>; 256] {
    let mut t: [Option<Instr>; 256] = [None; 256];

    t[0x00] = entry(Op::Brk, Mode::Implied);

    t[0x01] = entry(Op::Ora, Mode::IndirectX);
    t[0x05] = entry(Op::Ora, Mode::ZeroPage);
    t[0x09] = entry(Op::Ora, Mode::Immediate);
    t[0x0D] = entry(Op::Ora, Mode::Absolute);
    t[0x11] = entry(Op::Ora, Mode::IndirectY);
    t[0x15] = entry(Op::Ora, Mode::ZeroPageX);
    t[0x1D] = entry(Op::Ora, Mode::AbsoluteX);

    // Decoded but not yet operative (pending shift support).
    t[0x06] = entry(Op::Asl, Mode::ZeroPage);
    t[0x0E] = entry(Op::Asl, Mode::Absolute);

    t[0x08] = entry(Op::Php, Mode::Implied);
    t[0x28] = entry(Op::Plp, Mode::Implied);
    t[0x48] = entry(Op::Pha, Mode::Implied);
    t[0x68] = entry(Op::Pla, Mode::Implied);

    t[0x10] = entry(Op::Bpl, Mode::Relative);
    t[0x30] = entry(Op::Bmi, Mode::Relative);
    t[0x90] = entry(Op::Bcc, Mode::Relative);
    t[0xB0] = entry(Op::Bcs, Mode::Relative);
    t[0xD0] = entry(Op::Bne, Mode::Relative);
    t[0xF0] = entry(Op::Beq, Mode::Relative);

    t[0x18] = entry(Op::Clc, Mode::Implied);
    t[0x38] = entry(Op::Sec, Mode::Implied);
    t[0x58] = entry(Op::Cli, Mode::Implied);
    t[0x78] = entry(Op::Sei, Mode::Implied);
    t[0xD8] = entry(Op::Cld, Mode::Implied);

    t[0x20] = entry(Op::Jsr, Mode::Absolute);
    t[0x40] = entry(Op::Rti, Mode::Implied);
    t[0x60] = entry(Op::Rts, Mode::Implied);
    t[0x4C] = entry(Op::Jmp, Mode::Absolute);
    t[0x6C] = entry(Op::Jmp, Mode::Indirect);

    t[0x29] = entry(Op::And, Mode::Immediate);
    t[0x2A] = entry(Op::Rol, Mode::Accumulator);

    t[0x65] = entry(Op::Adc, Mode::ZeroPage);
    t[0x69] = entry(Op::Adc, Mode::Immediate);
    t[0xE9] = entry(Op::Sbc, Mode::Immediate);

    t[0x81] = entry(Op::Sta, Mode::IndirectX);
    t[0x85] = entry(Op::Sta, Mode::ZeroPage);
    t[0x8D] = entry(Op::Sta, Mode::Absolute);
    t[0x91] = entry(Op::Sta, Mode::IndirectY);
    t[0x95] = entry(Op::Sta, Mode::ZeroPageX);
    t[0x99] = entry(Op::Sta, Mode::AbsoluteY);
    t[0x9D] = entry(Op::Sta, Mode::AbsoluteX);

    t[0x84] = entry(Op::Sty, Mode::ZeroPage);
    t[0x8C] = entry(Op::Sty, Mode::Absolute);
    t[0x94] = entry(Op::Sty, Mode::ZeroPageX);

    t[0x86] = entry(Op::Stx, Mode::ZeroPage);
    t[0x8E] = entry(Op::Stx, Mode::Absolute);
    t[0x96] = entry(Op::Stx, Mode::ZeroPageY);

    t[0x88] = entry(Op::Dey, Mode::Implied);
    t[0xCA] = entry(Op::Dex, Mode::Implied);
    t[0xC8] = entry(Op::Iny, Mode::Implied);
    t[0xE8] = entry(Op::Inx, Mode::Implied);
    t[0xE6] = entry(Op::Inc, Mode::ZeroPage);

    t[0x8A] = entry(Op::Txa, Mode::Implied);
    t[0x98] = entry(Op::Tya, Mode::Implied);
    t[0x9A] = entry(Op::Txs, Mode::Implied);
    t[0xA8] = entry(Op::Tay, Mode::Implied);
    t[0xAA] = entry(Op::Tax, Mode::Implied);

    t[0xA0] = entry(Op::Ldy, Mode::Immediate);
    t[0xA4] = entry(Op::Ldy, Mode::ZeroPage);
    t[0xAC] = entry(Op::Ldy, Mode::Absolute);
    t[0xB4] = entry(Op::Ldy, Mode::ZeroPageX);
    t[0xBC] = entry(Op::Ldy, Mode::AbsoluteX);

    t[0xA1] = entry(Op::Lda, Mode::IndirectX);
    t[0xA5] = entry(Op::Lda, Mode::ZeroPage);
    t[0xA9] = entry(Op::Lda, Mode::Immediate);
    t[0xAD] = entry(Op::Lda, Mode::Absolute);
    t[0xB1] = entry(Op::Lda, Mode::IndirectY);
    t[0xB5] = entry(Op::Lda, Mode::ZeroPageX);
    t[0xB9] = entry(Op::Lda, Mode::AbsoluteY);
    t[0xBD] = entry(Op::Lda, Mode::AbsoluteX);

    t[0xA2] = entry(Op::Ldx, Mode::Immediate);
    t[0xA6] = entry(Op::Ldx, Mode::ZeroPage);
    t[0xAE] = entry(Op::Ldx, Mode::Absolute);
    t[0xB6] = entry(Op::Ldx, Mode::ZeroPageY);
    t[0xBE] = entry(Op::Ldx, Mode::AbsoluteY);

    t[0xC0] = entry(Op::Cpy, Mode::Immediate);
    t[0xC4] = entry(Op::Cpy, Mode::ZeroPage);
    t[0xE0] = entry(Op::Cpx, Mode::Immediate);

    t[0xC5] = entry(Op::Cmp, Mode::ZeroPage);
    t[0xC9] = entry(Op::Cmp, Mode::Immediate);
    t[0xD1] = entry(Op::Cmp, Mode::IndirectY);
    t[0xDD] = entry(Op::Cmp, Mode::AbsoluteX);

    t[0xEA] = entry(Op::Nop, Mode::Implied);

    t
}

static OPCODES: [Option<Instr>; 256] = opcode_table();

/// Resolved operand of one instruction.
#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Accumulator,
    Immediate(u8),
    Address(u16),
    Relative(i8),
}

/// 6502 CPU state and execution engine, generic over the bus.
#[derive(Debug)]
pub struct Cpu6502<B: Bus6502> {
    pub regs: Registers,
    pub bus: B,
    irq: IrqLine,
    nmi: NmiLine,
}

impl<B: Bus6502> Cpu6502<B> {
    /// Create a CPU wired to the given bus and interrupt lines.
    pub fn new(bus: B, irq: IrqLine, nmi: NmiLine) -> Self {
        Self {
            regs: Registers::default(),
            bus,
            irq,
            nmi,
        }
    }

    /// Reset to power-on state and load the program counter from the reset
    /// vector. Memory is untouched.
    pub fn reset(&mut self) {
        self.regs = Registers {
            sp: 0xFD,
            ..Registers::default()
        };
        self.regs.pc = self.read_u16(RESET_VECTOR);
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    #[inline]
    fn read(&mut self, addr: u16) -> u8 {
        self.bus.read(addr)
    }

    #[inline]
    fn write(&mut self, addr: u16, value: u8) {
        self.bus.write(addr, value);
    }

    fn read_u16(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// Read a 16-bit pointer from the zero page; the pointer wraps within
    /// the page.
    fn read_zp_u16(&mut self, zp: u8) -> u16 {
        let lo = self.read(zp as u16) as u16;
        let hi = self.read(zp.wrapping_add(1) as u16) as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn fetch_u8(&mut self) -> u8 {
        let v = self.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        v
    }

    #[inline]
    fn fetch_u16(&mut self) -> u16 {
        let lo = self.fetch_u8() as u16;
        let hi = self.fetch_u8() as u16;
        (hi << 8) | lo
    }

    fn push_u8(&mut self, v: u8) {
        self.write(STACK_BASE + self.regs.sp as u16, v);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    fn pop_u8(&mut self) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        self.read(STACK_BASE + self.regs.sp as u16)
    }

    fn set_zn(&mut self, v: u8) {
        self.regs.zero = v == 0;
        self.regs.sign = v & 0x80 != 0;
    }

    /// Push PC and flags (break bit clear), set the mask flag, and vector.
    /// Does not release the IRQ line: the asserting peripheral must be
    /// acknowledged by software.
    fn service_interrupt(&mut self, vector: u16) {
        let pc = self.regs.pc;
        self.push_u8((pc >> 8) as u8);
        self.push_u8(pc as u8);
        let flags = self.regs.pack_flags(false);
        self.push_u8(flags);
        self.regs.irq_disable = true;
        self.regs.pc = self.read_u16(vector);
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("servicing interrupt, vector {vector:04X} -> {:04X}", self.regs.pc)
        });
    }

    /// Execute one instruction (servicing a pending interrupt first) and
    /// return the continuation signal.
    pub fn step(&mut self) -> Step {
        if self.nmi.take_edge() {
            self.service_interrupt(NMI_VECTOR);
        } else if self.irq.is_asserted() && !self.regs.irq_disable {
            self.service_interrupt(IRQ_VECTOR);
        }

        let opcode = self.fetch_u8();
        match OPCODES[opcode as usize] {
            Some(instr) => self.execute(instr),
            None => {
                log(LogCategory::Cpu, LogLevel::Warn, || {
                    format!(
                        "unimplemented opcode {opcode:02X} at {:04X}",
                        self.regs.pc.wrapping_sub(1)
                    )
                });
                Step::Halt(HaltReason::UnknownOpcode(opcode))
            }
        }
    }

    fn resolve(&mut self, mode: Mode) -> Operand {
        match mode {
            Mode::Implied => Operand::None,
            Mode::Accumulator => Operand::Accumulator,
            Mode::Immediate => Operand::Immediate(self.fetch_u8()),
            Mode::ZeroPage => Operand::Address(self.fetch_u8() as u16),
            Mode::ZeroPageX => {
                Operand::Address(self.fetch_u8().wrapping_add(self.regs.x) as u16)
            }
            Mode::ZeroPageY => {
                Operand::Address(self.fetch_u8().wrapping_add(self.regs.y) as u16)
            }
            Mode::Absolute => Operand::Address(self.fetch_u16()),
            Mode::AbsoluteX => {
                Operand::Address(self.fetch_u16().wrapping_add(self.regs.x as u16))
            }
            Mode::AbsoluteY => {
                Operand::Address(self.fetch_u16().wrapping_add(self.regs.y as u16))
            }
            Mode::IndirectX => {
                let zp = self.fetch_u8().wrapping_add(self.regs.x);
                Operand::Address(self.read_zp_u16(zp))
            }
            Mode::IndirectY => {
                let zp = self.fetch_u8();
                let base = self.read_zp_u16(zp);
                Operand::Address(base.wrapping_add(self.regs.y as u16))
            }
            Mode::Indirect => {
                let ptr = self.fetch_u16();
                Operand::Address(self.read_u16(ptr))
            }
            Mode::Relative => Operand::Relative(self.fetch_u8() as i8),
        }
    }

    /// Fetch the operand value for a read operation.
    fn load(&mut self, operand: Operand) -> u8 {
        match operand {
            Operand::Immediate(v) => v,
            Operand::Address(addr) => self.read(addr),
            Operand::Accumulator => self.regs.a,
            Operand::None | Operand::Relative(_) => 0,
        }
    }

    fn target(operand: Operand) -> u16 {
        match operand {
            Operand::Address(addr) => addr,
            _ => 0,
        }
    }

    fn branch(&mut self, operand: Operand, taken: bool) {
        if let Operand::Relative(d) = operand {
            if taken {
                // PC already points past the displacement byte.
                self.regs.pc = self.regs.pc.wrapping_add(d as i16 as u16);
            }
        }
    }

    fn adc(&mut self, value: u8) {
        if self.regs.decimal {
            log(LogCategory::Stubs, LogLevel::Trace, || {
                "decimal-mode ADC requested; using binary arithmetic".to_string()
            });
        }
        let carry_in = self.regs.carry as u16;
        let raw = self.regs.a as u16 + value as u16 + carry_in;
        let result = raw as u8;
        self.regs.carry = raw > 0xFF;
        self.regs.overflow = (!(self.regs.a ^ value) & (self.regs.a ^ result)) & 0x80 != 0;
        self.regs.a = result;
        self.set_zn(result);
    }

    fn sbc(&mut self, value: u8) {
        if self.regs.decimal {
            log(LogCategory::Stubs, LogLevel::Trace, || {
                "decimal-mode SBC requested; using binary arithmetic".to_string()
            });
        }
        let borrow = !self.regs.carry as u16;
        let raw = (self.regs.a as u16)
            .wrapping_sub(value as u16)
            .wrapping_sub(borrow);
        let result = raw as u8;
        // No borrow out of bit 8 means the subtraction stayed non-negative.
        self.regs.carry = raw < 0x100;
        self.regs.overflow = ((self.regs.a ^ value) & (self.regs.a ^ result)) & 0x80 != 0;
        self.regs.a = result;
        self.set_zn(result);
    }

    fn compare(&mut self, reg: u8, value: u8) {
        let raw = (reg as u16).wrapping_sub(value as u16);
        self.regs.carry = raw < 0x100;
        self.set_zn(raw as u8);
    }

    fn execute(&mut self, instr: Instr) -> Step {
        let operand = self.resolve(instr.mode);
        match instr.op {
            Op::Brk => {
                log(LogCategory::Cpu, LogLevel::Info, || {
                    format!("BRK at {:04X}", self.regs.pc.wrapping_sub(1))
                });
                return Step::Halt(HaltReason::Break);
            }
            Op::Ora => {
                let v = self.load(operand);
                self.regs.a |= v;
                self.set_zn(self.regs.a);
            }
            Op::And => {
                let v = self.load(operand);
                self.regs.a &= v;
                self.set_zn(self.regs.a);
            }
            Op::Adc => {
                let v = self.load(operand);
                self.adc(v);
            }
            Op::Sbc => {
                let v = self.load(operand);
                self.sbc(v);
            }
            Op::Cmp => {
                let v = self.load(operand);
                self.compare(self.regs.a, v);
            }
            Op::Cpx => {
                let v = self.load(operand);
                self.compare(self.regs.x, v);
            }
            Op::Cpy => {
                let v = self.load(operand);
                self.compare(self.regs.y, v);
            }
            Op::Lda => {
                let v = self.load(operand);
                self.regs.a = v;
                self.set_zn(v);
            }
            Op::Ldx => {
                let v = self.load(operand);
                self.regs.x = v;
                self.set_zn(v);
            }
            Op::Ldy => {
                let v = self.load(operand);
                self.regs.y = v;
                self.set_zn(v);
            }
            Op::Sta => self.write(Self::target(operand), self.regs.a),
            Op::Stx => self.write(Self::target(operand), self.regs.x),
            Op::Sty => self.write(Self::target(operand), self.regs.y),
            Op::Inc => {
                let addr = Self::target(operand);
                let v = self.read(addr).wrapping_add(1);
                self.write(addr, v);
                self.set_zn(v);
            }
            Op::Inx => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.set_zn(self.regs.x);
            }
            Op::Iny => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.set_zn(self.regs.y);
            }
            Op::Dex => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.set_zn(self.regs.x);
            }
            Op::Dey => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.set_zn(self.regs.y);
            }
            Op::Tax => {
                self.regs.x = self.regs.a;
                self.set_zn(self.regs.x);
            }
            Op::Tay => {
                self.regs.y = self.regs.a;
                self.set_zn(self.regs.y);
            }
            Op::Txa => {
                self.regs.a = self.regs.x;
                self.set_zn(self.regs.a);
            }
            Op::Tya => {
                self.regs.a = self.regs.y;
                self.set_zn(self.regs.a);
            }
            Op::Txs => self.regs.sp = self.regs.x,
            Op::Pha => self.push_u8(self.regs.a),
            Op::Pla => {
                let v = self.pop_u8();
                self.regs.a = v;
                self.set_zn(v);
            }
            Op::Php => {
                // PHP pushes with the break bit set, by convention.
                let flags = self.regs.pack_flags(true);
                self.push_u8(flags);
            }
            Op::Plp => {
                let v = self.pop_u8();
                self.regs.unpack_flags(v);
            }
            Op::Jmp => self.regs.pc = Self::target(operand),
            Op::Jsr => {
                let target = Self::target(operand);
                let ret = self.regs.pc.wrapping_sub(1);
                self.push_u8((ret >> 8) as u8);
                self.push_u8(ret as u8);
                self.regs.pc = target;
            }
            Op::Rts => {
                let lo = self.pop_u8() as u16;
                let hi = self.pop_u8() as u16;
                self.regs.pc = ((hi << 8) | lo).wrapping_add(1);
            }
            Op::Rti => {
                let flags = self.pop_u8();
                self.regs.unpack_flags(flags);
                let lo = self.pop_u8() as u16;
                let hi = self.pop_u8() as u16;
                self.regs.pc = (hi << 8) | lo;
            }
            Op::Bpl => self.branch(operand, !self.regs.sign),
            Op::Bmi => self.branch(operand, self.regs.sign),
            Op::Bcc => self.branch(operand, !self.regs.carry),
            Op::Bcs => self.branch(operand, self.regs.carry),
            Op::Bne => self.branch(operand, !self.regs.zero),
            Op::Beq => self.branch(operand, self.regs.zero),
            Op::Clc => self.regs.carry = false,
            Op::Sec => self.regs.carry = true,
            Op::Cli => self.regs.irq_disable = false,
            Op::Sei => self.regs.irq_disable = true,
            Op::Cld => self.regs.decimal = false,
            Op::Rol => {
                let raw = ((self.regs.a as u16) << 1) | self.regs.carry as u16;
                self.regs.carry = raw & 0x100 != 0;
                self.regs.a = raw as u8;
                self.set_zn(self.regs.a);
            }
            Op::Asl => {
                // Operand bytes are consumed above so the PC stays aligned.
                log(LogCategory::Stubs, LogLevel::Warn, || {
                    format!("ASL {:04X} not implemented yet", Self::target(operand))
                });
            }
            Op::Nop => {}
        }
        Step::Continue
    }
}
