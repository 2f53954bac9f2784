use criterion::{black_box, criterion_group, criterion_main, Criterion};
use breadbin_core::cpu_6502::{Bus6502, Cpu6502, Step, RESET_VECTOR};
use breadbin_core::interrupt::{IrqLine, NmiLine};

/// Flat RAM bus for benchmarking the dispatch loop.
struct BenchBus {
    ram: Vec<u8>,
}

impl BenchBus {
    fn new() -> Self {
        let mut ram = vec![0; 0x10000];

        ram[RESET_VECTOR as usize] = 0x00;
        ram[RESET_VECTOR as usize + 1] = 0x80;

        // A small loop touching loads, stores, index arithmetic and a jump.
        let program: &[u8] = &[
            0xA9, 0x42, // LDA #$42
            0x8D, 0x00, 0x20, // STA $2000
            0xA2, 0x10, // LDX #$10
            0xA0, 0x20, // LDY #$20
            0xE8, // INX
            0xC8, // INY
            0xCA, // DEX
            0x88, // DEY
            0x69, 0x01, // ADC #$01
            0x4C, 0x00, 0x80, // JMP $8000
        ];
        ram[0x8000..0x8000 + program.len()].copy_from_slice(program);

        Self { ram }
    }
}

impl Bus6502 for BenchBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.ram[addr as usize] = value;
    }
}

fn bench_step_loop(c: &mut Criterion) {
    c.bench_function("cpu_6502_step_10k", |b| {
        b.iter(|| {
            let mut cpu = Cpu6502::new(BenchBus::new(), IrqLine::new(), NmiLine::new());
            cpu.reset();
            for _ in 0..10_000 {
                if let Step::Halt(_) = cpu.step() {
                    break;
                }
            }
            black_box(cpu.regs.pc)
        })
    });
}

criterion_group!(benches, bench_step_loop);
criterion_main!(benches);
