use anyhow::{Context, Result};
use breadbin_c64::C64System;
use breadbin_core::{logging, System};
use clap::Parser;
use std::path::PathBuf;

/// Headless runner: executes a number of frames and prints diagnostics.
#[derive(Parser)]
struct Args {
    /// Combined BASIC+KERNAL ROM image (16 KiB)
    #[arg(default_value = "roms/251913-01.bin")]
    kernal_basic: PathBuf,

    /// Character generator ROM image (4 KiB)
    #[arg(default_value = "roms/901225-01.bin")]
    charset: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 50)]
    frames: u32,

    /// Pace frames to the 50 Hz target instead of running flat out
    #[arg(long, default_value_t = false)]
    pace: bool,

    /// Core log spec, e.g. "debug" or "cpu=trace,video=debug"
    #[arg(long)]
    log: Option<String>,

    /// Dump a memory window at exit, as hex "addr:len", e.g. "0400:100"
    #[arg(long)]
    dump: Option<String>,

    /// Print the machine state as JSON at exit
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn parse_window(spec: &str) -> Result<(u16, usize)> {
    let (addr, len) = spec
        .split_once(':')
        .context("expected addr:len, both hex")?;
    Ok((
        u16::from_str_radix(addr, 16).context("bad address")?,
        usize::from_str_radix(len, 16).context("bad length")?,
    ))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if let Some(spec) = &args.log {
        logging::apply_spec(spec);
    }

    let mut sys = C64System::from_rom_paths(&args.kernal_basic, &args.charset)
        .context("failed to start the machine")?;
    sys.set_pacing(args.pace);

    for frame in 1..=args.frames {
        if let Err(e) = sys.step_frame() {
            // A halt is diagnostic output, not a process failure: the
            // machine state below is the interesting part.
            eprintln!("halted during frame {frame}: {e}");
            break;
        }
    }

    println!("{}", sys.dump_registers());
    if let Some(spec) = &args.dump {
        let (addr, len) = parse_window(spec)?;
        println!("{}", sys.dump_memory(addr, len));
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&sys.debug_state())?);
    }

    Ok(())
}
