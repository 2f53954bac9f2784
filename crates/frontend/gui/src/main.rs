//! Windowed frontend: owns the display surface and the key events, nothing
//! else. The machine hands over one finished indexed-color frame at a time;
//! this side maps it through the palette and pushes it to the window.

use breadbin_c64::keyboard::C64Key;
use breadbin_c64::vic::{SCREEN_HEIGHT, SCREEN_WIDTH};
use breadbin_c64::{palette, C64System};
use breadbin_core::{logging, System};
use log::{error, info, warn};
use minifb::{Key, KeyRepeat, Scale, Window, WindowOptions};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_KERNAL_BASIC: &str = "roms/251913-01.bin";
const DEFAULT_CHARSET: &str = "roms/901225-01.bin";

fn map_key(key: Key) -> Option<C64Key> {
    let mapped = match key {
        Key::A => C64Key::A,
        Key::B => C64Key::B,
        Key::C => C64Key::C,
        Key::D => C64Key::D,
        Key::E => C64Key::E,
        Key::F => C64Key::F,
        Key::G => C64Key::G,
        Key::H => C64Key::H,
        Key::I => C64Key::I,
        Key::J => C64Key::J,
        Key::K => C64Key::K,
        Key::L => C64Key::L,
        Key::M => C64Key::M,
        Key::N => C64Key::N,
        Key::O => C64Key::O,
        Key::P => C64Key::P,
        Key::Q => C64Key::Q,
        Key::R => C64Key::R,
        Key::S => C64Key::S,
        Key::T => C64Key::T,
        Key::U => C64Key::U,
        Key::V => C64Key::V,
        Key::W => C64Key::W,
        Key::X => C64Key::X,
        Key::Y => C64Key::Y,
        Key::Z => C64Key::Z,
        Key::Key0 => C64Key::Digit0,
        Key::Key1 => C64Key::Digit1,
        Key::Key2 => C64Key::Digit2,
        Key::Key3 => C64Key::Digit3,
        Key::Key4 => C64Key::Digit4,
        Key::Key5 => C64Key::Digit5,
        Key::Key6 => C64Key::Digit6,
        Key::Key7 => C64Key::Digit7,
        Key::Key8 => C64Key::Digit8,
        Key::Key9 => C64Key::Digit9,
        Key::Enter => C64Key::Return,
        Key::Space => C64Key::Space,
        Key::LeftShift => C64Key::LeftShift,
        Key::RightShift => C64Key::RightShift,
        Key::Comma => C64Key::Comma,
        Key::Period => C64Key::Period,
        Key::Slash => C64Key::Slash,
        Key::Semicolon => C64Key::Semicolon,
        Key::Apostrophe => C64Key::Colon,
        Key::Equal => C64Key::Equals,
        Key::Minus => C64Key::Minus,
        Key::Backspace => C64Key::Delete,
        Key::Home => C64Key::Home,
        Key::Down => C64Key::CursorDown,
        Key::Right => C64Key::CursorRight,
        Key::F1 => C64Key::F1,
        Key::F3 => C64Key::F3,
        Key::F5 => C64Key::F5,
        Key::F7 => C64Key::F7,
        Key::LeftCtrl => C64Key::Control,
        Key::Tab => C64Key::RunStop,
        Key::LeftSuper | Key::RightSuper => C64Key::Commodore,
        _ => return None,
    };
    Some(mapped)
}

struct Options {
    kernal_basic: PathBuf,
    charset: PathBuf,
}

fn parse_args() -> Options {
    let mut positional = Vec::new();
    let mut args = env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--log" {
            if let Some(spec) = args.next() {
                logging::apply_spec(&spec);
            }
        } else {
            positional.push(a);
        }
    }
    Options {
        kernal_basic: positional
            .first()
            .map(PathBuf::from)
            .unwrap_or_else(|| DEFAULT_KERNAL_BASIC.into()),
        charset: positional
            .get(1)
            .map(PathBuf::from)
            .unwrap_or_else(|| DEFAULT_CHARSET.into()),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let opts = parse_args();

    let mut sys = match C64System::from_rom_paths(&opts.kernal_basic, &opts.charset) {
        Ok(sys) => sys,
        Err(e) => {
            eprintln!("failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut window = match Window::new(
        "breadbin",
        SCREEN_WIDTH,
        SCREEN_HEIGHT,
        WindowOptions {
            scale: Scale::X2,
            ..WindowOptions::default()
        },
    ) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("failed to create window: {e}");
            return ExitCode::FAILURE;
        }
    };
    // The machine paces itself to the frame period; don't throttle twice.
    window.set_target_fps(0);

    let mut buffer = vec![0u32; SCREEN_WIDTH * SCREEN_HEIGHT];
    let mut halted = false;

    info!("running; Escape quits, F12 dumps registers");
    while window.is_open() && !window.is_key_down(Key::Escape) {
        if !halted {
            match sys.step_frame() {
                Ok(frame) => {
                    for (dst, &index) in buffer.iter_mut().zip(&frame.pixels) {
                        *dst = palette::to_0rgb(index);
                    }
                }
                Err(e) => {
                    // Leave the last frame up for inspection.
                    warn!("{e}");
                    println!("{}", sys.dump_registers());
                    halted = true;
                }
            }
        }

        for key in window.get_keys_pressed(KeyRepeat::No) {
            if key == Key::F12 {
                // Diagnostic dump without stopping execution.
                println!("{}", sys.dump_registers());
                continue;
            }
            if let Some(mapped) = map_key(key) {
                sys.key_down(mapped);
            }
        }
        for key in window.get_keys_released() {
            if let Some(mapped) = map_key(key) {
                sys.key_up(mapped);
            }
        }

        if let Err(e) = window.update_with_buffer(&buffer, SCREEN_WIDTH, SCREEN_HEIGHT) {
            error!("window update failed: {e}");
            break;
        }
    }

    info!("shutting down");
    ExitCode::SUCCESS
}
