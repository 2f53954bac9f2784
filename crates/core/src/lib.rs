//! Core emulator primitives and traits.

pub mod cpu_6502;
pub mod interrupt;
pub mod logging;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// Encoding of a frame's pixel data.
    ///
    /// The emulated video chip produces palette indices, not RGB; the tag
    /// tells the display backend which palette to map them through.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum PixelFormat {
        /// One byte per pixel, indexing a 16-entry hardware palette.
        Indexed8,
    }

    /// A finished framebuffer handed to the display backend.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub format: PixelFormat,
        pub pixels: Vec<u8>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
            Self {
                width,
                height,
                format,
                pixels: vec![0; (width * height) as usize],
            }
        }
    }
}

use serde_json::Value;

/// A complete machine that can be driven frame by frame.
pub trait System {
    type Error: std::error::Error + 'static;

    /// Reset to initial power-on state.
    fn reset(&mut self);

    /// Emulate until a frame is produced and return the framebuffer.
    fn step_frame(&mut self) -> Result<types::Frame, Self::Error>;

    /// Return a JSON-serializable snapshot for diagnostics.
    /// No stability guarantee on the format.
    fn debug_state(&self) -> Value;
}
