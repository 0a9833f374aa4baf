//! libgou: display pipeline for the ODROID-GO Ultra.
//!
//! Surfaces live in ION DMA memory and are shared with the GE2D 2D engine
//! and with GPU contexts as dma-bufs. [`Display::present`] has GE2D scale,
//! rotate and mirror a surface into a spare screen of the fbdev virtual
//! framebuffer, and a dedicated thread flips the panel to it.
//!
//! ```no_run
//! use gou::{Display, Mirror, PixelFormat, Rect, Surface};
//!
//! let display = Display::open();
//! let mut surface = Surface::new(&display, 320, 240, PixelFormat::Rgb565);
//! surface.map().fill(0xff);
//!
//! let src = Rect::new(0, 0, 320, 240);
//! let dst = Rect::from_size(display.size());
//! display.present(&surface, src, Mirror::NONE, dst);
//! ```
//!
//! Kernel interface failures are not reported to callers: they are logged
//! and the process aborts. See [`error`].

pub mod compositor;
pub mod config;
mod device;
pub mod display;
pub mod error;
pub mod fbdev;
pub mod format;
pub mod ge2d;
pub mod geometry;
pub mod heap;
pub mod logger;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod surface;

pub use config::{DisplayConfig, FlipMode};
pub use display::{Devices, Display, DisplayState, SlotSnapshot};
pub use error::{ConfigError, HardwareFault, UnsupportedFormat};
pub use format::{bytes_per_pixel, PixelFormat};
pub use geometry::{Mirror, Rect, Rotation, Size};
pub use surface::{DmaBufPlane, Surface};
